//! Control and named device commands.

use serde_json::json;

use ctrlink_core::{ControlCommand, Controller, NamedCommand};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn control(
    controller: &Controller,
    sender_id: i32,
    data: String,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = ControlCommand { sender_id, data };
    let resp = controller.send_control_command(&command).await?;
    tracing::info!(sender_id, code = %resp.code, "control command sent");

    let summary = json!({
        "sender_id": resp.sender_id,
        "data": command.data,
        "code": resp.code.to_string(),
    });
    let out = output::render_single(
        &global.output,
        &summary,
        |_| format!("Sent {:?} to sender {} ({})", command.data, resp.sender_id, resp.code),
        |_| resp.sender_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn named(
    controller: &Controller,
    device: String,
    name: String,
    parameter: Option<&str>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = NamedCommand { device, name };
    let resp = controller.send_named_command(&command, parameter).await?;
    tracing::info!(device = %command.device, command = %command.name, "device command sent");

    let summary = json!({
        "device": command.device,
        "command": command.name,
        "parameter": parameter,
        "code": resp.code.to_string(),
    });
    let out = output::render_single(
        &global.output,
        &summary,
        |_| {
            format!(
                "Ran '{}' on {} ({})",
                command.name, command.device, resp.code
            )
        },
        |_| command.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
