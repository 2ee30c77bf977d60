//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod discover;
pub mod panels;
pub mod resource;
pub mod send;
pub mod watch;

use ctrlink_core::{Controller, CoreError};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Dispatch a controller-bound command to the appropriate handler.
///
/// Everything except `logout` runs inside a connected session that is torn
/// down again before returning.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if matches!(cmd, Command::Logout) {
        controller.logout().await?;
        output::print_output("Logged out", global.quiet);
        return Ok(());
    }

    controller.connect(None).await.map_err(|e| match e {
        CoreError::NoResponse { reason } => CliError::ConnectionFailed {
            url: controller.info().url,
            reason,
        },
        other => other.into(),
    })?;
    let result = match cmd {
        Command::Panels => panels::list(controller, global).await,
        Command::Panel { name } => panels::show(controller, &name, global).await,
        Command::Devices => devices::list(controller, global).await,
        Command::Device { name } => devices::show(controller, &name, global).await,
        Command::Watch(args) => watch::handle(controller, args, global).await,
        Command::Control { sender, data } => {
            send::control(controller, sender, data, global).await
        }
        Command::DeviceCommand {
            device,
            name,
            param,
        } => send::named(controller, device, name, param.as_deref(), global).await,
        Command::Resource(args) => resource::handle(controller, args, global).await,
        // Handled before a controller exists
        Command::Logout | Command::Config(_) | Command::Discover(_) | Command::Completions(_) => {
            Ok(())
        }
    };
    controller.disconnect().await;
    result
}
