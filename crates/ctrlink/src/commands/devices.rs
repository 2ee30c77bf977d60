//! Device command handlers.

use tabled::Tabled;

use ctrlink_core::{Controller, Device, DeviceInfo};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&DeviceInfo> for DeviceRow {
    fn from(d: &DeviceInfo) -> Self {
        Self {
            id: d.id.clone().unwrap_or_default(),
            name: d.name.clone(),
        }
    }
}

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("ID:       {}", d.id.as_deref().unwrap_or("-")),
        format!("Name:     {}", d.name),
    ];
    if !d.commands.is_empty() {
        lines.push("Commands:".into());
        for c in &d.commands {
            if c.tags.is_empty() {
                lines.push(format!("  {}", c.name));
            } else {
                lines.push(format!("  {:<20} [{}]", c.name, c.tags.join(", ")));
            }
        }
    }
    if !d.sensors.is_empty() {
        lines.push("Sensors:".into());
        for s in &d.sensors {
            lines.push(format!(
                "  {:>6}  {:<20} {:<12} {}",
                s.id,
                s.name,
                s.kind.as_deref().unwrap_or("-"),
                s.value.as_deref().unwrap_or("-"),
            ));
        }
    }
    lines.join("\n")
}

pub async fn list(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = controller.list_devices().await?;
    let out =
        output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(controller: &Controller, name: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let device = controller.get_device(name).await?;
    let out = output::render_single(&global.output, &device, detail, |d| d.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
