//! Panel command handlers.

use std::fmt::Write;

use tabled::Tabled;

use ctrlink_core::{Controller, Panel, PanelInfo, Widget};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PanelRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&PanelInfo> for PanelRow {
    fn from(p: &PanelInfo) -> Self {
        Self {
            id: p.id.clone().unwrap_or_default(),
            name: p.name.clone(),
        }
    }
}

fn widget_line(w: &Widget) -> String {
    let sensors: Vec<String> = w.sensor_links.iter().map(|l| l.sensor.to_string()).collect();
    let mut line = format!(
        "  {:<10} {:<24} sensors: {}",
        w.kind,
        w.label.as_deref().unwrap_or("-"),
        if sensors.is_empty() {
            "-".into()
        } else {
            sensors.join(",")
        }
    );
    if !w.command_ids.is_empty() {
        let senders: Vec<String> = w.command_ids.iter().map(ToString::to_string).collect();
        let _ = write!(line, "  senders: {}", senders.join(","));
    }
    line
}

fn detail(p: &Panel) -> String {
    let mut lines = vec![
        format!("ID:      {}", p.id.as_deref().unwrap_or("-")),
        format!("Name:    {}", p.name),
        format!("Widgets: {}", p.widgets.len()),
    ];
    lines.extend(p.widgets.iter().map(widget_line));
    lines.join("\n")
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let panels = controller.list_panels().await?;
    let out = output::render_list(&global.output, &panels, |p| PanelRow::from(p), |p| p.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn show(controller: &Controller, name: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let panel = controller.get_panel(name).await?;
    let out = output::render_single(&global.output, &panel, detail, |p| p.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
