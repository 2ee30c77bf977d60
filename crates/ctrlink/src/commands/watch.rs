//! Live sensor watch: registers a panel or device built from the
//! controller's own description and prints every value pushed to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use ctrlink_core::{
    Controller, DeviceSubscriber, PanelSubscriber, RegistrationCallback, ResponseCode, SensorId,
    SensoryWidget,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs, WatchTarget};
use crate::error::CliError;
use crate::output;

// ── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SensorUpdate {
    time: String,
    source: String,
    sensor: SensorId,
    value: String,
}

enum WatchEvent {
    Value(SensorUpdate),
    Registered,
    Failed(ResponseCode),
}

type EventTx = mpsc::UnboundedSender<WatchEvent>;

fn send_value(tx: &EventTx, source: &str, sensor: SensorId, value: &str) {
    let _ = tx.send(WatchEvent::Value(SensorUpdate {
        time: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
        source: source.to_owned(),
        sensor,
        value: value.to_owned(),
    }));
}

// ── Subscribers ─────────────────────────────────────────────────────

struct WatchWidget {
    label: String,
    links: Vec<SensorId>,
    tx: EventTx,
}

impl SensoryWidget for WatchWidget {
    fn sensor_links(&self) -> Vec<SensorId> {
        self.links.clone()
    }

    fn set_sensor_value(&self, sensor: SensorId, value: &str) {
        send_value(&self.tx, &self.label, sensor, value);
    }
}

struct WatchPanel {
    name: String,
    widgets: Vec<Arc<dyn SensoryWidget>>,
}

impl PanelSubscriber for WatchPanel {
    fn panel_name(&self) -> String {
        self.name.clone()
    }

    fn sensory_widgets(&self) -> Vec<Arc<dyn SensoryWidget>> {
        self.widgets.clone()
    }
}

struct WatchDevice {
    name: String,
    sensors: HashMap<SensorId, String>,
    tx: EventTx,
}

impl DeviceSubscriber for WatchDevice {
    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn sensor_ids(&self) -> Vec<SensorId> {
        self.sensors.keys().copied().collect()
    }

    fn set_sensor_value(&self, sensor: SensorId, value: &str) {
        let source = self.sensors.get(&sensor).map_or("-", String::as_str);
        send_value(&self.tx, source, sensor, value);
    }
}

struct WatchCallback {
    tx: EventTx,
}

impl RegistrationCallback for WatchCallback {
    fn on_success(&self) {
        let _ = self.tx.send(WatchEvent::Registered);
    }

    fn on_failure(&self, code: ResponseCode) {
        let _ = self.tx.send(WatchEvent::Failed(code));
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callback = Arc::new(WatchCallback { tx: tx.clone() });

    let (handle, target) = match args.target {
        WatchTarget::Panel { name } => {
            let panel = controller.get_panel(&name).await?;
            let widgets = panel
                .widgets
                .iter()
                .filter(|w| !w.sensor_links.is_empty())
                .enumerate()
                .map(|(i, w)| {
                    Arc::new(WatchWidget {
                        label: w
                            .label
                            .clone()
                            .or_else(|| w.id.clone())
                            .unwrap_or_else(|| format!("{}#{i}", w.kind)),
                        links: w.sensor_links.iter().map(|l| l.sensor).collect(),
                        tx: tx.clone(),
                    }) as Arc<dyn SensoryWidget>
                })
                .collect();
            let subscriber = Arc::new(WatchPanel {
                name: name.clone(),
                widgets,
            });
            let handle = controller.register_panel(subscriber, callback).await?;
            (handle, format!("panel '{name}'"))
        }
        WatchTarget::Device { name } => {
            let device = controller.get_device(&name).await?;
            let subscriber = Arc::new(WatchDevice {
                name: name.clone(),
                sensors: device
                    .sensors
                    .iter()
                    .map(|s| (s.id, s.name.clone()))
                    .collect(),
                tx: tx.clone(),
            });
            let handle = controller.register_device(subscriber, callback).await?;
            (handle, format!("device '{name}'"))
        }
    };
    drop(tx);

    if !global.quiet {
        eprintln!(
            "Watching {target} ({} sensors), Ctrl-C to stop",
            handle.sensor_ids().len()
        );
    }

    let color = output::should_color(&global.color);
    let deadline = args.duration.map(Duration::from_secs);
    let sleep = tokio::time::sleep(deadline.unwrap_or(Duration::MAX));
    tokio::pin!(sleep);

    let result = loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c() => break Ok(()),
            () = &mut sleep, if deadline.is_some() => break Ok(()),
        };
        match event {
            Some(WatchEvent::Value(update)) => print_update(&update, global, color)?,
            Some(WatchEvent::Registered) => tracing::info!(%target, "registered"),
            Some(WatchEvent::Failed(ResponseCode::Unregistered)) | None => break Ok(()),
            Some(WatchEvent::Failed(code)) => {
                break Err(CliError::Registration {
                    target: target.clone(),
                    code,
                });
            }
        }
    };

    if let Err(e) = controller.unregister(handle.key()).await {
        tracing::debug!(error = %e, "unregister on exit");
    }
    result
}

fn print_update(update: &SensorUpdate, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(update)?,
        OutputFormat::Plain => format!("{} {}", update.sensor, update.value),
        OutputFormat::Table => format!(
            "{} {} {} = {}",
            output::label(&update.time, color),
            update.source,
            output::label(&format!("[{}]", update.sensor), color),
            output::value(&update.value, color),
        ),
    };
    output::print_output(&line, global.quiet);
    Ok(())
}
