//! LAN discovery handler.

use std::time::Duration;

use tabled::Tabled;

use ctrlink_core::{ControllerInfo, DedupKey, DiscoveryConfig, DiscoveryEvent, DiscoveryService};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ControllerRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Identity")]
    identity: String,
}

impl From<&ControllerInfo> for ControllerRow {
    fn from(c: &ControllerInfo) -> Self {
        Self {
            url: c.url.clone(),
            name: c.name.clone().unwrap_or_default(),
            version: c.version.clone().unwrap_or_default(),
            identity: c.identity.clone().unwrap_or_default(),
        }
    }
}

/// Broadcast probes and collect announcements until the search ends or
/// the user interrupts it.
pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = DiscoveryConfig {
        dedup: if args.by_address {
            DedupKey::RemoteAddr
        } else {
            DedupKey::ResponseBody
        },
        ..DiscoveryConfig::new(
            args.port,
            (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        )
    };

    let service = DiscoveryService::new();
    let Some(mut events) = service.start(config).await else {
        return Err(CliError::Discovery {
            reason: "a search is already running".into(),
        });
    };

    let mut found = Vec::new();
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                service.stop().await;
                continue;
            }
        };
        match event {
            Some(DiscoveryEvent::Started { local_addr }) => {
                tracing::info!(%local_addr, "discovery started");
                if !global.quiet {
                    eprintln!("Searching for controllers (answers to {local_addr})...");
                }
            }
            Some(DiscoveryEvent::ControllerFound(info)) => {
                tracing::info!(url = %info.url, "controller found");
                found.push(info);
            }
            Some(DiscoveryEvent::StartFailed(e)) => {
                return Err(CliError::Discovery {
                    reason: e.to_string(),
                });
            }
            Some(DiscoveryEvent::Stopped) | None => break,
        }
    }

    let out = output::render_list(&global.output, &found, |c| ControllerRow::from(c), |c| {
        c.url.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
