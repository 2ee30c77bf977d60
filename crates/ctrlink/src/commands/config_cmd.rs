//! Config subcommand handlers.

use std::fmt::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat, SetProfileArgs};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "poll_timeout = {}", cfg.defaults.poll_timeout);
    let _ = writeln!(out, "heartbeat = {}", cfg.defaults.heartbeat);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "controller = \"{}\"", p.controller);
        if let Some(ref u) = p.username {
            let _ = writeln!(out, "username = \"{u}\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(poll_timeout) = p.poll_timeout {
            let _ = writeln!(out, "poll_timeout = {poll_timeout}");
        }
        if let Some(heartbeat) = p.heartbeat {
            let _ = writeln!(out, "heartbeat = {heartbeat}");
        }
    }

    out
}

fn set_profile(args: SetProfileArgs) -> Result<String, CliError> {
    let mut cfg = config::load_config_or_default();
    let existing = cfg.profiles.remove(&args.name);

    let controller = match (args.controller, &existing) {
        (Some(url), _) => url,
        (None, Some(p)) => p.controller.clone(),
        (None, None) => {
            return Err(CliError::Validation {
                field: "url".into(),
                reason: format!("new profile '{}' needs --url", args.name),
            });
        }
    };
    ctrlink_config::validate_controller_url(&controller)?;

    let base = existing.unwrap_or_default();
    let profile = Profile {
        controller,
        username: args.username.or(base.username),
        password_env: args.password_env.or(base.password_env),
        ca_cert: args.ca_cert.or(base.ca_cert),
        insecure: args.insecure.or(base.insecure),
        ..base
    };
    cfg.profiles.insert(args.name.clone(), profile);
    if args.default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(args.name.clone());
    }

    let path = config::save_config(&cfg)?;
    Ok(format!("Profile '{}' saved to {}", args.name, path.display()))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = match global.output {
                OutputFormat::Json | OutputFormat::JsonCompact => {
                    let mut redacted = cfg.clone();
                    for p in redacted.profiles.values_mut() {
                        if p.password.is_some() {
                            p.password = Some("****".into());
                        }
                    }
                    if matches!(global.output, OutputFormat::Json) {
                        serde_json::to_string_pretty(&redacted)?
                    } else {
                        serde_json::to_string(&redacted)?
                    }
                }
                OutputFormat::Table | OutputFormat::Plain => format_config_redacted(&cfg),
            };
            output::print_output(out.trim_end(), global.quiet);
        }
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
        }
        ConfigCommand::SetProfile(args) => {
            let msg = set_profile(args)?;
            output::print_output(&msg, global.quiet);
        }
    }
    Ok(())
}
