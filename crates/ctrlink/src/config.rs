//! CLI configuration: thin wrapper around `ctrlink_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--controller, --username, --password, --insecure, --timeout).

use secrecy::SecretString;

use ctrlink_core::{ControllerConfig, Credentials};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use ctrlink_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ControllerConfig` from the config file, profile, and CLI
/// overrides. Flags win over the profile.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match (cfg.profiles.get(&profile_name), &global.controller) {
        (Some(profile), _) => profile.clone(),
        (None, Some(_)) => Profile::default(),
        (None, None) if global.profile.is_some() => {
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    let username = global.username.clone().or(profile.username);
    // A --password flag replaces every other password source.
    let explicit = match (&username, &global.password) {
        (Some(user), Some(password)) => Some(Credentials::new(
            user.clone(),
            SecretString::from(password.clone()),
        )),
        _ => None,
    };

    let profile = Profile {
        controller: global.controller.clone().unwrap_or(profile.controller),
        username: if explicit.is_some() { None } else { username },
        insecure: Some(global.insecure || profile.insecure.unwrap_or(cfg.defaults.insecure)),
        timeout: global.timeout.or(profile.timeout),
        ..profile
    };

    let mut config =
        ctrlink_config::profile_to_controller_config(&profile, &profile_name, &cfg.defaults)?;
    if explicit.is_some() {
        config.credentials = explicit;
    }

    tracing::debug!(
        profile = %profile_name,
        url = %config.url,
        authenticated = config.credentials.is_some(),
        "resolved controller config"
    );
    Ok(config)
}
