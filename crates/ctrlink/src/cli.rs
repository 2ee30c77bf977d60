//! Clap derive structures for the `ctrlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ctrlink -- talk to automation controllers from the command line
#[derive(Debug, Parser)]
#[command(
    name = "ctrlink",
    version,
    about = "Discover, inspect and drive automation controllers",
    long_about = "A CLI for automation controllers.\n\n\
        Lists panels and devices, watches live sensor values over long-poll,\n\
        sends control and device commands, and finds controllers on the LAN.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "CTRLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller URL (overrides profile)
    #[arg(long, short = 'c', env = "CTRLINK_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Basic-auth user (overrides profile)
    #[arg(long, short = 'u', env = "CTRLINK_USERNAME", global = true)]
    pub username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "CTRLINK_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CTRLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CTRLINK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "CTRLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find controllers on the local network
    Discover(DiscoverArgs),

    /// List panels
    Panels,

    /// Show one panel and its sensor links
    Panel {
        /// Panel name
        name: String,
    },

    /// List devices
    #[command(alias = "dev")]
    Devices,

    /// Show one device with its commands and sensors
    Device {
        /// Device name
        name: String,
    },

    /// Stream live sensor values for a panel or device
    Watch(WatchArgs),

    /// Send a control command to a widget sender
    Control {
        /// Sender id of the widget
        sender: i32,

        /// Command payload (e.g. "on", "50")
        data: String,
    },

    /// Invoke a named device command
    #[command(name = "command", alias = "cmd")]
    DeviceCommand {
        /// Device name
        device: String,

        /// Command name
        name: String,

        /// Optional command parameter
        #[arg(long)]
        param: Option<String>,
    },

    /// Fetch a controller resource (image, icon, ...)
    Resource(ResourceArgs),

    /// Log out and forget credentials for this session
    Logout,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// TCP port announcements are sent back to
    #[arg(long, default_value = "2346")]
    pub port: u16,

    /// Search duration in seconds (0 searches until interrupted)
    #[arg(long, short = 'd', default_value = "5")]
    pub duration: u64,

    /// Treat each answering address as one controller
    #[arg(long)]
    pub by_address: bool,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(subcommand)]
    pub target: WatchTarget,

    /// Stop after this many seconds (default: until interrupted)
    #[arg(long, short = 'd', global = true)]
    pub duration: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum WatchTarget {
    /// Watch every sensor linked from a panel's widgets
    Panel {
        /// Panel name
        name: String,
    },

    /// Watch a device's sensors
    Device {
        /// Device name
        name: String,
    },
}

// ── Resource ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ResourceArgs {
    /// Resource path relative to the controller base URL
    pub name: String,

    /// Only show metadata (content type, last modified)
    #[arg(long, conflicts_with = "out")]
    pub details: bool,

    /// Write the bytes to this file instead of stdout
    #[arg(long, short = 'O')]
    pub out: Option<PathBuf>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// Create or update a profile
    SetProfile(SetProfileArgs),
}

#[derive(Debug, Args)]
pub struct SetProfileArgs {
    /// Profile name
    pub name: String,

    /// Controller base URL
    #[arg(long = "url")]
    pub controller: Option<String>,

    /// Basic-auth user
    #[arg(long = "user")]
    pub username: Option<String>,

    /// Environment variable holding the password
    #[arg(long)]
    pub password_env: Option<String>,

    /// Custom CA certificate
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed certificates for this profile
    #[arg(long)]
    pub insecure: Option<bool>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
