//! Clap derive structures for the `headlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// headlink -- headset telemetry agent
#[derive(Debug, Parser)]
#[command(
    name = "headlink",
    version,
    about = "Headset telemetry agent for call-center desks",
    long_about = "Watches the operator's headset, reports telemetry, enforces the\n\
        allowed-device list and maps headset buttons to actions.",
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
    /// Configuration file (default: platform config directory)
    #[arg(long, env = "HEADLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent until interrupted
    Run(RunArgs),

    /// Manage the allowed-device list
    #[command(alias = "wl")]
    Whitelist(WhitelistArgs),

    /// Manage button-to-action mappings
    #[command(alias = "km")]
    Keymap(KeymapArgs),

    /// Decode a raw HID report given as hex
    Decode(DecodeArgs),

    /// Inspect and edit the agent configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Start in simulation mode even if a headset is attached
    #[arg(long)]
    pub simulate: bool,

    /// Print the telemetry payload every N seconds
    #[arg(long, value_name = "SECS")]
    pub report: Option<u64>,
}

// ── Whitelist ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WhitelistArgs {
    #[command(subcommand)]
    pub command: WhitelistCommand,
}

#[derive(Debug, Subcommand)]
pub enum WhitelistCommand {
    /// Show the policy and allowed serials
    #[command(alias = "ls")]
    List,

    /// Allow a serial number
    Add { serial: String },

    /// Remove a serial number
    #[command(alias = "rm")]
    Remove { serial: String },

    /// Turn enforcement on
    Enable,

    /// Turn enforcement off (every device is allowed)
    Disable,

    /// Set what happens to unauthorized devices
    Mode { mode: BlockModeArg },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BlockModeArg {
    /// Log only
    None,
    /// Mute the device and silence its ringer
    Soft,
    /// Alert the operator
    Notify,
}

// ── Keymap ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct KeymapArgs {
    #[command(subcommand)]
    pub command: KeymapCommand,
}

#[derive(Debug, Subcommand)]
pub enum KeymapCommand {
    /// Show the current mappings
    #[command(alias = "ls")]
    Show,

    /// Map a button to an action
    Set(KeymapSetArgs),

    /// Remove a button mapping
    #[command(alias = "rm")]
    Remove { button: String },
}

#[derive(Debug, Args)]
pub struct KeymapSetArgs {
    /// Button name (e.g. Mute, HookSwitch, Flash)
    pub button: String,

    /// Action type: api_call, exec, socket_emit, notify, play_sound, none
    pub action: String,

    #[arg(long)]
    pub url: Option<String>,

    /// HTTP method for api_call (GET or POST)
    #[arg(long)]
    pub method: Option<String>,

    #[arg(long)]
    pub body: Option<String>,

    /// Shell command for exec
    #[arg(long)]
    pub cmd: Option<String>,

    /// Button name sent by socket_emit (defaults to the pressed button)
    #[arg(long)]
    pub event: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub message: Option<String>,

    /// Sound file, or "beep"
    #[arg(long)]
    pub sound: Option<String>,
}

// ── Decode ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Report bytes as hex, e.g. "01 02" or "0102"
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store the realtime token in the system keyring
    SetToken { token: String },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: Shell,
}
