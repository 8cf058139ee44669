//! Clap derive structures for the `htpi` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// htpi -- command-line client for the HTPI customer portal
#[derive(Debug, Parser)]
#[command(
    name = "htpi",
    version,
    about = "Work with the HTPI customer portal from the command line",
    long_about = "Work with the HTPI customer portal from the command line.\n\n\
        Log in to an HTPI gateway, manage your profile, and read or change \
        patients, claims and insurance policies over the live event channel.",
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
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "HTPI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway URL (overrides profile)
    #[arg(long, short = 'g', env = "HTPI_GATEWAY_URL", global = true)]
    pub gateway: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HTPI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "HTPI_INSECURE", global = true)]
    pub insecure: bool,

    /// HTTP timeout in seconds (overrides profile)
    #[arg(long, env = "HTPI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session token
    Login(LoginArgs),

    /// Log out and forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// View or edit your portal profile
    #[command(alias = "me")]
    Profile(ProfileArgs),

    /// Change, forget or reset your password
    #[command(alias = "pw")]
    Password(PasswordArgs),

    /// Manage patients
    #[command(alias = "pt")]
    Patients(RecordArgs),

    /// Manage claims
    #[command(alias = "cl")]
    Claims(RecordArgs),

    /// Manage insurance policies
    #[command(alias = "pol")]
    Policies(RecordArgs),

    /// Stream live change broadcasts
    Watch(WatchArgs),

    /// Send a raw correlated request (e.g. "patient:get")
    Request(RequestArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AUTH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Account email (prompted when omitted)
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Read the password from stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Show your profile
    Show,

    /// Update profile fields
    Update {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct PasswordArgs {
    #[command(subcommand)]
    pub command: PasswordCommand,
}

#[derive(Debug, Subcommand)]
pub enum PasswordCommand {
    /// Change the password of the logged-in account
    Change,

    /// Request a password reset email
    Forgot {
        /// Account email
        email: String,
    },

    /// Set a new password with a reset token
    Reset {
        /// Token from the reset email
        token: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RECORDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub command: RecordCommand,
}

#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    /// List records
    #[command(alias = "ls")]
    List {
        /// Query filter as key=value (repeatable)
        #[arg(long, short = 'f', value_name = "KEY=VALUE")]
        filter: Vec<String>,
    },

    /// Show one record
    Get {
        /// Record ID
        id: String,
    },

    /// Create a record from JSON
    Create {
        /// Inline JSON object
        #[arg(long, short = 'd', conflicts_with = "from_file")]
        data: Option<String>,

        /// Read the JSON object from a file
        #[arg(long, short = 'F')]
        from_file: Option<PathBuf>,
    },

    /// Update fields of a record
    Update {
        /// Record ID
        id: String,

        /// Inline JSON object with the changed fields
        #[arg(long, short = 'd', conflicts_with = "from_file")]
        data: Option<String>,

        /// Read the changed fields from a file
        #[arg(long, short = 'F')]
        from_file: Option<PathBuf>,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete {
        /// Record ID
        id: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH / REQUEST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Patients,
    Claims,
    Policies,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Collections to watch (default: all)
    #[arg(long, short = 'r', value_enum)]
    pub resource: Vec<RecordKind>,

    /// Exit after this many broadcasts
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Operation name, e.g. "patient:list"
    pub operation: String,

    /// JSON payload
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with guided setup
    Init,

    /// Display current configuration
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
