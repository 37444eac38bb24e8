use clap::{Args, Parser, Subcommand};
use prefvault_core::storage::ValueKind;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "prefvault",
    about = "Encrypted typed key-value storage backed by the platform key store",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Run a save/load/remove round-trip against the encrypted store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Encrypt and store a value.
    Set {
        #[command(flatten)]
        key: KeyArgs,
        /// Value text; bytes are given as standard base64.
        value: String,
    },
    /// Print a stored value.
    Get {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Delete a stored value (no-op if absent).
    Remove {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Print whether a value is stored.
    Contains {
        #[command(flatten)]
        key: KeyArgs,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct KeyArgs {
    /// Key name.
    pub name: String,
    /// Value kind: text, int32, int64, float32, float64, bool or bytes.
    #[arg(short, long, default_value = "text", value_parser = parse_kind)]
    pub kind: ValueKind,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

fn parse_kind(raw: &str) -> Result<ValueKind, String> {
    raw.parse::<ValueKind>().map_err(|e| e.to_string())
}
