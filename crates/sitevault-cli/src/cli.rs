use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Encrypted site data: HTTP API plus local sealing tools.
#[derive(Parser, Debug)]
#[command(
    name = "sitevault",
    about = "Passcode-sealed site data store and API",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to serving the HTTP API when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Encrypt a value and print the envelope.
    Encrypt {
        text: String,
        /// Parse the argument as JSON before sealing.
        #[arg(long)]
        json: bool,
    },
    /// Decrypt an envelope and print the recovered value.
    Decrypt { envelope: String },
    /// Seal a plaintext file into an envelope file.
    EncryptFile { input: PathBuf, output: PathBuf },
    /// Print the decrypted contents of an envelope file.
    DecryptFile { path: PathBuf },
    /// Build or inspect the sealed site bundle.
    #[command(subcommand)]
    Bundle(BundleCommand),
    /// Decrypt every stored record and print them as JSON.
    Export,
    /// Round-trip a probe record through the configured backend.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

impl Command {
    /// Whether the command reads the loaded, validated config.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Command::Version | Command::Config(_))
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BundleCommand {
    /// Seal the default site sections and write a manifest.
    Build {
        /// Output directory; defaults to the data directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Decrypt every section listed in a bundle manifest.
    Show {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["sitevault"]).expect("parse should succeed");
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from(["sitevault", "serve", "--host", "0.0.0.0", "--port", "8080"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Serve {
                host: Some("0.0.0.0".into()),
                port: Some(8080),
            })
        );
    }

    #[test]
    fn parses_encrypt_with_json_flag() {
        let cli = Cli::try_parse_from(["sitevault", "encrypt", "--json", r#"{"a": 1}"#])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Encrypt {
                text: r#"{"a": 1}"#.into(),
                json: true,
            })
        );
    }

    #[test]
    fn parses_file_commands() {
        let cli = Cli::try_parse_from(["sitevault", "encrypt-file", "notes.txt", "notes.enc"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::EncryptFile {
                input: "notes.txt".into(),
                output: "notes.enc".into(),
            })
        );
        let cli = Cli::try_parse_from(["sitevault", "decrypt-file", "notes.enc"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::DecryptFile {
                path: "notes.enc".into()
            })
        );
    }

    #[test]
    fn parses_bundle_subcommands() {
        let cli = Cli::try_parse_from(["sitevault", "bundle", "build", "--dir", "site/data"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Bundle(BundleCommand::Build {
                dir: Some("site/data".into())
            }))
        );
        let cli =
            Cli::try_parse_from(["sitevault", "bundle", "show"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Bundle(BundleCommand::Show { dir: None }))
        );
    }

    #[test]
    fn parses_health_and_config_init() {
        let cli = Cli::try_parse_from(["sitevault", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
        let cli =
            Cli::try_parse_from(["sitevault", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn version_and_config_init_skip_config_loading() {
        assert!(!Command::Version.needs_config());
        assert!(!Command::Config(ConfigCommand::Init).needs_config());
        assert!(Command::Health.needs_config());
        assert!(Command::Serve {
            host: None,
            port: None
        }
        .needs_config());
    }

    #[test]
    fn decrypt_requires_an_envelope() {
        assert!(Cli::try_parse_from(["sitevault", "decrypt"]).is_err());
    }
}
