//! CLI argument parsing with clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// vs-secrets - Synchronize solution user secrets with a remote repository
#[derive(Parser, Debug)]
#[command(name = "vs-secrets")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Never prompt; fail instead of starting interactive authorization
    #[arg(long, global = true, env = "VS_SECRETS_BATCH")]
    pub batch: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create (or clear) the encryption key
    Init(KeyArgs),

    /// Re-encrypt every remote bundle with a new key
    Changekey(ChangekeyArgs),

    /// Upload local secrets
    Push(PathArgs),

    /// Download remote secrets into the local secret files
    Pull(PathArgs),

    /// Compare local and remote secrets
    Status(PathArgs),

    /// List solutions and the secret files they declare
    Search(PathArgs),

    /// Show or change the default configuration
    Configure(ConfigureArgs),
}

/// Source of the encryption key
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Passphrase the key is derived from (prompted when omitted)
    #[arg(short, long, env = "VS_SECRETS_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// File whose contents the key is derived from
    #[arg(short, long, conflicts_with = "passphrase")]
    pub keyfile: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ChangekeyArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Solution file or directory to search (default: current directory)
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Default repository (github or azurekv)
    #[arg(long)]
    pub repository: Option<String>,

    /// Azure Key Vault URL
    #[arg(long)]
    pub azure_key_vault_url: Option<String>,

    /// OAuth application client id for the GitHub device flow
    #[arg(long)]
    pub github_client_id: Option<String>,

    /// User secrets root directory
    #[arg(long)]
    pub secrets_root: Option<PathBuf>,

    /// Discard the configuration file and start from defaults
    #[arg(long)]
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vs-secrets", "push", "Contoso.sln", "--batch", "-vv"]).unwrap();
        assert!(cli.batch);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Push(args) => assert_eq!(args.path, Some(PathBuf::from("Contoso.sln"))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_passphrase_conflicts_with_keyfile() {
        let result = Cli::try_parse_from([
            "vs-secrets",
            "init",
            "--passphrase",
            "secret",
            "--keyfile",
            "key.bin",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_changekey_yes() {
        let cli = Cli::try_parse_from(["vs-secrets", "changekey", "-y", "-p", "next"]).unwrap();
        match cli.command {
            Commands::Changekey(args) => {
                assert!(args.yes);
                assert_eq!(args.key.passphrase.as_deref(), Some("next"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
