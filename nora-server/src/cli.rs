//! Command-line interface: `serve` (default) and the `.env` helper.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::services::envfile::{self, UpsertReport};

/// Nora - self-hosted AI assistant gateway
#[derive(Debug, Parser)]
#[command(name = "nora-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP gateway (the default when no command is given)
    Serve,

    /// Read or update the deployment `.env` file
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum EnvAction {
    /// Set one or more KEY=VALUE pairs; existing keys are replaced in place
    Set {
        #[arg(required = true, value_parser = envfile::parse_assignment)]
        assignments: Vec<(String, String)>,
        /// Path of the env file
        #[arg(long, default_value = ".env")]
        file: PathBuf,
    },

    /// Print the assignments of the env file, secrets masked
    Show {
        /// Path of the env file
        #[arg(long, default_value = ".env")]
        file: PathBuf,
    },
}

const SECRET_MARKERS: &[&str] = &["SECRET", "PASSWORD", "TOKEN", "API_KEY"];

pub fn env_set(file: &Path, assignments: &[(String, String)]) -> anyhow::Result<UpsertReport> {
    envfile::upsert(file, assignments).with_context(|| format!("failed to update {}", file.display()))
}

pub fn env_show(file: &Path) -> anyhow::Result<Vec<String>> {
    let pairs = envfile::parse(file).with_context(|| format!("failed to read {}", file.display()))?;
    Ok(pairs
        .into_iter()
        .map(|(key, value)| {
            let masked = SECRET_MARKERS.iter().any(|m| key.contains(m)) && !value.is_empty();
            if masked { format!("{key}=****") } else { format!("{key}={value}") }
        })
        .collect())
}

/// Run an `env` subcommand; failures exit with status 1 and a remedy.
pub fn run_env(action: EnvAction) {
    match action {
        EnvAction::Set { assignments, file } => match env_set(&file, &assignments) {
            Ok(report) => {
                println!(
                    "{}: {} updated, {} added, {} duplicate line(s) removed",
                    file.display(),
                    report.updated.len(),
                    report.added.len(),
                    report.removed_duplicates
                );
            }
            Err(e) => {
                eprintln!("error: {e:#}");
                eprintln!(
                    "hint: make sure {} is writable and every argument looks like NAME=value",
                    file.display()
                );
                std::process::exit(1);
            }
        },
        EnvAction::Show { file } => match env_show(&file) {
            Ok(lines) => lines.iter().for_each(|l| println!("{l}")),
            Err(e) => {
                eprintln!("error: {e:#}");
                eprintln!("hint: create it with `nora-server env set KEY=VALUE --file {}`", file.display());
                std::process::exit(1);
            }
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_command_means_serve() {
        let cli = Cli::try_parse_from(["nora-server"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn env_set_parses_assignments() {
        let cli = Cli::try_parse_from(["nora-server", "env", "set", "DOMAIN=nora.example.com", "USE_CLOUDFLARE=true"])
            .unwrap();
        let Some(Command::Env { action: EnvAction::Set { assignments, file } }) = cli.command else {
            panic!("expected env set");
        };
        assert_eq!(file, PathBuf::from(".env"));
        assert_eq!(assignments[0], ("DOMAIN".to_owned(), "nora.example.com".to_owned()));
        assert!(Cli::try_parse_from(["nora-server", "env", "set", "bad key=1"]).is_err());
        assert!(Cli::try_parse_from(["nora-server", "env", "set"]).is_err());
    }

    #[test]
    fn running_setup_twice_does_not_duplicate_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        std::fs::write(&file, "# generated\nSECRET_KEY=old\nAI_PROVIDER=ollama\n").unwrap();
        let pairs = vec![
            ("SECRET_KEY".to_owned(), "s3cr3t".to_owned()),
            ("CLOUDFLARE_TUNNEL_TOKEN".to_owned(), "tok".to_owned()),
        ];

        env_set(&file, &pairs).unwrap();
        let once = std::fs::read_to_string(&file).unwrap();
        let report = env_set(&file, &pairs).unwrap();
        let twice = std::fs::read_to_string(&file).unwrap();

        assert_eq!(once, twice);
        assert!(report.added.is_empty());
        assert_eq!(twice.matches("SECRET_KEY=").count(), 1);
        assert!(twice.starts_with("# generated\n"));

        let shown = env_show(&file).unwrap();
        assert!(shown.contains(&"SECRET_KEY=****".to_owned()));
        assert!(shown.contains(&"AI_PROVIDER=ollama".to_owned()));
    }

    #[test]
    fn values_written_by_env_set_configure_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        let pairs = vec![
            ("ADMIN_USERNAME".to_owned(), "root".to_owned()),
            ("ADMIN_PASSWORD".to_owned(), r#"p$ss "word" #1"#.to_owned()),
            ("SECRET_KEY".to_owned(), "multi\nline".to_owned()),
        ];
        env_set(&file, &pairs).unwrap();

        let loaded: std::collections::HashMap<String, String> = envfile::parse(&file).unwrap().into_iter().collect();
        let cfg = crate::config::Config::from_lookup(|k| loaded.get(k).cloned());
        assert_eq!(cfg.admin_username, "root");
        assert_eq!(cfg.admin_password, r#"p$ss "word" #1"#);
        assert_eq!(cfg.secret_key, "multi\nline");
        assert!(!cfg.secret_key_generated);
    }

    #[test]
    fn show_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(env_show(&dir.path().join("absent.env")).is_err());
    }
}
