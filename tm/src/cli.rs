//! CLI command definitions and subcommands

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use tracing::debug;

use crate::domain::Plan;

/// tripmate - conversational itinerary assistant
#[derive(Parser)]
#[command(
    name = "tm",
    about = "Conversational travel itinerary assistant with rain-aware alternatives",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat about a plan (interactive unless --message is given)
    Chat {
        /// Plan JSON file used to start the session
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Session identifier
        #[arg(short, long, default_value = "local")]
        session: String,

        /// Send a single message and print the reply
        #[arg(short, long)]
        message: Option<String>,

        /// Output format for --message
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Propose rain alternatives for a plan
    Propose {
        /// Plan JSON file
        #[arg(short, long)]
        plan: PathBuf,

        /// Rainy dates (YYYY-MM-DD, comma separated); the forecast is used when omitted
        #[arg(short, long, value_delimiter = ',')]
        rainy_dates: Option<Vec<NaiveDate>>,

        /// Stop titles that must not be replaced
        #[arg(long = "protect", value_delimiter = ',')]
        protect: Vec<String>,

        /// Alternatives per stop
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Attach nearby parking to every stop of a plan
    Parking {
        /// Plan JSON file
        #[arg(short, long)]
        plan: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the rain forecast for the configured grid point
    Weather {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Read a plan from a JSON file and renumber its stops
pub fn load_plan(path: &Path) -> Result<Plan> {
    debug!(?path, "load_plan: called");
    let content = fs::read_to_string(path).context(format!("Failed to read plan {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content).context("Failed to parse plan JSON")?;
    Ok(plan.normalized())
}

/// Whether a credential environment variable is set
pub struct CredentialCheck {
    pub name: &'static str,
    pub available: bool,
}

impl CredentialCheck {
    pub fn check(name: &'static str) -> Self {
        let available = std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false);
        debug!(name, available, "CredentialCheck::check: called");
        Self { name, available }
    }
}

/// Check the credentials the default configuration reads
pub fn check_credentials() -> Vec<CredentialCheck> {
    vec![
        CredentialCheck::check("OPENAI_API_KEY"),
        CredentialCheck::check("ANTHROPIC_API_KEY"),
        CredentialCheck::check("GOOGLE_API_KEY"),
    ]
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripmate")
        .join("logs")
        .join("tripmate.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with credential checks and the log path
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Credentials:\n");
    for cred in check_credentials() {
        let icon = if cred.available { "\u{2705}" } else { "\u{274C}" };
        let status = if cred.available { "set" } else { "not set" };
        help.push_str(&format!("  {} {:<18} {}\n", icon, cred.name, status));
    }

    help.push('\n');
    help.push_str("Config is read from --config, ./.tripmate.yml or ~/.config/tripmate/tripmate.yml\n");
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["tm"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_chat_defaults() {
        let cli = Cli::parse_from(["tm", "chat"]);
        match cli.command {
            Some(Command::Chat {
                plan,
                session,
                message,
                format,
            }) => {
                assert!(plan.is_none());
                assert_eq!(session, "local");
                assert!(message.is_none());
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_propose() {
        let cli = Cli::parse_from([
            "tm",
            "propose",
            "--plan",
            "plan.json",
            "--rainy-dates",
            "2025-08-20,2025-08-21",
            "--protect",
            "경포호",
            "-n",
            "2",
            "-f",
            "json",
        ]);
        match cli.command {
            Some(Command::Propose {
                rainy_dates,
                protect,
                top_n,
                format,
                ..
            }) => {
                let dates = rainy_dates.unwrap();
                assert_eq!(dates.len(), 2);
                assert_eq!(dates[1], NaiveDate::from_ymd_opt(2025, 8, 21).unwrap());
                assert_eq!(protect, vec!["경포호"]);
                assert_eq!(top_n, Some(2));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["tm", "propose", "--plan", "p.json", "--rainy-dates", "tomorrow"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["tm", "weather", "-l", "debug", "--config", "x.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_load_plan_renumbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"itinerary": [{{"index": 5, "title": "강릉역", "type": "travel"}}, {{"title": "경포호"}}]}}"#
        )
        .unwrap();
        let plan = load_plan(file.path()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.itinerary[0].index, 1);
        assert_eq!(plan.stop(2).unwrap().title, "경포호");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("table".parse::<OutputFormat>().is_err());
    }
}
