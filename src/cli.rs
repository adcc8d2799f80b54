//! Command-line parsing for the process and for each console line.
//!
//! `RootArgs` parses the process arguments once. Every line typed at the
//! console prompt (or passed with `--execute`) is split with `shell-words`
//! and parsed as a `ConsoleLine`.
use crate::environment::Mode;
use crate::services::{AssignmentStatus, HitFilter};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hitshell",
    version,
    about = "Operator console for crowdsourced experiment campaigns",
    after_help = "Examples:\n  hitshell\n  hitshell --offline --execute status\n  hitshell --config ./hitshell.json --execute 'mode live' --execute 'hit list active'"
)]
pub struct RootArgs {
    /// Config file (default: ./hitshell.json, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Project root holding templates/ad.html and the server log
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Run without marketplace, ad server or provisioning access
    #[arg(long)]
    pub offline: bool,

    /// Log at debug level unless HITSHELL_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    /// Run a console command and exit; repeat to run several in order
    #[arg(short = 'e', long = "execute", value_name = "COMMAND")]
    pub execute: Vec<String>,
}

/// One console input line.
#[derive(Parser, Debug)]
#[command(
    name = "hitshell",
    no_binary_name = true,
    disable_version_flag = true,
    subcommand_required = true
)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConsoleCommand {
    /// Show server state (and active HIT count when networked)
    Status,
    /// Show the console version
    Version,
    /// Reprint the start-up banner
    #[command(name = "system_status")]
    SystemStatus,
    /// Print, reload or save the session config
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Switch between sandbox and live; toggles when no mode is given
    Mode {
        #[arg(value_enum)]
        which: Option<Mode>,
    },
    /// Control the local experiment server
    #[command(subcommand)]
    Server(ServerCommand),
    /// Build a randomized debug link into the running server
    Debug {
        /// Only print the link; do not launch a browser
        #[arg(short, long)]
        print_only: bool,
    },
    /// Create and manage HITs
    #[command(subcommand)]
    Hit(HitCommand),
    /// Review and pay workers
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Marketplace account commands
    #[command(subcommand)]
    Amt(AmtCommand),
    /// Database settings and remote instances
    #[command(subcommand)]
    Db(DbCommand),
    /// Leave the console
    Quit,
    /// Leave the console
    Exit,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Print,
    Reload,
    /// Write the in-memory config back to its file
    Save,
}

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    Launch,
    Shutdown,
    Relaunch,
    /// Show the last lines of the server log
    Log,
}

#[derive(Subcommand, Debug)]
pub enum HitCommand {
    /// Register an ad, create a HIT and bind them
    Create {
        workers: Option<String>,
        reward: Option<String>,
        /// Duration in hours
        duration: Option<String>,
    },
    /// Add assignments and/or time to a HIT
    Extend {
        hit_id: String,
        #[arg(long, value_name = "NUMBER")]
        assignments: Option<u32>,
        #[arg(long, value_name = "MINUTES")]
        expiration: Option<u32>,
    },
    /// Expire HITs early
    Expire(HitTargets),
    /// Dispose of reviewable HITs and delete their ads
    Dispose(HitTargets),
    List {
        #[arg(value_enum)]
        filter: HitFilter,
    },
}

#[derive(Args, Debug)]
pub struct HitTargets {
    /// Every matching HIT in the current mode; ids given alongside are ignored
    #[arg(long)]
    pub all: bool,

    pub hit_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WorkerTargets {
    /// Resolve assignments from this HIT
    #[arg(long = "hit", value_name = "HIT_ID", conflicts_with = "assignment_ids")]
    pub hit: Option<String>,

    pub assignment_ids: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    Approve(WorkerTargets),
    Reject(WorkerTargets),
    /// Pay a bonus; by HIT skips workers already paid
    Bonus {
        #[command(flatten)]
        targets: WorkerTargets,
        /// Use the bonus computed for each participant
        #[arg(long, conflicts_with = "amount")]
        auto: bool,
        #[arg(long, value_name = "DOLLARS", allow_negative_numbers = true)]
        amount: Option<f64>,
        /// Message shown to workers; prompted for when missing
        #[arg(long)]
        reason: Option<String>,
    },
    List {
        #[arg(value_enum)]
        status: WorkerFilter,
        #[arg(long = "hit", value_name = "HIT_ID")]
        hit: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerFilter {
    Submitted,
    Approved,
    Rejected,
    All,
}

impl WorkerFilter {
    pub fn status(&self) -> Option<AssignmentStatus> {
        match self {
            WorkerFilter::Submitted => Some(AssignmentStatus::Submitted),
            WorkerFilter::Approved => Some(AssignmentStatus::Approved),
            WorkerFilter::Rejected => Some(AssignmentStatus::Rejected),
            WorkerFilter::All => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AmtCommand {
    Balance,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "snake_case")]
pub enum DbCommand {
    GetConfig,
    /// Use a local SQLite file
    UseLocalFile { filename: Option<String> },
    /// Point the database setting at a remote instance
    UseAwsInstance {
        instance_id: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        dbname: Option<String>,
    },
    AwsListRegions,
    AwsGetRegion,
    AwsSetRegion { region: Option<String> },
    AwsListInstances,
    AwsDeleteInstance { instance_id: Option<String> },
    /// Request a new instance; missing fields are prompted for
    AwsCreateInstance {
        instance_id: Option<String>,
        size: Option<String>,
        username: Option<String>,
        password: Option<String>,
        dbname: Option<String>,
    },
}

/// Parse one console line into a command.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let words = shell_words::split(line).map_err(|err| format!("cannot parse line: {err}"))?;
    ConsoleLine::try_parse_from(words)
        .map(|parsed| parsed.command)
        .map_err(|err| err.render().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn grammar_is_consistent() {
        RootArgs::command().debug_assert();
        ConsoleLine::command().debug_assert();
    }

    #[test]
    fn db_subcommands_use_snake_case() {
        let command = parse_line("db aws_set_region eu-west-1").expect("parse");
        assert!(matches!(
            command,
            ConsoleCommand::Db(DbCommand::AwsSetRegion { region: Some(ref name) }) if name == "eu-west-1"
        ));
    }

    #[test]
    fn quoted_reason_stays_one_argument() {
        let command =
            parse_line("worker bonus --hit H1 --auto --reason 'thanks for your time'").expect("parse");
        match command {
            ConsoleCommand::Worker(WorkerCommand::Bonus {
                targets, reason, auto, ..
            }) => {
                assert_eq!(targets.hit.as_deref(), Some("H1"));
                assert!(auto);
                assert_eq!(reason.as_deref(), Some("thanks for your time"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bonus_amount_sources_are_exclusive() {
        assert!(parse_line("worker bonus A1 --auto --amount 1.00").is_err());
        assert!(parse_line("worker bonus --hit H1 A1 --auto").is_err());
        assert!(parse_line("worker bonus A1 --amount 1.00").is_ok());
    }

    #[test]
    fn mode_toggle_and_explicit_target() {
        assert!(matches!(
            parse_line("mode").expect("parse"),
            ConsoleCommand::Mode { which: None }
        ));
        assert!(matches!(
            parse_line("mode live").expect("parse"),
            ConsoleCommand::Mode {
                which: Some(Mode::Live)
            }
        ));
    }

    #[test]
    fn unknown_commands_are_reported() {
        let err = parse_line("launch rockets").expect_err("unknown");
        assert!(err.contains("unrecognized subcommand"));
    }
}
