//! Console session state and the read-dispatch loop.
use crate::cli::parse_line;
use crate::config::{offline_problems, ConsoleConfig};
use crate::dispatch::{dispatch, Outcome};
use crate::environment::{EnvironmentState, Mode};
use crate::error::{ConsoleError, ConsoleResult};
use crate::prompt::{confirm, Terminal};
use crate::report::Report;
use crate::server::ServerControl;
use crate::services::{AdHost, Marketplace, ParticipantStore, Provisioner};
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const OFFLINE_BANNER: &str = "\
You are running the console in offline mode.
Local experiment server and database commands work; HIT, worker, account and
remote database commands need a network session.";

const QUIT_QUESTION: &str =
    "Quitting shell will shut down experiment server. Really quit? y or n: ";

/// Remote collaborators available to a networked session.
pub struct NetworkServices {
    pub marketplace: Box<dyn Marketplace>,
    pub ad_host: Box<dyn AdHost>,
    pub provisioner: Box<dyn Provisioner>,
    pub participants: Box<dyn ParticipantStore>,
}

/// What a session may talk to, fixed at construction.
pub enum Capabilities {
    Offline,
    Networked(NetworkServices),
}

impl Capabilities {
    pub fn is_offline(&self) -> bool {
        matches!(self, Capabilities::Offline)
    }

    /// The networked collaborators, or `Unavailable` naming the command.
    pub fn network(&mut self, command: &'static str) -> ConsoleResult<&mut NetworkServices> {
        match self {
            Capabilities::Networked(services) => Ok(services),
            Capabilities::Offline => Err(ConsoleError::Unavailable(command)),
        }
    }
}

/// Everything one console run owns.
pub struct Session {
    pub config: ConsoleConfig,
    pub config_path: PathBuf,
    pub project_root: PathBuf,
    pub env: EnvironmentState,
    pub server: ServerControl,
    pub caps: Capabilities,
}

impl Session {
    /// Build a session, running the start-up checks for its capability set.
    ///
    /// Offline sessions refuse configs that point at remote resources.
    /// Networked sessions point the marketplace at the configured mode and
    /// take one tally.
    pub fn new(
        config: ConsoleConfig,
        config_path: PathBuf,
        project_root: PathBuf,
        server: ServerControl,
        mut caps: Capabilities,
    ) -> Result<Self> {
        let mode = Mode::from_sandbox_flag(config.hit.using_sandbox);
        let mut env = EnvironmentState::new(mode);
        match &mut caps {
            Capabilities::Offline => {
                let problems = offline_problems(&config);
                if !problems.is_empty() {
                    return Err(anyhow!(
                        "config {} cannot run offline:\n\t{}",
                        config_path.display(),
                        problems.join("\n\t")
                    ));
                }
            }
            Capabilities::Networked(services) => {
                services.marketplace.set_mode(mode);
                env.tally(services.marketplace.as_ref());
            }
        }
        tracing::info!(
            offline = caps.is_offline(),
            %mode,
            config = %config_path.display(),
            "session started"
        );
        Ok(Self {
            config,
            config_path,
            project_root,
            env,
            server,
            caps,
        })
    }

    pub fn prompt(&mut self) -> String {
        let server = self.server.state().prompt_label();
        match self.caps {
            Capabilities::Offline => format!("[hitshell server:{server} mode:offline]$ "),
            Capabilities::Networked(_) => format!(
                "[hitshell server:{server} mode:{} #HITs:{}]$ ",
                self.env.mode().prompt_label(),
                self.env.current_count()
            ),
        }
    }

    /// Start-up banner: ad-host status text when networked.
    pub fn banner(&self) -> String {
        let status = match &self.caps {
            Capabilities::Offline => OFFLINE_BANNER.to_string(),
            Capabilities::Networked(services) => match services.ad_host.system_status() {
                Ok(text) => text.trim_end().to_string(),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "cannot fetch system status");
                    "System status unavailable.".to_string()
                }
            },
        };
        format!("{status}\nhitshell version {VERSION}\nType \"help\" for more information.")
    }

    /// Server state, plus the refreshed HIT count when networked.
    pub fn status(&mut self) -> Report {
        let mut report = Report::line(self.server.status_line());
        if let Capabilities::Networked(services) = &self.caps {
            let count = self.env.tally(services.marketplace.as_ref());
            report.info(format!(
                "Marketplace worker site - {}: {count} HITs available",
                self.env.mode()
            ));
        }
        report
    }

    /// Leave the console, shutting the server down first when the operator
    /// agrees. Returns false when the operator chose to stay.
    pub fn confirm_quit(&mut self, term: &mut dyn Terminal) -> ConsoleResult<bool> {
        if !self.server.is_active() {
            return Ok(true);
        }
        if !confirm(term, QUIT_QUESTION)? {
            return Ok(false);
        }
        let report = self.server.shutdown()?;
        term.say(&report.to_string());
        Ok(true)
    }
}

/// Interactive loop: prompt, parse, dispatch until quit or closed input.
pub fn run_interactive(session: &mut Session, term: &mut dyn Terminal) -> Result<()> {
    term.say(&session.banner());
    loop {
        let prompt = session.prompt();
        let Some(line) = term.read_line(&prompt)? else {
            match session.confirm_quit(term) {
                Ok(true) => {}
                Ok(false) => term.say("input closed; leaving the experiment server running."),
                Err(err) => term.say(&format!("*** {err}")),
            }
            return Ok(());
        };
        if let Outcome::Quit = run_line(session, term, &line) {
            return Ok(());
        }
    }
}

/// Run `--execute` commands in order. Returns how many of them failed.
pub fn run_script(session: &mut Session, term: &mut dyn Terminal, commands: &[String]) -> usize {
    let mut failed = 0;
    for line in commands {
        match run_line(session, term, line) {
            Outcome::Quit => break,
            Outcome::Failed => failed += 1,
            Outcome::Continue => {}
        }
    }
    failed
}

fn run_line(session: &mut Session, term: &mut dyn Terminal, line: &str) -> Outcome {
    if line.trim().is_empty() {
        return Outcome::Continue;
    }
    match parse_line(line) {
        Ok(command) => dispatch(session, term, command),
        Err(message) => {
            term.say(message.trim_end());
            if is_help_request(line) {
                Outcome::Continue
            } else {
                Outcome::Failed
            }
        }
    }
}

fn is_help_request(line: &str) -> bool {
    line.split_whitespace()
        .any(|word| matches!(word, "help" | "--help" | "-h"))
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
