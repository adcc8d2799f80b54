//! Experiment server control: start/stop with bounded polling, log tail and
//! debug links.
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, ConsoleResult};
use crate::provisioning::Relaunch;
use crate::report::Report;
use crate::services::{ProcessController, ServerState};
use crate::util::{debug_query, tail_lines};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const LOG_TAIL_LINES: usize = 20;

pub struct ServerControl {
    process: Box<dyn ProcessController>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ServerControl {
    pub fn new(process: Box<dyn ProcessController>, timeout: Duration) -> Self {
        Self {
            process,
            poll_interval: POLL_INTERVAL,
            timeout,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&mut self) -> ServerState {
        self.process.state()
    }

    pub fn is_running(&mut self) -> bool {
        self.state() == ServerState::Running
    }

    /// Running, or caught between start and stop.
    pub fn is_active(&mut self) -> bool {
        matches!(
            self.state(),
            ServerState::Running | ServerState::Transitioning
        )
    }

    pub fn status_line(&mut self) -> &'static str {
        match self.state() {
            ServerState::Running => "Server: currently online",
            ServerState::Stopped => "Server: currently offline",
            ServerState::Transitioning => "Server: please wait",
        }
    }

    pub fn launch(&mut self) -> ConsoleResult<Report> {
        if self.is_running() {
            return Ok(Report::line("Server is already running."));
        }
        self.process
            .start()
            .map_err(|err| ConsoleError::remote("server launch", err))?;
        self.wait_for(ServerState::Running)
            .map_err(|err| ConsoleError::remote("server launch", err))?;
        Ok(Report::line("Experiment server launched."))
    }

    pub fn shutdown(&mut self) -> ConsoleResult<Report> {
        if self.state() == ServerState::Stopped {
            return Ok(Report::line("Server is not running."));
        }
        self.process
            .stop()
            .map_err(|err| ConsoleError::remote("server shutdown", err))?;
        self.wait_for(ServerState::Stopped)
            .map_err(|err| ConsoleError::remote("server shutdown", err))?;
        Ok(Report::line("Experiment server shut down."))
    }

    pub fn relaunch(&mut self) -> ConsoleResult<Report> {
        let mut report = self.shutdown()?;
        report.extend(self.launch()?);
        Ok(report)
    }

    /// Restart the server when a settings change calls for it.
    pub fn apply(&mut self, relaunch: Relaunch) -> ConsoleResult<Option<Report>> {
        let needed = match relaunch {
            Relaunch::Never => false,
            Relaunch::IfRunning => self.is_running(),
            Relaunch::IfRunningOrTransitioning => self.is_active(),
        };
        if !needed {
            return Ok(None);
        }
        tracing::info!(?relaunch, "relaunching server for new settings");
        self.relaunch().map(Some)
    }

    fn wait_for(&mut self, target: ServerState) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.process.state() == target {
                tracing::debug!(
                    ?target,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "server reached state"
                );
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(anyhow!(
                    "timed out after {}s waiting for the server to reach {}",
                    self.timeout.as_secs(),
                    target.prompt_label()
                ));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Randomized link into the locally served ad, optionally opened in a
    /// browser.
    pub fn debug(&mut self, config: &ConsoleConfig, print_only: bool) -> ConsoleResult<Report> {
        if !self.is_running() {
            return Err(ConsoleError::Refused(
                "Sorry, you need to have the server running to debug your experiment. Try 'server launch' first."
                    .to_string(),
            ));
        }
        let url = debug_link(&config.server.host, config.server.port);
        if print_only {
            return Ok(Report::line(format!(
                "Here's your randomized debug link, feel free to request another:\n\t{url}"
            )));
        }
        open_in_browser(&url).map_err(|err| ConsoleError::remote("launch browser", err))?;
        Ok(Report::line(format!(
            "Launching browser pointed at your randomized debug link, feel free to request another.\n\t{url}"
        )))
    }
}

pub fn debug_link(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/ad?{}", debug_query(true))
}

fn open_in_browser(url: &str) -> Result<()> {
    let opener = which::which("xdg-open")
        .or_else(|_| which::which("open"))
        .context("find a browser opener (xdg-open or open)")?;
    Command::new(&opener)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawn {}", opener.display()))?;
    Ok(())
}

/// Last lines of the server log.
pub fn log_tail(config: &ConsoleConfig, project_root: &Path) -> ConsoleResult<Report> {
    let path = project_root.join(&config.server.logfile);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("read server log {}", path.display()))?;
    let lines = tail_lines(&text, LOG_TAIL_LINES);
    if lines.is_empty() {
        return Ok(Report::line("server log is empty"));
    }
    Ok(Report::line(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProcess;

    fn control(process: FakeProcess) -> ServerControl {
        ServerControl::new(Box::new(process), Duration::from_millis(50))
            .with_poll_interval(Duration::ZERO)
    }

    #[test]
    fn launch_waits_for_running() {
        let mut server = control(FakeProcess::new(ServerState::Stopped));
        server.launch().expect("launch");
        assert!(server.is_running());
        server.shutdown().expect("shutdown");
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn stuck_process_times_out() {
        let mut server = control(FakeProcess::stuck());
        let err = server.launch().expect_err("timeout");
        assert!(err.to_string().contains("timed out"));
        assert_eq!(server.state(), ServerState::Transitioning);
    }

    #[test]
    fn relaunch_policy_follows_current_state() {
        let mut server = control(FakeProcess::new(ServerState::Stopped));
        assert!(server.apply(Relaunch::IfRunning).expect("apply").is_none());
        server.launch().expect("launch");
        assert!(server.apply(Relaunch::Never).expect("apply").is_none());
        let report = server
            .apply(Relaunch::IfRunning)
            .expect("apply")
            .expect("relaunched");
        assert_eq!(
            report.to_string(),
            "Experiment server shut down.\nExperiment server launched."
        );
    }

    #[test]
    fn debug_needs_a_running_server() {
        let config = ConsoleConfig::default();
        let mut server = control(FakeProcess::new(ServerState::Stopped));
        assert!(matches!(
            server.debug(&config, true),
            Err(ConsoleError::Refused(_))
        ));
        server.launch().expect("launch");
        let report = server.debug(&config, true).expect("debug");
        assert!(report
            .to_string()
            .contains("http://localhost:22362/ad?assignmentId=debug"));
    }

    #[test]
    fn log_tail_shows_the_last_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ConsoleConfig::default();
        let text: String = (1..=30).map(|n| format!("line {n}\n")).collect();
        fs::write(dir.path().join("server.log"), text).expect("write log");
        let report = log_tail(&config, dir.path()).expect("tail");
        let rendered = report.to_string();
        assert!(rendered.starts_with("line 11\n"));
        assert!(rendered.ends_with("line 30"));
    }
}
