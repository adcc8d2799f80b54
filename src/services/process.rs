//! Local experiment-server process controller.
use super::{ProcessController, ServerState};
use crate::config::ServerConfig;
use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Spawns `server.command` and judges its state from the child process and
/// whether `host:port` accepts connections.
///
/// A server this console did not start is judged by the port alone.
pub struct LocalProcessController {
    command: String,
    host: String,
    port: u16,
    logfile: PathBuf,
    workdir: PathBuf,
    child: Option<Child>,
}

impl LocalProcessController {
    pub fn new(config: &ServerConfig, workdir: &Path) -> Self {
        Self {
            command: config.command.clone(),
            host: config.host.clone(),
            port: config.port,
            logfile: workdir.join(&config.logfile),
            workdir: workdir.to_path_buf(),
            child: None,
        }
    }

    fn port_open(&self) -> bool {
        let Ok(addrs) = (self.host.as_str(), self.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
    }

    fn child_alive(&mut self) -> Option<bool> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                tracing::debug!(%status, "server process exited");
                Some(false)
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot poll server process");
                Some(false)
            }
        }
    }
}

impl ProcessController for LocalProcessController {
    fn start(&mut self) -> Result<()> {
        let args = shell_words::split(&self.command)
            .with_context(|| format!("parse server command: {}", self.command))?;
        let Some((program, rest)) = args.split_first() else {
            return Err(anyhow!("server.command is empty"));
        };
        let program = which::which(program)
            .with_context(|| format!("find server command {program} on PATH"))?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.logfile)
            .with_context(|| format!("open server log {}", self.logfile.display()))?;
        let log_err = log.try_clone().context("clone server log handle")?;
        let child = Command::new(&program)
            .args(rest)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .spawn()
            .with_context(|| format!("spawn {}", program.display()))?;
        tracing::info!(pid = child.id(), program = %program.display(), "server process started");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(anyhow!(
                "server on {}:{} was not started by this console",
                self.host,
                self.port
            ));
        };
        child.kill().context("stop server process")?;
        tracing::info!(pid = child.id(), "server process killed");
        Ok(())
    }

    fn state(&mut self) -> ServerState {
        let listening = self.port_open();
        match self.child_alive() {
            None if listening => ServerState::Running,
            None => ServerState::Stopped,
            Some(true) if listening => ServerState::Running,
            Some(false) if !listening => {
                self.child = None;
                ServerState::Stopped
            }
            Some(_) => ServerState::Transitioning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn config_for(port: u16) -> ServerConfig {
        ServerConfig {
            port,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn unmanaged_server_is_judged_by_its_port() {
        let dir = tempfile::tempdir().expect("tempdir");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let mut controller = LocalProcessController::new(&config_for(port), dir.path());
        assert_eq!(controller.state(), ServerState::Running);
        assert!(controller.stop().is_err());
        drop(listener);
        assert_eq!(controller.state(), ServerState::Stopped);
    }

    #[test]
    fn missing_command_fails_to_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config_for(1);
        config.command = "hitshell-no-such-server --port 1".to_string();
        let mut controller = LocalProcessController::new(&config, dir.path());
        let err = controller.start().expect_err("missing binary");
        assert!(format!("{err:#}").contains("hitshell-no-such-server"));
    }

    #[cfg(unix)]
    #[test]
    fn stop_ends_a_server_this_console_started() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config_for(1);
        config.command = "sleep 30".to_string();
        let mut controller = LocalProcessController::new(&config, dir.path());
        controller.start().expect("start");
        assert_eq!(controller.state(), ServerState::Transitioning);

        controller.stop().expect("stop");
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.state() != ServerState::Stopped {
            assert!(Instant::now() < deadline, "server process still alive");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(controller.stop().is_err());
    }
}
