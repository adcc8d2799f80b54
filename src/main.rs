use anyhow::{anyhow, Result};
use clap::Parser;
use hitshell::cli::RootArgs;
use hitshell::config::{load_config, resolve_config_path, ConsoleConfig};
use hitshell::console::{run_interactive, run_script, Capabilities, NetworkServices, Session};
use hitshell::environment::Mode;
use hitshell::prompt::StdTerminal;
use hitshell::server::ServerControl;
use hitshell::services::{
    HttpAdHost, HttpMarketplace, HttpProvisioner, JsonParticipantStore, LocalProcessController,
};
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let config_path = resolve_config_path(args.config.as_deref(), &args.project)?;
    let config = load_config(&config_path)?;
    let process = LocalProcessController::new(&config.server, &args.project);
    let server = ServerControl::new(
        Box::new(process),
        Duration::from_secs(config.server.state_timeout_secs),
    );
    let caps = if args.offline {
        Capabilities::Offline
    } else {
        Capabilities::Networked(network_services(&config, &args.project))
    };
    let mut session = Session::new(config, config_path, args.project.clone(), server, caps)?;

    let mut term = StdTerminal;
    if args.execute.is_empty() {
        return run_interactive(&mut session, &mut term);
    }
    let failed = run_script(&mut session, &mut term, &args.execute);
    if failed > 0 {
        return Err(anyhow!(
            "{failed} of {} commands failed",
            args.execute.len()
        ));
    }
    Ok(())
}

/// Logs go to stderr so they never interleave with console output.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("HITSHELL_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn network_services(config: &ConsoleConfig, project_root: &Path) -> NetworkServices {
    let timeout = Duration::from_secs(config.marketplace.timeout_secs);
    let mode = Mode::from_sandbox_flag(config.hit.using_sandbox);
    NetworkServices {
        marketplace: Box::new(HttpMarketplace::new(&config.marketplace, &config.aws, mode)),
        ad_host: Box::new(HttpAdHost::new(&config.ad_server.location, timeout)),
        provisioner: Box::new(
            HttpProvisioner::new(&config.provisioning.endpoint, &config.aws.region, timeout)
                .with_credentials(&config.aws.access_key_id, &config.aws.secret_access_key),
        ),
        participants: Box::new(JsonParticipantStore::new(
            project_root.join(&config.console.participants_path),
        )),
    }
}
