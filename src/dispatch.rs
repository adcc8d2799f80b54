//! Route one parsed console command to the workflow that owns it.
//!
//! The dispatcher keeps no state of its own. Every error is printed as a
//! `*** ` line and logged; nothing is swallowed.
use crate::campaign::CampaignWorkflow;
use crate::cli::{
    AmtCommand, ConfigCommand, ConsoleCommand, DbCommand, HitCommand, ServerCommand,
    WorkerCommand,
};
use crate::config::{load_config, write_config, ConsoleConfig};
use crate::console::{NetworkServices, Session};
use crate::environment::EnvironmentState;
use crate::error::{ConsoleError, ConsoleResult};
use crate::ledger::{BonusAmount, BonusRequest, BonusTarget, PaymentLedger};
use crate::prompt::{Terminal, ValidationLoop};
use crate::provisioning::{
    database_setting, use_local_file, Applied, InstanceFields, ProvisioningWorkflow,
    SelectFields,
};
use crate::report::Report;
use crate::server::log_tail;
use crate::util::display_path;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// The command failed outright or reported failed items.
    Failed,
    Quit,
}

enum Flow {
    Show(Report),
    Quit,
}

pub fn dispatch(session: &mut Session, term: &mut dyn Terminal, command: ConsoleCommand) -> Outcome {
    match execute(session, term, command) {
        Ok(Flow::Quit) => Outcome::Quit,
        Ok(Flow::Show(report)) => {
            if !report.lines().is_empty() {
                term.say(&report.to_string());
            }
            if report.has_failures() {
                Outcome::Failed
            } else {
                Outcome::Continue
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "command failed");
            term.say(&format!("*** {err}"));
            Outcome::Failed
        }
    }
}

fn execute(
    session: &mut Session,
    term: &mut dyn Terminal,
    command: ConsoleCommand,
) -> ConsoleResult<Flow> {
    let report = match command {
        ConsoleCommand::Status => session.status(),
        ConsoleCommand::Version => {
            Report::line(format!("hitshell version {}", crate::console::VERSION))
        }
        ConsoleCommand::SystemStatus => Report::line(session.banner()),
        ConsoleCommand::Config(action) => config_command(session, action)?,
        ConsoleCommand::Mode { which } => {
            let Session {
                config, env, caps, ..
            } = session;
            let services = caps.network("mode")?;
            let mode = env.switch_mode(which, services.marketplace.as_mut());
            config.hit.using_sandbox = mode.is_sandbox();
            Report::line(format!("Entered {mode} mode"))
        }
        ConsoleCommand::Server(action) => match action {
            ServerCommand::Launch => session.server.launch()?,
            ServerCommand::Shutdown => session.server.shutdown()?,
            ServerCommand::Relaunch => session.server.relaunch()?,
            ServerCommand::Log => log_tail(&session.config, &session.project_root)?,
        },
        ConsoleCommand::Debug { print_only } => session.server.debug(&session.config, print_only)?,
        ConsoleCommand::Hit(action) => hit_command(session, term, action)?,
        ConsoleCommand::Worker(action) => worker_command(session, term, action)?,
        ConsoleCommand::Amt(AmtCommand::Balance) => {
            let Session {
                config,
                env,
                caps,
                project_root,
                ..
            } = session;
            let services = caps.network("amt balance")?;
            campaign(env, config, services, project_root).account_balance()?
        }
        ConsoleCommand::Db(action) => db_command(session, term, action)?,
        ConsoleCommand::Quit | ConsoleCommand::Exit => {
            if session.confirm_quit(term)? {
                return Ok(Flow::Quit);
            }
            Report::new()
        }
    };
    Ok(Flow::Show(report))
}

fn config_command(session: &mut Session, action: ConfigCommand) -> ConsoleResult<Report> {
    let shown = display_path(&session.config_path, Some(&session.project_root));
    match action {
        ConfigCommand::Print => {
            let text = serde_json::to_string_pretty(&session.config)
                .map_err(|err| ConsoleError::Other(err.into()))?;
            Ok(Report::line(text))
        }
        ConfigCommand::Reload => {
            session.config = load_config(&session.config_path)?;
            tracing::info!(path = %session.config_path.display(), "config reloaded");
            Ok(Report::line(format!("Config reloaded from {shown}.")))
        }
        ConfigCommand::Save => {
            write_config(&session.config_path, &session.config)?;
            tracing::info!(path = %session.config_path.display(), "config saved");
            Ok(Report::line(format!("Config saved to {shown}.")))
        }
    }
}

fn hit_command(
    session: &mut Session,
    term: &mut dyn Terminal,
    action: HitCommand,
) -> ConsoleResult<Report> {
    let Session {
        config,
        env,
        caps,
        project_root,
        ..
    } = session;
    let services = caps.network("hit")?;
    let mut campaign = campaign(env, config, services, project_root);
    match action {
        HitCommand::Create {
            workers,
            reward,
            duration,
        } => {
            let created = campaign.create_hit(
                term,
                workers.as_deref(),
                reward.as_deref(),
                duration.as_deref(),
            )?;
            Ok(Report::line(created.to_string()))
        }
        HitCommand::Extend {
            hit_id,
            assignments,
            expiration,
        } => campaign.extend_hit(&hit_id, assignments, expiration),
        HitCommand::Expire(targets) => campaign.expire_hits(targets.all, &targets.hit_ids),
        HitCommand::Dispose(targets) => campaign.dispose_hits(targets.all, &targets.hit_ids),
        HitCommand::List { filter } => campaign.list_hits(filter),
    }
}

fn worker_command(
    session: &mut Session,
    term: &mut dyn Terminal,
    action: WorkerCommand,
) -> ConsoleResult<Report> {
    let Session {
        config,
        env,
        caps,
        project_root,
        ..
    } = session;
    let services = caps.network("worker")?;
    match action {
        WorkerCommand::Approve(targets) => campaign(env, config, services, project_root)
            .approve_workers(targets.hit.as_deref(), &targets.assignment_ids),
        WorkerCommand::Reject(targets) => campaign(env, config, services, project_root)
            .reject_workers(targets.hit.as_deref(), &targets.assignment_ids),
        WorkerCommand::List { status, hit } => campaign(env, config, services, project_root)
            .list_workers(status.status(), hit.as_deref()),
        WorkerCommand::Bonus {
            targets,
            auto,
            amount,
            reason,
        } => {
            let amount = match (auto, amount) {
                (_, Some(dollars)) => BonusAmount::Fixed(dollars),
                (true, None) => BonusAmount::Auto,
                (false, None) => {
                    return Err(ConsoleError::Invalid(
                        "pass --auto or --amount DOLLARS".to_string(),
                    ))
                }
            };
            let target = match targets.hit {
                Some(hit_id) => BonusTarget::Hit(hit_id),
                None => BonusTarget::Assignments(targets.assignment_ids),
            };
            let mut ledger = PaymentLedger::new(
                services.marketplace.as_mut(),
                services.participants.as_mut(),
                ValidationLoop::new(config.console.max_prompt_attempts),
            );
            ledger.bonus(
                term,
                &BonusRequest {
                    target,
                    amount,
                    reason,
                },
            )
        }
    }
}

fn campaign<'a>(
    env: &'a mut EnvironmentState,
    config: &'a mut ConsoleConfig,
    services: &'a mut NetworkServices,
    project_root: &'a Path,
) -> CampaignWorkflow<'a> {
    CampaignWorkflow::new(
        env,
        config,
        services.marketplace.as_mut(),
        services.ad_host.as_mut(),
        project_root,
    )
}

fn db_command(
    session: &mut Session,
    term: &mut dyn Terminal,
    action: DbCommand,
) -> ConsoleResult<Report> {
    let applied = match action {
        DbCommand::GetConfig => return Ok(database_setting(&session.config)),
        DbCommand::UseLocalFile { filename } => {
            use_local_file(&mut session.config, term, filename.as_deref())?
        }
        DbCommand::AwsListRegions => return provisioning(session)?.list_regions(),
        DbCommand::AwsGetRegion => return Ok(provisioning(session)?.get_region()),
        DbCommand::AwsListInstances => return provisioning(session)?.list_instances(),
        DbCommand::AwsDeleteInstance { instance_id } => {
            return provisioning(session)?.delete_instance(term, instance_id.as_deref())
        }
        DbCommand::AwsCreateInstance {
            instance_id,
            size,
            username,
            password,
            dbname,
        } => {
            let fields = InstanceFields {
                id: instance_id,
                size,
                username,
                password,
                dbname,
            };
            return provisioning(session)?.create_instance(term, &fields);
        }
        DbCommand::AwsSetRegion { region } => {
            provisioning(session)?.set_region(term, region.as_deref())?
        }
        DbCommand::UseAwsInstance {
            instance_id,
            password,
            dbname,
        } => {
            let fields = SelectFields {
                id: instance_id,
                password,
                dbname,
            };
            provisioning(session)?.select_instance(term, &fields)?
        }
    };
    apply(session, applied)
}

fn provisioning(session: &mut Session) -> ConsoleResult<ProvisioningWorkflow<'_>> {
    let Session { config, caps, .. } = session;
    let services = caps.network("db aws")?;
    Ok(ProvisioningWorkflow::new(
        config,
        services.provisioner.as_mut(),
        services.ad_host.as_ref(),
    ))
}

/// Print a settings change, relaunching the server when it asks for one.
fn apply(session: &mut Session, applied: Applied) -> ConsoleResult<Report> {
    let Applied {
        mut report,
        relaunch,
    } = applied;
    if let Some(restart) = session.server.apply(relaunch)? {
        report.extend(restart);
    }
    Ok(report)
}
