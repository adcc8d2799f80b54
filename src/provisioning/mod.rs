//! Remote database instance lifecycle and the session's database setting.
//!
//! Every flow resolves all of its fields before the first remote call that
//! changes anything, so a rejected or abandoned field leaves both the
//! provider and the session config untouched.
pub mod rules;

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, ConsoleResult};
use crate::prompt::{confirm, Terminal, ValidationLoop};
use crate::report::Report;
use crate::services::{AdHost, Credentials, Endpoint, Instance, InstanceOptions, Provisioner};
use rules::{
    validate_dbname, validate_instance_id, validate_password, validate_size, validate_username,
    RULES_TEXT, SYSTEM_SCHEMAS,
};

pub const DEFAULT_LOCAL_DB_FILE: &str = "participants.db";

/// When a changed setting needs the experiment server restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaunch {
    Never,
    IfRunning,
    /// Also restart a server caught mid start/stop.
    IfRunningOrTransitioning,
}

/// Result of a flow that changed session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub report: Report,
    pub relaunch: Relaunch,
}

impl Applied {
    fn unchanged(report: Report) -> Self {
        Self {
            report,
            relaunch: Relaunch::Never,
        }
    }
}

/// Operator-supplied fields of an instance create; `None` means prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFields {
    pub id: Option<String>,
    pub size: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
}

/// Operator-supplied answers for switching to a remote instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectFields {
    pub id: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
}

/// Host and port of an instance that is ready to accept connections.
fn ready_endpoint(instance: &Instance) -> ConsoleResult<&Endpoint> {
    instance.endpoint.as_ref().ok_or_else(|| {
        ConsoleError::Refused(format!(
            "instance {} has no endpoint yet; only available instances can be used",
            instance.id
        ))
    })
}

/// Connection string for `dbname` on `instance`, credentials percent-encoded.
pub fn mysql_url(instance: &Instance, password: &str, dbname: &str) -> ConsoleResult<String> {
    let endpoint = ready_endpoint(instance)?;
    Ok(format!(
        "mysql://{}:{}@{}:{}/{}",
        encode_userinfo(&instance.master_username),
        encode_userinfo(password),
        endpoint.host,
        endpoint.port,
        dbname
    ))
}

/// Keep RFC 3986 unreserved bytes; everything else becomes `%XX`.
fn encode_userinfo(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Validator for an instance id that must also exist in `known`.
///
/// Format problems and absence get distinct reasons.
fn existing_instance(known: &[String]) -> impl Fn(&str) -> Result<String, String> + '_ {
    move |raw: &str| {
        let id = validate_instance_id(raw)
            .map_err(|reason| format!("{reason} Instance name not valid; check for typos."))?;
        if known.iter().any(|candidate| candidate == &id) {
            Ok(id)
        } else {
            Err(format!(
                "instance {id} not present in this account; run `db aws_list_instances` to see valid ids."
            ))
        }
    }
}

pub struct ProvisioningWorkflow<'a> {
    config: &'a mut ConsoleConfig,
    provisioner: &'a mut dyn Provisioner,
    ad_host: &'a dyn AdHost,
    prompts: ValidationLoop,
}

impl<'a> ProvisioningWorkflow<'a> {
    pub fn new(
        config: &'a mut ConsoleConfig,
        provisioner: &'a mut dyn Provisioner,
        ad_host: &'a dyn AdHost,
    ) -> Self {
        let prompts = ValidationLoop::new(config.console.max_prompt_attempts);
        Self {
            config,
            provisioner,
            ad_host,
            prompts,
        }
    }

    pub fn list_regions(&self) -> ConsoleResult<Report> {
        let regions = self
            .provisioner
            .list_regions()
            .map_err(|err| ConsoleError::remote("list regions", err))?;
        Ok(region_listing(&regions, &self.provisioner.region()))
    }

    pub fn get_region(&self) -> Report {
        Report::line(self.provisioner.region())
    }

    /// Select the provider region from the provider's allow-list.
    pub fn set_region(
        &mut self,
        term: &mut dyn Terminal,
        region: Option<&str>,
    ) -> ConsoleResult<Applied> {
        let allowed = self
            .provisioner
            .list_regions()
            .map_err(|err| ConsoleError::remote("list regions", err))?;
        if region.is_none() {
            term.say(&region_listing(&allowed, &self.provisioner.region()).to_string());
        }
        let region = self
            .prompts
            .resolve(
                term,
                region,
                "Enter the name of the region you would like to use: ",
                |raw| {
                    let raw = raw.trim();
                    if allowed.iter().any(|name| name == raw) {
                        Ok(raw.to_string())
                    } else {
                        Err(format!(
                            "the region name ({raw}) is not allowed; choose from `db aws_list_regions`."
                        ))
                    }
                },
            )
            .map_err(|err| match err {
                ConsoleError::Aborted { .. } => {
                    ConsoleError::aborted("region you are requesting is not available.")
                }
                other => other,
            })?;
        self.provisioner.set_region(&region);
        self.config.aws.region = region.clone();
        tracing::info!(%region, "region updated");
        Ok(Applied {
            report: Report::line(format!("Region updated to {region}")),
            relaunch: Relaunch::IfRunning,
        })
    }

    pub fn list_instances(&self) -> ConsoleResult<Report> {
        let instances = self
            .provisioner
            .list_instances()
            .map_err(|err| ConsoleError::remote("list instances", err))?;
        let region = self.provisioner.region();
        if instances.is_empty() {
            return Ok(Report::line(format!(
                "There are no DB instances associated with your account in region {region}"
            )));
        }
        let mut report = Report::line(format!(
            "Here are the current DB instances associated with your account in region {region}"
        ));
        for instance in instances {
            report.info(format!("\t{}", "-".repeat(20)));
            report.info(format!("\tInstance ID: {}", instance.id));
            report.info(format!("\tStatus: {}", instance.status));
        }
        Ok(report)
    }

    /// Request a new instance. The provider builds it in the background;
    /// the operator polls `db aws_list_instances` for progress.
    pub fn create_instance(
        &mut self,
        term: &mut dyn Terminal,
        fields: &InstanceFields,
    ) -> ConsoleResult<Report> {
        if fields.id.is_none() {
            term.say(RULES_TEXT);
        }
        let prompts = self.prompts;
        let id = prompts.resolve(
            term,
            fields.id.as_deref(),
            "enter an identifier for the instance (see rules above): ",
            validate_instance_id,
        )?;
        let size_gb = prompts.resolve(
            term,
            fields.size.as_deref(),
            "size of db in GB (5-1024): ",
            validate_size,
        )?;
        let username = prompts.resolve(
            term,
            fields.username.as_deref(),
            "master username (see rules above): ",
            validate_username,
        )?;
        let password = prompts.resolve(
            term,
            fields.password.as_deref(),
            "master password (see rules above): ",
            validate_password,
        )?;
        let dbname = prompts.resolve(
            term,
            fields.dbname.as_deref(),
            "name for first database on this instance (see rules): ",
            validate_dbname,
        )?;

        let options = InstanceOptions {
            id,
            size_gb,
            username,
            password,
            dbname,
        };
        let instance = self
            .provisioner
            .create_instance(&options)
            .map_err(|err| ConsoleError::remote("Sorry there was an error creating db instance", err))?;
        tracing::info!(instance_id = %instance.id, size_gb, "instance create requested");

        let mut report = Report::line("*****************************");
        report.info("  Creating MySQL instance");
        report.info(format!("    id: {}", options.id));
        report.info(format!("    size: {} GB", options.size_gb));
        report.info(format!("    username: {}", options.username));
        report.info(format!("    dbname: {}", options.dbname));
        report.info("  Creation takes several minutes; run `db aws_list_instances` for status.");
        Ok(report)
    }

    /// Point the session's database setting at an existing instance.
    pub fn select_instance(
        &mut self,
        term: &mut dyn Terminal,
        fields: &SelectFields,
    ) -> ConsoleResult<Applied> {
        let instances = self
            .provisioner
            .list_instances()
            .map_err(|err| ConsoleError::remote("list instances", err))?;
        if instances.is_empty() {
            return Err(ConsoleError::Refused(
                "There are no instances in this region/account. Use `db aws_create_instance` to make one first."
                    .to_string(),
            ));
        }
        if fields.id.is_none() {
            term.say(&instance_menu(
                "Here are the available instances you have. You can only use those listed as 'available':",
                &instances,
            ));
        }
        let known: Vec<String> = instances.iter().map(|instance| instance.id.clone()).collect();
        let id = self.prompts.resolve(
            term,
            fields.id.as_deref(),
            "Enter the instance identity you would like to use: ",
            existing_instance(&known),
        )?;

        if !confirm(
            term,
            "Switching your DB settings to use this instance. Are you sure you want to do this? ",
        )? {
            return Ok(Applied::unchanged(Report::line("No changes made.")));
        }
        let password = self.prompts.resolve(
            term,
            fields.password.as_deref(),
            "enter the master password for this instance: ",
            validate_password,
        )?;

        let instance = self.provisioner.instance_detail(&id).map_err(|err| {
            ConsoleError::remote(
                format!("error selecting database instance {id} (only `available` instances can be used)"),
                err,
            )
        })?;
        ready_endpoint(&instance)?;
        let address = self
            .ad_host
            .public_address()
            .map_err(|err| ConsoleError::remote("look up public address", err))?;
        self.provisioner
            .authorize_address(&instance, &address)
            .map_err(|err| {
                ConsoleError::remote(
                    format!("error authorizing your ip address to connect to server ({address})"),
                    err,
                )
            })?;
        tracing::info!(instance_id = %id, %address, "address authorized");
        term.say(&format!("Database instance {id} selected."));

        let credentials = Credentials {
            username: instance.master_username.clone(),
            password: password.clone(),
        };
        let existing: Vec<String> = self
            .provisioner
            .list_databases(&instance, &credentials)
            .map_err(|err| {
                ConsoleError::remote("error connecting to instance; your password may be incorrect", err)
            })?
            .into_iter()
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .collect();

        let question = if existing.is_empty() {
            "No existing DBs in this instance. Enter a new name to create one: "
        } else {
            if fields.dbname.is_none() {
                let mut listing = String::from("Here are the available databases");
                for name in &existing {
                    listing.push_str("\n\t");
                    listing.push_str(name);
                }
                term.say(&listing);
            }
            "Enter the name of the database you want to use or a new name to create a new one: "
        };
        let dbname = self
            .prompts
            .resolve(term, fields.dbname.as_deref(), question, validate_dbname)?;

        if !existing.contains(&dbname) {
            self.provisioner
                .create_database(&instance, &credentials, &dbname)
                .map_err(|err| {
                    ConsoleError::remote(
                        format!("error creating database {dbname} on instance {id}"),
                        err,
                    )
                })?;
            tracing::info!(instance_id = %id, %dbname, "database created");
        }

        let url = mysql_url(&instance, &password, &dbname)?;
        self.config.database.database_url = url.clone();
        Ok(Applied {
            report: Report::line(format!(
                "Successfully set your current database (database_url) to\n\t{url}"
            )),
            relaunch: Relaunch::IfRunningOrTransitioning,
        })
    }

    /// Delete an instance after the operator confirms.
    pub fn delete_instance(
        &mut self,
        term: &mut dyn Terminal,
        id: Option<&str>,
    ) -> ConsoleResult<Report> {
        let instances = self
            .provisioner
            .list_instances()
            .map_err(|err| ConsoleError::remote("list instances", err))?;
        if instances.is_empty() {
            return Err(ConsoleError::Refused(
                "There are no instances you can delete currently. Use `db aws_create_instance` to make one."
                    .to_string(),
            ));
        }
        if id.is_none() {
            term.say(&instance_menu(
                "Here are the available instances you can delete:",
                &instances,
            ));
        }
        let known: Vec<String> = instances.iter().map(|instance| instance.id.clone()).collect();
        let id = self.prompts.resolve(
            term,
            id,
            "Enter the instance identity you would like to delete: ",
            existing_instance(&known),
        )?;
        if !confirm(
            term,
            "Deleting an instance will erase all your data associated with the database in that instance. Really delete? y or n: ",
        )? {
            return Ok(Report::line("No changes made."));
        }
        self.provisioner.delete_instance(&id).map_err(|err| {
            ConsoleError::remote(
                format!(
                    "error deleting database instance {id}; it may still be creating, deleting, or backing up (run `db aws_list_instances` for current status)"
                ),
                err,
            )
        })?;
        tracing::info!(instance_id = %id, "instance deleted");
        Ok(Report::line(format!(
            "Database instance {id} deleted. Run `db aws_list_instances` for current status."
        )))
    }
}

/// Current database setting. Needs no remote services.
pub fn database_setting(config: &ConsoleConfig) -> Report {
    Report::line(format!(
        "Current database setting (database_url):\n\t{}",
        config.database.database_url
    ))
}

/// Point the session at a local SQLite file. No remote services involved.
pub fn use_local_file(
    config: &mut ConsoleConfig,
    term: &mut dyn Terminal,
    filename: Option<&str>,
) -> ConsoleResult<Applied> {
    let filename = match filename {
        Some(name) => name.trim().to_string(),
        None => term
            .read_line(&format!(
                "Enter the filename of the local SQLite database you would like to use [default={DEFAULT_LOCAL_DB_FILE}]: "
            ))?
            .map(|answer| answer.trim().to_string())
            .filter(|answer| !answer.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCAL_DB_FILE.to_string()),
    };
    config.database.database_url = format!("sqlite:///{filename}");
    Ok(Applied {
        report: Report::line(format!(
            "Updated database setting (database_url):\n\t{}",
            config.database.database_url
        )),
        relaunch: Relaunch::IfRunning,
    })
}

fn region_listing(regions: &[String], current: &str) -> Report {
    let mut report = Report::new();
    if regions.is_empty() {
        report.notice("no regions available");
        return report;
    }
    report.info("Available regions:");
    for region in regions {
        if region == current {
            report.info(format!("\t{region} (currently selected)"));
        } else {
            report.info(format!("\t{region}"));
        }
    }
    report
}

fn instance_menu(heading: &str, instances: &[Instance]) -> String {
    let mut text = String::from(heading);
    for instance in instances {
        text.push_str(&format!("\n\t {} ({})", instance.id, instance.status));
    }
    text
}

#[cfg(test)]
#[path = "provisioning_tests.rs"]
mod tests;
