//! HIT lifecycle transactions: create, extend, expire, dispose, and the
//! worker review commands that operate on a HIT's assignments.
//!
//! HIT creation is a forward-only sequence:
//!
//! ```text
//! validating -> ad registration -> hit creation -> ad binding -> succeeded
//! ```
//!
//! Any stage failing halts the sequence and the whole transaction is reported
//! as failed. Nothing is rolled back: an ad registered before a later stage
//! fails stays registered, and the operator is told which ids exist.
use crate::config::{reward_pattern, ConsoleConfig};
use crate::environment::{EnvironmentState, Mode};
use crate::error::{ConsoleError, ConsoleResult, CreateStage};
use crate::prompt::{Terminal, ValidationLoop};
use crate::report::Report;
use crate::services::{
    AdHost, AdRequest, AssignmentStatus, HitFilter, HitRequest, HitStatus, Marketplace,
};
use crate::util::{debug_query, display_path, format_dollars};
use std::fmt;
use std::fs;
use std::path::Path;

/// Ad template location, relative to the project root.
pub const AD_TEMPLATE_REL: &str = "templates/ad.html";
/// Largest template the ad-hosting service accepts.
pub const MAX_AD_TEMPLATE_BYTES: u64 = 1_048_576;
/// Marketplace commission on top of the rewards paid out.
pub const FEE_RATE: f64 = 0.10;

pub fn parse_worker_count(raw: &str) -> Result<u32, String> {
    match raw.trim().parse::<i64>() {
        Ok(count) if count <= 0 => Err("number of participants must be greater than 0.".to_string()),
        Ok(count) => u32::try_from(count)
            .map_err(|_| "number of participants is too large.".to_string()),
        Err(_) => Err("number of participants must be a whole number.".to_string()),
    }
}

pub fn parse_reward(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if reward_pattern().is_match(raw) {
        Ok(raw.to_string())
    } else {
        Err("reward must have format [dollars].[cents].".to_string())
    }
}

pub fn parse_duration_hours(raw: &str) -> Result<u32, String> {
    match raw.trim().parse::<i64>() {
        Ok(hours) if hours <= 0 => Err("duration must be greater than 0.".to_string()),
        Ok(hours) => u32::try_from(hours).map_err(|_| "duration is too large.".to_string()),
        Err(_) => Err("duration must be a whole number.".to_string()),
    }
}

/// Fee and total cost for paying `workers` the base `reward` (dollars).
pub fn cost_breakdown(workers: u32, reward: &str) -> (f64, f64) {
    let reward: f64 = reward.parse().unwrap_or(0.0);
    let payout = f64::from(workers) * reward;
    let fee = payout * FEE_RATE;
    (fee, payout + fee)
}

/// Summary of a fully successful HIT creation.
#[derive(Debug, Clone, PartialEq)]
pub struct HitCreated {
    pub mode: Mode,
    pub hit_id: String,
    pub ad_id: String,
    pub ad_url: String,
    pub max_workers: u32,
    pub reward: String,
    pub duration_hours: u32,
    pub fee: f64,
    pub total: f64,
}

impl fmt::Display for HitCreated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*****************************")?;
        writeln!(f, "  Creating {} HIT", self.mode)?;
        writeln!(f, "    HITid: {}", self.hit_id)?;
        writeln!(f, "    Max workers: {}", self.max_workers)?;
        writeln!(f, "    Reward: ${}", self.reward)?;
        writeln!(f, "    Duration: {} hours", self.duration_hours)?;
        writeln!(f, "    Fee: {}", format_dollars(self.fee))?;
        writeln!(f, "    ________________________")?;
        writeln!(f, "    Total: {}", format_dollars(self.total))?;
        write!(
            f,
            "  Ad for this HIT now hosted at: {}?{}",
            self.ad_url,
            debug_query(false)
        )
    }
}

pub struct CampaignWorkflow<'a> {
    env: &'a mut EnvironmentState,
    config: &'a mut ConsoleConfig,
    marketplace: &'a mut dyn Marketplace,
    ad_host: &'a mut dyn AdHost,
    project_root: &'a Path,
    prompts: ValidationLoop,
}

impl<'a> CampaignWorkflow<'a> {
    pub fn new(
        env: &'a mut EnvironmentState,
        config: &'a mut ConsoleConfig,
        marketplace: &'a mut dyn Marketplace,
        ad_host: &'a mut dyn AdHost,
        project_root: &'a Path,
    ) -> Self {
        let prompts = ValidationLoop::new(config.console.max_prompt_attempts);
        Self {
            env,
            config,
            marketplace,
            ad_host,
            project_root,
            prompts,
        }
    }

    /// Register an ad, create the HIT that points at it, then bind the two.
    pub fn create_hit(
        &mut self,
        term: &mut dyn Terminal,
        workers: Option<&str>,
        reward: Option<&str>,
        duration: Option<&str>,
    ) -> ConsoleResult<HitCreated> {
        let mode = self.env.mode();
        tracing::debug!(stage = %CreateStage::Validating, %mode, "hit create");
        let workers = self.prompts.resolve(
            term,
            workers,
            "number of participants? ",
            parse_worker_count,
        )?;
        let reward = self
            .prompts
            .resolve(term, reward, "reward per HIT? ", parse_reward)?;
        let duration_hours = self.prompts.resolve(
            term,
            duration,
            "duration of hit (in hours)? ",
            parse_duration_hours,
        )?;

        self.config.hit.max_assignments = workers;
        self.config.hit.reward = reward.clone();
        self.config.hit.duration_hours = duration_hours;

        let ad_html = self.load_ad_template()?;

        tracing::debug!(stage = %CreateStage::AdRegistering, "hit create");
        let server = self
            .ad_host
            .public_address()
            .map_err(|err| transaction(CreateStage::AdRegistering, format!("{err:#}")))?;
        let ad_request = AdRequest {
            server,
            port: self.config.server.port,
            support_ie: self.config.task.support_ie,
            is_sandbox: mode.is_sandbox(),
            ad_html,
            contact_email: self.config.ad_server.contact_email.clone(),
        };
        let ad_id = self
            .ad_host
            .register_ad(&ad_request)
            .map_err(|err| transaction(CreateStage::AdRegistering, format!("{err:#}")))?;
        let ad_url = self.ad_host.ad_url(&ad_id);
        tracing::info!(%ad_id, %mode, "ad registered");

        tracing::debug!(stage = %CreateStage::HitCreating, "hit create");
        let hit_config = &self.config.hit;
        let request = HitRequest {
            ad_location: ad_url.clone(),
            approve_requirement: hit_config.approve_requirement,
            us_only: hit_config.us_only,
            lifetime_hours: hit_config.lifetime_hours,
            max_assignments: hit_config.max_assignments,
            title: hit_config.title.clone(),
            description: hit_config.description.clone(),
            keywords: hit_config.keywords.clone(),
            reward: hit_config.reward.clone(),
            duration_hours: hit_config.duration_hours,
        };
        let hit_id = self.marketplace.create_hit(&request).map_err(|err| {
            transaction(
                CreateStage::HitCreating,
                format!("{err:#}; ad {ad_id} remains registered"),
            )
        })?;
        tracing::info!(%hit_id, %ad_id, %mode, "hit created");

        tracing::debug!(stage = %CreateStage::Binding, "hit create");
        self.ad_host.bind_hit(&ad_id, &hit_id).map_err(|err| {
            transaction(
                CreateStage::Binding,
                format!("{err:#}; hit {hit_id} and ad {ad_id} exist but are not linked"),
            )
        })?;

        self.env.record_created();
        let (fee, total) = cost_breakdown(workers, &reward);
        Ok(HitCreated {
            mode,
            hit_id,
            ad_id,
            ad_url,
            max_workers: workers,
            reward,
            duration_hours,
            fee,
            total,
        })
    }

    fn load_ad_template(&self) -> ConsoleResult<String> {
        let path = self.project_root.join(AD_TEMPLATE_REL);
        let shown = display_path(&path, Some(self.project_root));
        let Ok(metadata) = fs::metadata(&path) else {
            return Err(ConsoleError::Invalid(format!(
                "error registering ad: {shown} is required so the ad can be served"
            )));
        };
        if metadata.len() > MAX_AD_TEMPLATE_BYTES {
            return Err(ConsoleError::Invalid(format!(
                "error registering ad: {shown} is {} bytes, but the maximum template size uploadable to the ad server is {MAX_AD_TEMPLATE_BYTES} bytes",
                metadata.len()
            )));
        }
        fs::read_to_string(&path).map_err(|err| {
            ConsoleError::Invalid(format!("error registering ad: read {shown}: {err}"))
        })
    }

    /// Add assignments and/or minutes to an existing HIT.
    pub fn extend_hit(
        &mut self,
        hit_id: &str,
        assignments: Option<u32>,
        minutes: Option<u32>,
    ) -> ConsoleResult<Report> {
        if assignments.is_none() && minutes.is_none() {
            return Err(ConsoleError::Invalid(
                "nothing to extend; pass --assignments and/or --expiration".to_string(),
            ));
        }
        self.marketplace
            .extend_hit(hit_id, assignments, minutes)
            .map_err(|err| ConsoleError::remote(format!("extend hit {hit_id}"), err))?;
        tracing::info!(%hit_id, ?assignments, ?minutes, "hit extended");
        Ok(Report::line("HIT extended."))
    }

    /// Expire HITs early. `all` replaces any explicit ids with every
    /// active HIT in the current mode.
    pub fn expire_hits(&mut self, all: bool, hit_ids: &[String]) -> ConsoleResult<Report> {
        let mode = self.env.mode();
        let targets = if all {
            self.hit_ids_matching(HitFilter::Active)?
        } else {
            require_ids(hit_ids, "--all")?
        };
        let mut report = Report::new();
        for hit_id in targets {
            match self.marketplace.expire_hit(&hit_id) {
                Ok(()) => {
                    self.env.record_expired();
                    tracing::info!(%hit_id, %mode, "hit expired");
                    report.info(format!("expiring {mode} HIT {hit_id}"));
                }
                Err(err) => report.failure(format!("failed to expire HIT {hit_id}: {err:#}")),
            }
        }
        if report.lines().is_empty() {
            report.info(format!("no active {mode} HITs to expire"));
        }
        Ok(report)
    }

    /// Dispose of reviewable HITs and delete their ads.
    ///
    /// A HIT whose live status is anything but Reviewable is refused and
    /// halts the batch; earlier disposals stand.
    pub fn dispose_hits(&mut self, all: bool, hit_ids: &[String]) -> ConsoleResult<Report> {
        let mode = self.env.mode();
        let targets = if all {
            self.hit_ids_matching(HitFilter::Reviewable)?
        } else {
            require_ids(hit_ids, "--all")?
        };
        let mut report = Report::new();
        for hit_id in targets {
            let status = match self.marketplace.hit_status(&hit_id) {
                Ok(status) => status,
                Err(err) => {
                    report.failure(format!("error getting status of HIT {hit_id}: {err:#}"));
                    break;
                }
            };
            if status != HitStatus::Reviewable {
                tracing::warn!(%hit_id, %status, "dispose refused");
                report.failure(format!(
                    "HIT {hit_id} is {status}, not 'Reviewable', and so can not be disposed of"
                ));
                break;
            }
            if let Err(err) = self.marketplace.dispose_hit(&hit_id) {
                report.failure(format!("failed to dispose of HIT {hit_id}: {err:#}"));
                break;
            }
            tracing::info!(%hit_id, %mode, "hit disposed");
            report.info(format!("deleting {mode} HIT {hit_id}"));
            if let Err(err) = self.ad_host.delete_ad(&hit_id) {
                report.failure(format!("HIT {hit_id} disposed but its ad was not deleted: {err:#}"));
            }
        }
        if report.lines().is_empty() {
            report.info(format!("no reviewable {mode} HITs to dispose of"));
        }
        Ok(report)
    }

    fn hit_ids_matching(&self, filter: HitFilter) -> ConsoleResult<Vec<String>> {
        let hits = self
            .marketplace
            .list_hits(filter)
            .map_err(|err| ConsoleError::remote(format!("list {} hits", filter.as_str()), err))?;
        Ok(hits.into_iter().map(|hit| hit.hit_id).collect())
    }

    pub fn list_hits(&self, filter: HitFilter) -> ConsoleResult<Report> {
        let hits = self
            .marketplace
            .list_hits(filter)
            .map_err(|err| ConsoleError::remote("no hits retrieved", err))?;
        if hits.is_empty() {
            return Ok(Report::line("no hits retrieved"));
        }
        let mut report = Report::new();
        for hit in hits {
            report.info(hit.to_string());
        }
        Ok(report)
    }

    pub fn list_workers(
        &self,
        status: Option<AssignmentStatus>,
        hit_id: Option<&str>,
    ) -> ConsoleResult<Report> {
        let mut workers = self
            .marketplace
            .list_assignments(status)
            .map_err(|err| ConsoleError::remote("failed to get workers", err))?;
        let mut report = Report::new();
        if let Some(hit_id) = hit_id {
            workers.retain(|worker| worker.hit_id == hit_id);
            report.info(format!("listing workers for HIT {hit_id}"));
        }
        if workers.is_empty() {
            report.notice("no workers match your request");
            return Ok(report);
        }
        let text = serde_json::to_string_pretty(&workers)
            .map_err(|err| ConsoleError::Other(err.into()))?;
        report.info(text);
        Ok(report)
    }

    pub fn approve_workers(&mut self, hit_id: Option<&str>, ids: &[String]) -> ConsoleResult<Report> {
        self.review_workers(Review::Approve, hit_id, ids)
    }

    pub fn reject_workers(&mut self, hit_id: Option<&str>, ids: &[String]) -> ConsoleResult<Report> {
        self.review_workers(Review::Reject, hit_id, ids)
    }

    fn review_workers(
        &mut self,
        review: Review,
        hit_id: Option<&str>,
        ids: &[String],
    ) -> ConsoleResult<Report> {
        let mut report = Report::new();
        let targets = match hit_id {
            Some(hit_id) => {
                let submitted = self
                    .marketplace
                    .list_assignments(Some(AssignmentStatus::Submitted))
                    .map_err(|err| ConsoleError::remote("failed to get workers", err))?;
                report.info(format!("{} workers for HIT {hit_id}", review.verb_ing()));
                submitted
                    .into_iter()
                    .filter(|assignment| assignment.hit_id == hit_id)
                    .map(|assignment| assignment.assignment_id)
                    .collect()
            }
            None => require_ids(ids, "--hit")?,
        };
        for assignment_id in targets {
            let result = match review {
                Review::Approve => self.marketplace.approve_assignment(&assignment_id),
                Review::Reject => self.marketplace.reject_assignment(&assignment_id),
            };
            match result {
                Ok(()) => {
                    tracing::info!(%assignment_id, review = review.verb_ed(), "assignment reviewed");
                    report.info(format!("{} {assignment_id}", review.verb_ed()));
                }
                Err(err) => report.failure(format!(
                    "failed to {} {assignment_id}: {err:#}",
                    review.verb()
                )),
            }
        }
        Ok(report)
    }

    pub fn account_balance(&self) -> ConsoleResult<Report> {
        let balance = self
            .marketplace
            .account_balance()
            .map_err(|err| ConsoleError::remote("check account balance", err))?;
        Ok(Report::line(balance))
    }
}

#[derive(Debug, Clone, Copy)]
enum Review {
    Approve,
    Reject,
}

impl Review {
    fn verb(&self) -> &'static str {
        match self {
            Review::Approve => "approve",
            Review::Reject => "reject",
        }
    }

    fn verb_ed(&self) -> &'static str {
        match self {
            Review::Approve => "approved",
            Review::Reject => "rejected",
        }
    }

    fn verb_ing(&self) -> &'static str {
        match self {
            Review::Approve => "approving",
            Review::Reject => "rejecting",
        }
    }
}

fn transaction(stage: CreateStage, detail: String) -> ConsoleError {
    tracing::warn!(%stage, %detail, "hit create failed");
    ConsoleError::Transaction { stage, detail }
}

fn require_ids(ids: &[String], alternative: &str) -> ConsoleResult<Vec<String>> {
    if ids.is_empty() {
        return Err(ConsoleError::Invalid(format!(
            "name at least one id or pass {alternative}"
        )));
    }
    Ok(ids.to_vec())
}

#[cfg(test)]
#[path = "campaign_tests.rs"]
mod tests;
