//! Worker bonus payments and the local paid flag that keeps them idempotent.
//!
//! Assignments resolved from a HIT are the safe default: only Approved work
//! is eligible and anything already flagged `BonusPaid` is skipped. Naming
//! assignments explicitly is the expert override and pays again.
//!
//! The flag is written right after the marketplace accepts a payment. A crash
//! between the two leaves a paid assignment unflagged; there is no recovery
//! protocol for that window.
use crate::error::{ConsoleError, ConsoleResult};
use crate::prompt::{Terminal, ValidationLoop};
use crate::report::Report;
use crate::services::{AssignmentStatus, Marketplace, ParticipantStore, PaymentState};
use crate::util::format_dollars;
use anyhow::Context;

/// Which amount each assignment receives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BonusAmount {
    /// The bonus the experiment stored on the participant record.
    Auto,
    Fixed(f64),
}

/// Which assignments a bonus batch targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BonusTarget {
    Hit(String),
    Assignments(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BonusRequest {
    pub target: BonusTarget,
    pub amount: BonusAmount,
    pub reason: Option<String>,
}

pub fn parse_reason(raw: &str) -> Result<String, String> {
    let reason = raw.trim();
    if reason.is_empty() {
        return Err("a reason is required; workers will see it.".to_string());
    }
    Ok(reason.to_string())
}

enum Outcome {
    Paid(f64),
    AlreadyPaid,
    Unpayable(f64),
}

pub struct PaymentLedger<'a> {
    marketplace: &'a mut dyn Marketplace,
    participants: &'a mut dyn ParticipantStore,
    prompts: ValidationLoop,
}

impl<'a> PaymentLedger<'a> {
    pub fn new(
        marketplace: &'a mut dyn Marketplace,
        participants: &'a mut dyn ParticipantStore,
        prompts: ValidationLoop,
    ) -> Self {
        Self {
            marketplace,
            participants,
            prompts,
        }
    }

    /// Pay a bonus to every resolved assignment.
    ///
    /// Per-assignment problems land in the report as failures or notices and
    /// never stop the batch. Only a missing reason or a failed assignment
    /// lookup aborts the whole command.
    pub fn bonus(&mut self, term: &mut dyn Terminal, request: &BonusRequest) -> ConsoleResult<Report> {
        let reason = self.prompts.resolve(
            term,
            request.reason.as_deref(),
            "Type the reason for the bonus. Workers will see this message: ",
            parse_reason,
        )?;

        let mut report = Report::new();
        let (assignment_ids, by_hit) = match &request.target {
            BonusTarget::Hit(hit_id) => {
                let approved = self
                    .marketplace
                    .list_assignments(Some(AssignmentStatus::Approved))
                    .map_err(|err| {
                        ConsoleError::remote(format!("no approved workers for HIT {hit_id}"), err)
                    })?;
                let ids: Vec<String> = approved
                    .into_iter()
                    .filter(|assignment| &assignment.hit_id == hit_id)
                    .map(|assignment| assignment.assignment_id)
                    .collect();
                if ids.is_empty() {
                    report.notice(format!("no approved workers for HIT {hit_id}"));
                    return Ok(report);
                }
                report.info(format!("bonusing workers for HIT {hit_id}"));
                (ids, true)
            }
            BonusTarget::Assignments(ids) if ids.is_empty() => {
                return Err(ConsoleError::Invalid(
                    "name a HIT with --hit or at least one assignment id".to_string(),
                ));
            }
            BonusTarget::Assignments(ids) => (ids.clone(), false),
        };

        for assignment_id in &assignment_ids {
            match self.pay_one(assignment_id, request.amount, &reason, by_hit) {
                Ok(Outcome::Paid(amount)) => report.info(format!(
                    "gave bonus of {} to {assignment_id}",
                    format_dollars(amount)
                )),
                Ok(Outcome::AlreadyPaid) => {
                    report.notice(format!("bonus already awarded to {assignment_id}"))
                }
                Ok(Outcome::Unpayable(amount)) => report.failure(format!(
                    "bonus amount {} is not a positive dollar amount, no bonus given to {assignment_id}",
                    format_dollars(amount)
                )),
                Err(err) => {
                    tracing::warn!(%assignment_id, error = %format!("{err:#}"), "bonus failed");
                    report.failure(format!("failed to bonus {assignment_id}: {err:#}"));
                }
            }
        }
        Ok(report)
    }

    fn pay_one(
        &mut self,
        assignment_id: &str,
        amount: BonusAmount,
        reason: &str,
        suppress_repeat: bool,
    ) -> anyhow::Result<Outcome> {
        let participant = self.participants.find_by_assignment(assignment_id)?;
        let amount = match amount {
            BonusAmount::Auto => participant.bonus,
            BonusAmount::Fixed(amount) => amount,
        };
        if !amount.is_finite() || amount <= 0.0 {
            return Ok(Outcome::Unpayable(amount));
        }
        if suppress_repeat && participant.payment == PaymentState::BonusPaid {
            tracing::info!(%assignment_id, "bonus already paid; skipping");
            return Ok(Outcome::AlreadyPaid);
        }
        self.marketplace
            .grant_bonus(assignment_id, amount, reason)
            .with_context(|| format!("pay bonus for {assignment_id}"))?;
        tracing::info!(%assignment_id, amount, "bonus paid");
        self.participants
            .set_payment_state(assignment_id, PaymentState::BonusPaid)
            .with_context(|| format!("bonus sent but paid flag not recorded for {assignment_id}"))?;
        Ok(Outcome::Paid(amount))
    }
}
