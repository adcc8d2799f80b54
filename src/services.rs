//! Collaborator contracts consumed by the console workflows.
//!
//! The console never talks to a marketplace, ad server, cloud provider or
//! process directly; it goes through these traits. Concrete adapters live in
//! the submodules.
use crate::environment::Mode;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ad_host;
pub mod http;
pub mod marketplace;
pub mod participants;
pub mod process;
pub mod provisioner;

pub use ad_host::HttpAdHost;
pub use marketplace::HttpMarketplace;
pub use participants::JsonParticipantStore;
pub use process::LocalProcessController;
pub use provisioner::HttpProvisioner;

/// Remote HIT status as relayed by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum HitStatus {
    Active,
    Reviewable,
    Disposed,
    Expired,
}

impl HitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitStatus::Active => "Active",
            HitStatus::Reviewable => "Reviewable",
            HitStatus::Disposed => "Disposed",
            HitStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for HitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which HITs a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HitFilter {
    All,
    Active,
    Reviewable,
}

impl HitFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitFilter::All => "all",
            HitFilter::Active => "active",
            HitFilter::Reviewable => "reviewable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Hit {
    pub hit_id: String,
    pub status: HitStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub max_assignments: u32,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub pending_assignments: u32,
    #[serde(default)]
    pub completed_assignments: u32,
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} | ${} | {}/{} completed, {} pending",
            self.hit_id,
            self.status,
            self.title,
            self.reward,
            self.completed_assignments,
            self.max_assignments,
            self.pending_assignments
        )
    }
}

/// Task configuration submitted once the ad is registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitRequest {
    pub ad_location: String,
    pub approve_requirement: u32,
    pub us_only: bool,
    pub lifetime_hours: f64,
    pub max_assignments: u32,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub reward: String,
    pub duration_hours: u32,
}

/// Marketplace review state of one worker submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum AssignmentStatus {
    Submitted,
    Approved,
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Submitted => "Submitted",
            AssignmentStatus::Approved => "Approved",
            AssignmentStatus::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub worker_id: String,
    pub hit_id: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_time: Option<String>,
}

/// Advertisement registration payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdRequest {
    pub server: String,
    pub port: u16,
    pub support_ie: bool,
    pub is_sandbox: bool,
    #[serde(rename = "ad.html")]
    pub ad_html: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// A remotely provisioned database server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Instance {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub master_username: String,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
}

/// Fields of a database instance create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceOptions {
    pub id: String,
    pub size_gb: u32,
    pub username: String,
    pub password: String,
    pub dbname: String,
}

/// Master credentials used for database-level calls on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Local bonus bookkeeping for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    Unpaid,
    BonusPaid,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Participant {
    pub assignment_id: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub hit_id: String,
    /// Bonus computed by the experiment, in dollars.
    #[serde(default)]
    pub bonus: f64,
    #[serde(default)]
    pub payment: PaymentState,
}

/// State reported by the experiment-server process controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
    Transitioning,
}

impl ServerState {
    pub fn prompt_label(&self) -> &'static str {
        match self {
            ServerState::Running => "on",
            ServerState::Stopped => "off",
            ServerState::Transitioning => "wait",
        }
    }
}

pub trait Marketplace {
    /// Point subsequent calls at the sandbox or live endpoint.
    fn set_mode(&mut self, mode: Mode);
    fn list_hits(&self, filter: HitFilter) -> Result<Vec<Hit>>;
    fn create_hit(&mut self, request: &HitRequest) -> Result<String>;
    fn extend_hit(
        &mut self,
        hit_id: &str,
        assignments: Option<u32>,
        minutes: Option<u32>,
    ) -> Result<()>;
    fn expire_hit(&mut self, hit_id: &str) -> Result<()>;
    fn dispose_hit(&mut self, hit_id: &str) -> Result<()>;
    fn hit_status(&self, hit_id: &str) -> Result<HitStatus>;
    fn list_assignments(&self, status: Option<AssignmentStatus>) -> Result<Vec<Assignment>>;
    fn approve_assignment(&mut self, assignment_id: &str) -> Result<()>;
    fn reject_assignment(&mut self, assignment_id: &str) -> Result<()>;
    fn grant_bonus(&mut self, assignment_id: &str, amount: f64, reason: &str) -> Result<()>;
    fn account_balance(&self) -> Result<String>;
}

pub trait AdHost {
    fn system_status(&self) -> Result<String>;
    fn public_address(&self) -> Result<String>;
    fn register_ad(&mut self, request: &AdRequest) -> Result<String>;
    fn ad_url(&self, ad_id: &str) -> String;
    fn bind_hit(&mut self, ad_id: &str, hit_id: &str) -> Result<()>;
    fn delete_ad(&mut self, hit_id: &str) -> Result<()>;
}

pub trait Provisioner {
    fn list_regions(&self) -> Result<Vec<String>>;
    fn region(&self) -> String;
    fn set_region(&mut self, region: &str);
    fn list_instances(&self) -> Result<Vec<Instance>>;
    fn instance_detail(&self, instance_id: &str) -> Result<Instance>;
    fn create_instance(&mut self, options: &InstanceOptions) -> Result<Instance>;
    fn delete_instance(&mut self, instance_id: &str) -> Result<()>;
    fn authorize_address(&mut self, instance: &Instance, address: &str) -> Result<()>;
    /// Databases on the instance, system schemas included.
    fn list_databases(&self, instance: &Instance, credentials: &Credentials)
        -> Result<Vec<String>>;
    fn create_database(
        &mut self,
        instance: &Instance,
        credentials: &Credentials,
        name: &str,
    ) -> Result<()>;
}

pub trait ParticipantStore {
    fn find_by_assignment(&self, assignment_id: &str) -> Result<Participant>;
    fn set_payment_state(&mut self, assignment_id: &str, state: PaymentState) -> Result<()>;
}

pub trait ProcessController {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn state(&mut self) -> ServerState;
}
