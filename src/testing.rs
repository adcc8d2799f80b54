//! In-memory collaborators for unit tests.
//!
//! Each fake records the calls it receives so tests can assert that a
//! rejected request never reached a remote service.
use crate::environment::Mode;
use crate::services::{
    AdHost, AdRequest, Assignment, AssignmentStatus, Credentials, Hit, HitFilter, HitRequest,
    HitStatus, Instance, InstanceOptions, Marketplace, Participant, ParticipantStore,
    PaymentState, ProcessController, Provisioner, ServerState,
};
use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub(crate) struct CallLog(RefCell<Vec<String>>);

impl CallLog {
    pub(crate) fn push(&self, call: impl Into<String>) {
        self.0.borrow_mut().push(call.into());
    }

    pub(crate) fn all(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

#[derive(Debug)]
pub(crate) struct FakeMarketplace {
    mode: Mode,
    hits: BTreeMap<&'static str, Vec<Hit>>,
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) bonuses: Vec<(String, f64, String)>,
    pub(crate) fail_listing: bool,
    pub(crate) fail_create: bool,
    pub(crate) fail_status: bool,
    pub(crate) reject_bonus_for: BTreeSet<String>,
    next_id: usize,
    pub(crate) calls: CallLog,
}

impl Default for FakeMarketplace {
    fn default() -> Self {
        Self {
            mode: Mode::Sandbox,
            hits: BTreeMap::new(),
            assignments: Vec::new(),
            bonuses: Vec::new(),
            fail_listing: false,
            fail_create: false,
            fail_status: false,
            reject_bonus_for: BTreeSet::new(),
            next_id: 0,
            calls: CallLog::default(),
        }
    }
}

impl FakeMarketplace {
    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn add_hit(&mut self, mode: Mode, hit_id: &str, status: HitStatus) {
        self.hits.entry(mode.as_str()).or_default().push(Hit {
            hit_id: hit_id.to_string(),
            status,
            title: "Experiment".to_string(),
            max_assignments: 1,
            reward: "1.00".to_string(),
            pending_assignments: 0,
            completed_assignments: 0,
        });
    }

    pub(crate) fn add_active_hits(&mut self, mode: Mode, count: usize) {
        for index in 0..count {
            self.add_hit(mode, &format!("{}-active-{index}", mode.as_str()), HitStatus::Active);
        }
    }

    pub(crate) fn add_assignment(&mut self, assignment_id: &str, hit_id: &str, status: AssignmentStatus) {
        self.assignments.push(Assignment {
            assignment_id: assignment_id.to_string(),
            worker_id: format!("W-{assignment_id}"),
            hit_id: hit_id.to_string(),
            status,
            submit_time: None,
        });
    }

    pub(crate) fn hits(&self, mode: Mode) -> Vec<Hit> {
        self.hits.get(mode.as_str()).cloned().unwrap_or_default()
    }

    fn hit_mut(&mut self, hit_id: &str) -> Result<&mut Hit> {
        self.hits
            .get_mut(self.mode.as_str())
            .and_then(|hits| hits.iter_mut().find(|hit| hit.hit_id == hit_id))
            .ok_or_else(|| anyhow!("unknown hit {hit_id}"))
    }
}

impl Marketplace for FakeMarketplace {
    fn set_mode(&mut self, mode: Mode) {
        self.calls.push(format!("set_mode {mode}"));
        self.mode = mode;
    }

    fn list_hits(&self, filter: HitFilter) -> Result<Vec<Hit>> {
        self.calls.push(format!("list_hits {}", filter.as_str()));
        if self.fail_listing {
            return Err(anyhow!("listing unavailable"));
        }
        Ok(self
            .hits(self.mode)
            .into_iter()
            .filter(|hit| match filter {
                HitFilter::All => true,
                HitFilter::Active => hit.status == HitStatus::Active,
                HitFilter::Reviewable => hit.status == HitStatus::Reviewable,
            })
            .collect())
    }

    fn create_hit(&mut self, request: &HitRequest) -> Result<String> {
        self.calls.push(format!("create_hit {}", request.ad_location));
        if self.fail_create {
            return Err(anyhow!("marketplace rejected the hit"));
        }
        self.next_id += 1;
        let hit_id = format!("HIT{}", self.next_id);
        self.add_hit(self.mode, &hit_id, HitStatus::Active);
        Ok(hit_id)
    }

    fn extend_hit(
        &mut self,
        hit_id: &str,
        assignments: Option<u32>,
        minutes: Option<u32>,
    ) -> Result<()> {
        self.calls
            .push(format!("extend_hit {hit_id} {assignments:?} {minutes:?}"));
        let hit = self.hit_mut(hit_id)?;
        hit.max_assignments += assignments.unwrap_or(0);
        Ok(())
    }

    fn expire_hit(&mut self, hit_id: &str) -> Result<()> {
        self.calls.push(format!("expire_hit {hit_id}"));
        self.hit_mut(hit_id)?.status = HitStatus::Reviewable;
        Ok(())
    }

    fn dispose_hit(&mut self, hit_id: &str) -> Result<()> {
        self.calls.push(format!("dispose_hit {hit_id}"));
        self.hit_mut(hit_id)?.status = HitStatus::Disposed;
        Ok(())
    }

    fn hit_status(&self, hit_id: &str) -> Result<HitStatus> {
        self.calls.push(format!("hit_status {hit_id}"));
        if self.fail_status {
            return Err(anyhow!("status unavailable"));
        }
        self.hits(self.mode)
            .into_iter()
            .find(|hit| hit.hit_id == hit_id)
            .map(|hit| hit.status)
            .ok_or_else(|| anyhow!("unknown hit {hit_id}"))
    }

    fn list_assignments(&self, status: Option<AssignmentStatus>) -> Result<Vec<Assignment>> {
        self.calls.push(format!("list_assignments {status:?}"));
        if self.fail_listing {
            return Err(anyhow!("listing unavailable"));
        }
        Ok(self
            .assignments
            .iter()
            .filter(|assignment| match status {
                Some(wanted) => assignment.status == wanted,
                None => true,
            })
            .cloned()
            .collect())
    }

    fn approve_assignment(&mut self, assignment_id: &str) -> Result<()> {
        self.calls.push(format!("approve {assignment_id}"));
        self.assignments
            .iter_mut()
            .find(|assignment| assignment.assignment_id == assignment_id)
            .map(|assignment| assignment.status = AssignmentStatus::Approved)
            .ok_or_else(|| anyhow!("unknown assignment {assignment_id}"))
    }

    fn reject_assignment(&mut self, assignment_id: &str) -> Result<()> {
        self.calls.push(format!("reject {assignment_id}"));
        self.assignments
            .iter_mut()
            .find(|assignment| assignment.assignment_id == assignment_id)
            .map(|assignment| assignment.status = AssignmentStatus::Rejected)
            .ok_or_else(|| anyhow!("unknown assignment {assignment_id}"))
    }

    fn grant_bonus(&mut self, assignment_id: &str, amount: f64, reason: &str) -> Result<()> {
        self.calls.push(format!("grant_bonus {assignment_id}"));
        if self.reject_bonus_for.contains(assignment_id) {
            return Err(anyhow!("bonus rejected for {assignment_id}"));
        }
        self.bonuses
            .push((assignment_id.to_string(), amount, reason.to_string()));
        Ok(())
    }

    fn account_balance(&self) -> Result<String> {
        self.calls.push("account_balance");
        Ok("$10000.00".to_string())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeAdHost {
    pub(crate) ads: Vec<String>,
    pub(crate) bindings: Vec<(String, String)>,
    pub(crate) deleted_for_hits: Vec<String>,
    pub(crate) fail_register: bool,
    pub(crate) fail_bind: bool,
    pub(crate) calls: CallLog,
}

impl AdHost for FakeAdHost {
    fn system_status(&self) -> Result<String> {
        self.calls.push("system_status");
        Ok("ad server: all systems normal\n".to_string())
    }

    fn public_address(&self) -> Result<String> {
        self.calls.push("public_address");
        Ok("203.0.113.7".to_string())
    }

    fn register_ad(&mut self, request: &AdRequest) -> Result<String> {
        self.calls
            .push(format!("register_ad sandbox={}", request.is_sandbox));
        if self.fail_register {
            return Err(anyhow!("ad server refused the template"));
        }
        let ad_id = format!("AD{}", self.ads.len() + 1);
        self.ads.push(ad_id.clone());
        Ok(ad_id)
    }

    fn ad_url(&self, ad_id: &str) -> String {
        format!("https://ads.example.org/ad/{ad_id}")
    }

    fn bind_hit(&mut self, ad_id: &str, hit_id: &str) -> Result<()> {
        self.calls.push(format!("bind_hit {ad_id} {hit_id}"));
        if self.fail_bind {
            return Err(anyhow!("ad record locked"));
        }
        self.bindings.push((ad_id.to_string(), hit_id.to_string()));
        Ok(())
    }

    fn delete_ad(&mut self, hit_id: &str) -> Result<()> {
        self.calls.push(format!("delete_ad {hit_id}"));
        self.deleted_for_hits.push(hit_id.to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct FakeProvisioner {
    region: String,
    pub(crate) instances: Vec<Instance>,
    pub(crate) databases: Vec<String>,
    pub(crate) fail_authorize: bool,
    pub(crate) fail_delete: bool,
    pub(crate) create_requests: Vec<InstanceOptions>,
    pub(crate) calls: CallLog,
}

impl Default for FakeProvisioner {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            instances: Vec::new(),
            databases: vec!["information_schema".to_string(), "mysql".to_string()],
            fail_authorize: false,
            fail_delete: false,
            create_requests: Vec::new(),
            calls: CallLog::default(),
        }
    }
}

impl FakeProvisioner {
    pub(crate) fn add_instance(&mut self, id: &str) {
        self.instances.push(Instance {
            id: id.to_string(),
            status: "available".to_string(),
            master_username: "admin".to_string(),
            endpoint: Some(crate::services::Endpoint {
                host: format!("{id}.db.example.org"),
                port: 3306,
            }),
        });
    }

    /// Calls that reach the provider, as opposed to local bookkeeping.
    pub(crate) fn remote_calls(&self) -> Vec<String> {
        self.calls
            .all()
            .into_iter()
            .filter(|call| call != "region")
            .collect()
    }
}

impl Provisioner for FakeProvisioner {
    fn list_regions(&self) -> Result<Vec<String>> {
        self.calls.push("list_regions");
        Ok(vec![
            "us-east-1".to_string(),
            "us-west-2".to_string(),
            "eu-west-1".to_string(),
        ])
    }

    fn region(&self) -> String {
        self.calls.push("region");
        self.region.clone()
    }

    fn set_region(&mut self, region: &str) {
        self.calls.push(format!("set_region {region}"));
        self.region = region.to_string();
    }

    fn list_instances(&self) -> Result<Vec<Instance>> {
        self.calls.push("list_instances");
        Ok(self.instances.clone())
    }

    fn instance_detail(&self, instance_id: &str) -> Result<Instance> {
        self.calls.push(format!("instance_detail {instance_id}"));
        self.instances
            .iter()
            .find(|instance| instance.id == instance_id)
            .cloned()
            .ok_or_else(|| anyhow!("no instance {instance_id}"))
    }

    fn create_instance(&mut self, options: &InstanceOptions) -> Result<Instance> {
        self.calls.push(format!("create_instance {}", options.id));
        self.create_requests.push(options.clone());
        let instance = Instance {
            id: options.id.clone(),
            status: "creating".to_string(),
            master_username: options.username.clone(),
            endpoint: None,
        };
        self.instances.push(instance.clone());
        Ok(instance)
    }

    fn delete_instance(&mut self, instance_id: &str) -> Result<()> {
        self.calls.push(format!("delete_instance {instance_id}"));
        if self.fail_delete {
            return Err(anyhow!("instance is backing-up"));
        }
        self.instances.retain(|instance| instance.id != instance_id);
        Ok(())
    }

    fn authorize_address(&mut self, instance: &Instance, address: &str) -> Result<()> {
        self.calls
            .push(format!("authorize_address {} {address}", instance.id));
        if self.fail_authorize {
            return Err(anyhow!("security group quota exceeded"));
        }
        Ok(())
    }

    fn list_databases(
        &self,
        instance: &Instance,
        _credentials: &Credentials,
    ) -> Result<Vec<String>> {
        self.calls.push(format!("list_databases {}", instance.id));
        Ok(self.databases.clone())
    }

    fn create_database(
        &mut self,
        instance: &Instance,
        _credentials: &Credentials,
        name: &str,
    ) -> Result<()> {
        self.calls
            .push(format!("create_database {} {name}", instance.id));
        self.databases.push(name.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeParticipants {
    pub(crate) records: BTreeMap<String, Participant>,
    pub(crate) fail_writes: bool,
}

impl FakeParticipants {
    pub(crate) fn insert(&mut self, assignment_id: &str, bonus: f64, payment: PaymentState) {
        self.records.insert(
            assignment_id.to_string(),
            Participant {
                assignment_id: assignment_id.to_string(),
                worker_id: format!("W-{assignment_id}"),
                hit_id: String::new(),
                bonus,
                payment,
            },
        );
    }

    pub(crate) fn payment(&self, assignment_id: &str) -> Option<PaymentState> {
        self.records
            .get(assignment_id)
            .map(|participant| participant.payment)
    }
}

impl ParticipantStore for FakeParticipants {
    fn find_by_assignment(&self, assignment_id: &str) -> Result<Participant> {
        self.records
            .get(assignment_id)
            .cloned()
            .ok_or_else(|| anyhow!("no participant record for {assignment_id}"))
    }

    fn set_payment_state(&mut self, assignment_id: &str, state: PaymentState) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("participant store is read-only"));
        }
        let record = self
            .records
            .get_mut(assignment_id)
            .ok_or_else(|| anyhow!("no participant record for {assignment_id}"))?;
        record.payment = state;
        Ok(())
    }
}

/// Process controller that reaches its target state after a few polls.
#[derive(Debug)]
pub(crate) struct FakeProcess {
    state: ServerState,
    target: ServerState,
    polls_until_settled: usize,
    pub(crate) settle_after: usize,
    pub(crate) starts: usize,
    pub(crate) stops: usize,
}

impl FakeProcess {
    pub(crate) fn new(state: ServerState) -> Self {
        Self {
            state,
            target: state,
            polls_until_settled: 0,
            settle_after: 1,
            starts: 0,
            stops: 0,
        }
    }

    /// Never leave the transitioning state once a change is requested.
    pub(crate) fn stuck() -> Self {
        let mut process = Self::new(ServerState::Stopped);
        process.settle_after = usize::MAX;
        process
    }
}

impl ProcessController for FakeProcess {
    fn start(&mut self) -> Result<()> {
        self.starts += 1;
        self.target = ServerState::Running;
        self.state = ServerState::Transitioning;
        self.polls_until_settled = self.settle_after;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stops += 1;
        self.target = ServerState::Stopped;
        self.state = ServerState::Transitioning;
        self.polls_until_settled = self.settle_after;
        Ok(())
    }

    fn state(&mut self) -> ServerState {
        if self.state == ServerState::Transitioning {
            if self.polls_until_settled == 0 {
                self.state = self.target;
            } else {
                self.polls_until_settled -= 1;
            }
        }
        self.state
    }
}
