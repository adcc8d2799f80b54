//! Marketplace gateway over the JSON API.
use super::http::JsonClient;
use super::{Assignment, AssignmentStatus, Hit, HitFilter, HitRequest, HitStatus, Marketplace};
use crate::config::{AwsConfig, MarketplaceConfig};
use crate::environment::Mode;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
struct CreatedHit {
    hit_id: String,
}

#[derive(Deserialize)]
struct Balance {
    balance: String,
}

#[derive(Serialize)]
struct Extension {
    #[serde(skip_serializing_if = "Option::is_none")]
    assignments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes: Option<u32>,
}

#[derive(Serialize)]
struct Bonus<'a> {
    amount: f64,
    reason: &'a str,
}

#[derive(Serialize)]
struct Empty {}

pub struct HttpMarketplace {
    client: JsonClient,
    sandbox_endpoint: String,
    live_endpoint: String,
}

impl HttpMarketplace {
    pub fn new(config: &MarketplaceConfig, aws: &AwsConfig, mode: Mode) -> Self {
        let client = JsonClient::new(
            endpoint_for(config, mode),
            Duration::from_secs(config.timeout_secs),
        )
        .with_header("x-access-key-id", aws.access_key_id.clone())
        .with_header("x-secret-access-key", aws.secret_access_key.clone());
        Self {
            client,
            sandbox_endpoint: config.sandbox_endpoint.clone(),
            live_endpoint: config.live_endpoint.clone(),
        }
    }
}

fn endpoint_for(config: &MarketplaceConfig, mode: Mode) -> String {
    match mode {
        Mode::Sandbox => config.sandbox_endpoint.clone(),
        Mode::Live => config.live_endpoint.clone(),
    }
}

impl Marketplace for HttpMarketplace {
    fn set_mode(&mut self, mode: Mode) {
        let endpoint = match mode {
            Mode::Sandbox => &self.sandbox_endpoint,
            Mode::Live => &self.live_endpoint,
        };
        self.client.set_base(endpoint.clone());
        tracing::debug!(%mode, endpoint = self.client.base(), "marketplace repointed");
    }

    fn list_hits(&self, filter: HitFilter) -> Result<Vec<Hit>> {
        self.client.get("hits", &[("status", filter.as_str())])
    }

    fn create_hit(&mut self, request: &HitRequest) -> Result<String> {
        let created: CreatedHit = self.client.post("hits", request)?;
        Ok(created.hit_id)
    }

    fn extend_hit(
        &mut self,
        hit_id: &str,
        assignments: Option<u32>,
        minutes: Option<u32>,
    ) -> Result<()> {
        self.client.post_unit(
            &format!("hits/{hit_id}/extend"),
            &Extension {
                assignments,
                minutes,
            },
        )
    }

    fn expire_hit(&mut self, hit_id: &str) -> Result<()> {
        self.client.post_unit(&format!("hits/{hit_id}/expire"), &Empty {})
    }

    fn dispose_hit(&mut self, hit_id: &str) -> Result<()> {
        self.client.delete(&format!("hits/{hit_id}"), &[])
    }

    fn hit_status(&self, hit_id: &str) -> Result<HitStatus> {
        let hit: Hit = self.client.get(&format!("hits/{hit_id}"), &[])?;
        Ok(hit.status)
    }

    fn list_assignments(&self, status: Option<AssignmentStatus>) -> Result<Vec<Assignment>> {
        match status {
            Some(status) => self
                .client
                .get("assignments", &[("status", status.as_str())]),
            None => self.client.get("assignments", &[]),
        }
    }

    fn approve_assignment(&mut self, assignment_id: &str) -> Result<()> {
        self.client
            .post_unit(&format!("assignments/{assignment_id}/approve"), &Empty {})
    }

    fn reject_assignment(&mut self, assignment_id: &str) -> Result<()> {
        self.client
            .post_unit(&format!("assignments/{assignment_id}/reject"), &Empty {})
    }

    fn grant_bonus(&mut self, assignment_id: &str, amount: f64, reason: &str) -> Result<()> {
        self.client.post_unit(
            &format!("assignments/{assignment_id}/bonus"),
            &Bonus { amount, reason },
        )
    }

    fn account_balance(&self) -> Result<String> {
        let balance: Balance = self.client.get("account/balance", &[])?;
        Ok(balance.balance)
    }
}
