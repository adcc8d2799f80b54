//! Ad-hosting gateway over the JSON API.
use super::http::JsonClient;
use super::{AdHost, AdRequest};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
struct Address {
    ip: String,
}

#[derive(Deserialize)]
struct RegisteredAd {
    ad_id: String,
}

#[derive(Serialize)]
struct Binding<'a> {
    hit_id: &'a str,
}

pub struct HttpAdHost {
    client: JsonClient,
}

impl HttpAdHost {
    pub fn new(location: &str, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(location, timeout),
        }
    }
}

impl AdHost for HttpAdHost {
    fn system_status(&self) -> Result<String> {
        self.client.get_text("status")
    }

    fn public_address(&self) -> Result<String> {
        let address: Address = self.client.get("ip", &[])?;
        if address.ip.trim().is_empty() {
            return Err(anyhow!("ad server did not report a public address"));
        }
        Ok(address.ip)
    }

    fn register_ad(&mut self, request: &AdRequest) -> Result<String> {
        let registered: RegisteredAd = self.client.post("ads", request)?;
        tracing::debug!(ad_id = %registered.ad_id, "ad registered");
        Ok(registered.ad_id)
    }

    fn ad_url(&self, ad_id: &str) -> String {
        self.client.url(&format!("ad/{ad_id}"))
    }

    fn bind_hit(&mut self, ad_id: &str, hit_id: &str) -> Result<()> {
        self.client
            .post_unit(&format!("ads/{ad_id}/hit"), &Binding { hit_id })
    }

    fn delete_ad(&mut self, hit_id: &str) -> Result<()> {
        self.client.delete("ads", &[("hit_id", hit_id)])
    }
}
