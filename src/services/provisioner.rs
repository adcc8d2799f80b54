//! Database provisioning gateway over the JSON API.
//!
//! The region is local session state; every instance call is scoped to it.
use super::http::JsonClient;
use super::{Credentials, Instance, InstanceOptions, Provisioner};
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct Authorization<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct NewDatabase<'a> {
    #[serde(flatten)]
    credentials: &'a Credentials,
    name: &'a str,
}

pub struct HttpProvisioner {
    client: JsonClient,
    region: String,
}

impl HttpProvisioner {
    pub fn new(endpoint: &str, region: &str, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(endpoint, timeout),
            region: region.to_string(),
        }
    }

    /// Same credential headers the marketplace gateway sends.
    pub fn with_credentials(mut self, access_key_id: &str, secret_access_key: &str) -> Self {
        self.client = self
            .client
            .with_header("x-access-key-id", access_key_id)
            .with_header("x-secret-access-key", secret_access_key);
        self
    }

    fn instances_path(&self) -> String {
        format!("regions/{}/instances", self.region)
    }

    fn instance_path(&self, instance_id: &str) -> String {
        format!("regions/{}/instances/{instance_id}", self.region)
    }
}

impl Provisioner for HttpProvisioner {
    fn list_regions(&self) -> Result<Vec<String>> {
        self.client.get("regions", &[])
    }

    fn region(&self) -> String {
        self.region.clone()
    }

    fn set_region(&mut self, region: &str) {
        self.region = region.to_string();
    }

    fn list_instances(&self) -> Result<Vec<Instance>> {
        self.client.get(&self.instances_path(), &[])
    }

    fn instance_detail(&self, instance_id: &str) -> Result<Instance> {
        self.client.get(&self.instance_path(instance_id), &[])
    }

    fn create_instance(&mut self, options: &InstanceOptions) -> Result<Instance> {
        self.client.post(&self.instances_path(), options)
    }

    fn delete_instance(&mut self, instance_id: &str) -> Result<()> {
        self.client.delete(&self.instance_path(instance_id), &[])
    }

    fn authorize_address(&mut self, instance: &Instance, address: &str) -> Result<()> {
        self.client.post_unit(
            &format!("{}/authorize", self.instance_path(&instance.id)),
            &Authorization { address },
        )
    }

    fn list_databases(
        &self,
        instance: &Instance,
        credentials: &Credentials,
    ) -> Result<Vec<String>> {
        self.client.post(
            &format!("{}/databases/list", self.instance_path(&instance.id)),
            credentials,
        )
    }

    fn create_database(
        &mut self,
        instance: &Instance,
        credentials: &Credentials,
        name: &str,
    ) -> Result<()> {
        self.client.post_unit(
            &format!("{}/databases", self.instance_path(&instance.id)),
            &NewDatabase { credentials, name },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_paths_follow_the_region() {
        let mut cloud = HttpProvisioner::new("https://db.example.org", "us-east-1", Duration::from_secs(1));
        assert_eq!(cloud.instance_path("exp"), "regions/us-east-1/instances/exp");
        cloud.set_region("eu-west-1");
        assert_eq!(cloud.instances_path(), "regions/eu-west-1/instances");
    }
}
