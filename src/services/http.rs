//! Blocking JSON-over-HTTP client shared by the remote service gateways.
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use ureq::http::Response;
use ureq::Body;

/// Upper bound on how much of an error body ends up in a message.
const MAX_ERROR_BODY_CHARS: usize = 400;

#[derive(Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
    base: String,
    headers: Vec<(String, String)>,
}

impl JsonClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base: base.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn set_base(&mut self, base: impl Into<String>) {
        self.base = base.into();
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        let start = Instant::now();
        let mut request = self.agent.get(&url).query_pairs(query.iter().copied());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.call().with_context(|| format!("GET {url}"))?;
        read_json("GET", &url, start, response)
    }

    pub fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        let mut request = self.agent.get(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let mut response = request.call().with_context(|| format!("GET {url}"))?;
        ensure_success("GET", &url, &mut response)?;
        response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("read GET {url} body"))
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let start = Instant::now();
        let mut request = self.agent.post(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send_json(body)
            .with_context(|| format!("POST {url}"))?;
        read_json("POST", &url, start, response)
    }

    /// POST whose reply carries no payload the caller needs.
    pub fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        let start = Instant::now();
        let mut request = self.agent.post(&url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let mut response = request
            .send_json(body)
            .with_context(|| format!("POST {url}"))?;
        ensure_success("POST", &url, &mut response)?;
        log_call("POST", &url, start);
        Ok(())
    }

    pub fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let url = self.url(path);
        let start = Instant::now();
        let mut request = self.agent.delete(&url).query_pairs(query.iter().copied());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let mut response = request.call().with_context(|| format!("DELETE {url}"))?;
        ensure_success("DELETE", &url, &mut response)?;
        log_call("DELETE", &url, start);
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(
    method: &str,
    url: &str,
    start: Instant,
    mut response: Response<Body>,
) -> Result<T> {
    ensure_success(method, url, &mut response)?;
    let value = response
        .body_mut()
        .read_json::<T>()
        .with_context(|| format!("parse {method} {url} response JSON"))?;
    log_call(method, url, start);
    Ok(value)
}

fn ensure_success(method: &str, url: &str, response: &mut Response<Body>) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let text = response.body_mut().read_to_string().unwrap_or_default();
    let snippet: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    tracing::warn!(method, url, status = status.as_u16(), "remote call rejected");
    Err(anyhow!("{method} {url} returned HTTP {}: {snippet}", status.as_u16()))
}

fn log_call(method: &str, url: &str, start: Instant) {
    let elapsed_ms = start.elapsed().as_millis();
    tracing::debug!(method, url, elapsed_ms, "remote call complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_doubled_slashes() {
        let client = JsonClient::new("https://api.example.org/v1/", Duration::from_secs(1));
        assert_eq!(client.url("/hits"), "https://api.example.org/v1/hits");
        assert_eq!(client.url("hits/H1"), "https://api.example.org/v1/hits/H1");
    }
}
