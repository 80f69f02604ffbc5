use anyhow::{Context, Result, bail};
use reqwest::Url;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub request_timeout: Duration,
}

impl Config {
    /// Reads `STORY_API_URL` and `STORY_API_TIMEOUT_SECS`, falling back to local defaults.
    pub fn from_env() -> Result<Self> {
        let api_url =
            std::env::var("STORY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let timeout =
            std::env::var("STORY_API_TIMEOUT_SECS").unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string());
        Self::from_parts(&api_url, &timeout)
    }

    pub fn from_parts(api_url: &str, timeout_secs: &str) -> Result<Self> {
        let api_url = Url::parse(api_url).with_context(|| format!("invalid API url {api_url:?}"))?;
        let secs: u64 = timeout_secs
            .trim()
            .parse()
            .with_context(|| format!("invalid request timeout {timeout_secs:?}"))?;
        if secs == 0 {
            bail!("request timeout must be at least one second");
        }

        Ok(Config {
            api_url,
            request_timeout: Duration::from_secs(secs),
        })
    }

    pub fn with_api_url(mut self, api_url: &str) -> Result<Self> {
        self.api_url = Url::parse(api_url).with_context(|| format!("invalid API url {api_url:?}"))?;
        Ok(self)
    }
}
