//! Fetching content that a bare manifest references by URL.

use std::{fs, time::Duration};

use metspack_config::config::Config;
use metspack_utils::bytes::format_bytes;
use tracing::debug;
use ureq::Agent;
use url::Url;

use crate::error::{ErrorContext, PackError, PackResult};

#[derive(Clone)]
pub struct FetchClient {
    agent: Agent,
    limit: u64,
}

impl FetchClient {
    pub fn new(timeout: Duration, user_agent: &str, limit: u64) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(user_agent)
            .build()
            .into();
        Self { agent, limit }
    }

    pub fn from_config(config: &Config) -> PackResult<Self> {
        Ok(Self::new(
            config.fetch_timeout(),
            config.user_agent(),
            config.fetch_limit()?,
        ))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Reads an `http(s)://` or `file://` URL into memory.
    pub fn fetch(&self, location: &str) -> PackResult<Vec<u8>> {
        let url = Url::parse(location)
            .map_err(|err| PackError::validation(format!("invalid URL `{location}`: {err}")))?;

        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    PackError::validation(format!("`{location}` is not a local file URL"))
                })?;
                let size = fs::metadata(&path)
                    .with_context(|| format!("reading metadata of {}", path.display()))?
                    .len();
                self.check_limit(location, size)?;
                fs::read(&path).with_context(|| format!("reading {}", path.display()))
            }
            "http" | "https" => {
                debug!(url = %url, "fetching referenced content");
                let network = |err: ureq::Error| {
                    PackError::Network {
                        url: location.to_string(),
                        source: Box::new(err),
                    }
                };
                let mut response = self.agent.get(url.as_str()).call().map_err(network)?;
                response
                    .body_mut()
                    .with_config()
                    .limit(self.limit)
                    .read_to_vec()
                    .map_err(network)
            }
            other => {
                Err(PackError::validation(format!(
                    "unsupported URL scheme `{other}` in `{location}`"
                )))
            }
        }
    }

    fn check_limit(&self, location: &str, size: u64) -> PackResult<()> {
        if size > self.limit {
            return Err(PackError::validation(format!(
                "`{location}` is {}, larger than the fetch limit of {}",
                format_bytes(size, 1),
                format_bytes(self.limit, 1)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.txt");
        fs::write(&path, b"hello").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let client = FetchClient::new(Duration::from_secs(5), "metspack-test", 1024);
        assert_eq!(client.fetch(url.as_str()).unwrap(), b"hello");

        let tiny = FetchClient::new(Duration::from_secs(5), "metspack-test", 2);
        assert!(matches!(tiny.fetch(url.as_str()), Err(PackError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_urls() {
        let client = FetchClient::new(Duration::from_secs(5), "metspack-test", 1024);
        assert!(client.fetch("not a url").is_err());
        assert!(client.fetch("ftp://example.org/x").is_err());
    }

    #[test]
    fn test_from_config_uses_limit() {
        let client = FetchClient::from_config(&Config::default_config()).unwrap();
        assert_eq!(client.limit(), 1024 * 1024 * 1024);
    }
}
