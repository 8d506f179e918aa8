use anyhow::{bail, ensure, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::Endpoint;

pub const ENV_CONFIG_PATH: &str = "WEICO_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

const ENV_MAIL_USER: &str = "WEICO_MONITOR_MAIL_USER";
const ENV_MAIL_PASSWORD: &str = "WEICO_MONITOR_MAIL_PASSWORD";
const ENV_MAIL_HOST: &str = "WEICO_MONITOR_MAIL_HOST";
const ENV_RECIPIENTS: &str = "WEICO_MONITOR_RECIPIENTS";
const ENV_MAIL_TYPE: &str = "WEICO_MONITOR_MAIL_TYPE";
const ENV_POLL_INTERVAL: &str = "WEICO_MONITOR_POLL_INTERVAL_SECS";

const DEFAULT_SMTP_PORT: u16 = 25;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub endpoints: Vec<Endpoint>,
    pub mail: MailConfig,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Zero disables notification rate limiting.
    #[serde(default = "default_min_notify_interval")]
    pub min_notify_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_poll_interval() -> u64 { 600 }
fn default_min_notify_interval() -> u64 { 1800 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrency() -> usize { 1 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailConfig {
    pub user: String,
    pub password: String,
    /// `host[:port]`
    pub host: String,
    /// Semicolon separated addresses.
    pub recipients: String,
    #[serde(default)]
    pub mail_type: MailType,
    #[serde(default)]
    pub tls: MailTls,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

fn default_mail_timeout() -> u64 { 30 }

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailType {
    #[default]
    Html,
    Plain,
}

impl std::str::FromStr for MailType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(MailType::Html),
            "plain" => Ok(MailType::Plain),
            other => bail!("unknown mail type {other:?}, expected \"html\" or \"plain\""),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailTls {
    None,
    /// STARTTLS when the server offers it.
    #[default]
    Opportunistic,
    Required,
    /// Implicit TLS from the first byte (SMTPS).
    Wrapper,
}

impl MonitorConfig {
    /// Reads the JSON file, layers environment overrides on top and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: MonitorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(ENV_MAIL_USER) {
            self.mail.user = user;
        }
        if let Some(password) = lookup(ENV_MAIL_PASSWORD) {
            self.mail.password = password;
        }
        if let Some(host) = lookup(ENV_MAIL_HOST) {
            self.mail.host = host;
        }
        if let Some(recipients) = lookup(ENV_RECIPIENTS) {
            self.mail.recipients = recipients;
        }
        if let Some(mail_type) = lookup(ENV_MAIL_TYPE) {
            self.mail.mail_type = mail_type.parse()?;
        }
        if let Some(secs) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL} must be a number of seconds"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.endpoints.is_empty(), "at least one endpoint must be configured");
        for endpoint in &self.endpoints {
            let url = Url::parse(&endpoint.url)
                .with_context(|| format!("invalid endpoint url {:?}", endpoint.url))?;
            ensure!(
                matches!(url.scheme(), "http" | "https"),
                "endpoint {:?} must use http or https",
                endpoint.url
            );
        }
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be greater than zero");
        ensure!(self.request_timeout_secs > 0, "request_timeout_secs must be greater than zero");
        ensure!(self.max_concurrency >= 1, "max_concurrency must be at least 1");
        ensure!(!self.mail.user.trim().is_empty(), "mail.user must not be empty");
        ensure!(
            !self.mail.recipient_list().is_empty(),
            "mail.recipients must contain at least one address"
        );
        self.mail.host_and_port()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn min_notify_interval(&self) -> Duration {
        Duration::from_secs(self.min_notify_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl MailConfig {
    /// Recipients split on `;`, trimmed, blanks dropped, duplicates removed, order kept.
    pub fn recipient_list(&self) -> Vec<String> {
        let mut list: Vec<String> = Vec::new();
        for address in self.recipients.split(';').map(str::trim) {
            if !address.is_empty() && !list.iter().any(|seen| seen == address) {
                list.push(address.to_string());
            }
        }
        list
    }

    pub fn host_and_port(&self) -> Result<(String, u16)> {
        let host = self.host.trim();
        let (name, port) = match host.rsplit_once(':') {
            Some((name, port)) => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid port in mail.host {host:?}"))?;
                (name, port)
            }
            None => (host, DEFAULT_SMTP_PORT),
        };
        ensure!(!name.is_empty(), "mail.host must name a server");
        Ok((name.to_string(), port))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
