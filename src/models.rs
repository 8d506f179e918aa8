use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::Verdict;

/// A polled URL. Registered once from configuration, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint {
    pub url: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Request could not be completed; holds the full "request to ... failed: ..." text.
    Transport(String),
    Validation(Verdict),
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub endpoint: Endpoint,
    pub checked_at: DateTime<Utc>,
    pub failure: Option<Failure>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// Why the check failed, `None` when it passed.
    pub fn reason(&self) -> Option<String> {
        match &self.failure {
            None => None,
            Some(Failure::Transport(reason)) => Some(reason.clone()),
            Some(Failure::Validation(verdict)) => Some(verdict.reason().to_string()),
        }
    }

    /// The line this result contributes to a report, `None` when it passed.
    pub fn failure_line(&self) -> Option<String> {
        match &self.failure {
            None => None,
            Some(Failure::Transport(reason)) => Some(reason.clone()),
            Some(Failure::Validation(verdict)) => Some(format!(
                "request to {} failed: {}",
                self.endpoint.url,
                verdict.reason()
            )),
        }
    }
}

/// Failures gathered from a single poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub failure_lines: Vec<String>,
}
