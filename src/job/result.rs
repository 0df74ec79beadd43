//! Job outcome returned to the caller.

use crate::error::{ErrorReport, JobError};
use crate::publish::PublishedArtifact;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Stem name to URL mapping for a successful job.
///
/// Serialises as a JSON object whose keys follow the requested stem order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    artifacts: Vec<PublishedArtifact>,
}

impl JobResult {
    /// Wrap published artifacts, one per requested stem.
    pub fn new(artifacts: Vec<PublishedArtifact>) -> Self {
        Self { artifacts }
    }

    /// URL published for `stem`.
    pub fn url(&self, stem: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|a| a.stem == stem)
            .map(|a| a.url.as_str())
    }

    /// Stem names in response order.
    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(|a| a.stem.as_str())
    }

    /// Number of published stems.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether no stems were published.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl Serialize for JobResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.artifacts.len()))?;
        for artifact in &self.artifacts {
            map.serialize_entry(&artifact.stem, &artifact.url)?;
        }
        map.end()
    }
}

/// Response envelope written for every job.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum HandlerResponse {
    /// Stem to URL map.
    Success(JobResult),
    /// `{"error": {...}}`.
    Failure {
        /// Structured error.
        error: ErrorReport,
    },
}

impl HandlerResponse {
    /// Whether the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<JobResult, JobError>> for HandlerResponse {
    fn from(outcome: Result<JobResult, JobError>) -> Self {
        match outcome {
            Ok(result) => Self::Success(result),
            Err(e) => Self::Failure { error: e.report() },
        }
    }
}
