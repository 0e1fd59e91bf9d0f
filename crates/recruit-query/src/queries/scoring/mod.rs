//! Gateway to the external scoring service.
//!
//! Each criterion is scored by an independent request. Requests for one
//! evaluation run concurrently, but results are always returned in the order
//! the criteria were submitted, and the first failure aborts the whole batch.

mod http;

pub use http::HttpScoringSource;

use std::fmt;

use async_trait::async_trait;
use futures::future::try_join_all;

use super::domain::{Criterion, CriterionKey, CriterionResult, MatchRecord};

/// Bearer credential forwarded to the scoring service on the caller's behalf.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Source of scored matches for a single criterion.
#[async_trait]
pub trait ScoringSource: Send + Sync {
    async fn matches(
        &self,
        criterion: &Criterion,
        credential: &Credential,
    ) -> Result<Vec<MatchRecord>, ScoringError>;
}

/// Score every criterion, preserving submission order.
pub async fn evaluate<G>(
    source: &G,
    criteria: &[Criterion],
    credential: &Credential,
) -> Result<Vec<CriterionResult>, ScoringError>
where
    G: ScoringSource + ?Sized,
{
    let requests = criteria.iter().map(|criterion| async move {
        let matches = source.matches(criterion, credential).await?;
        Ok::<_, ScoringError>(CriterionResult::new(criterion, matches))
    });

    try_join_all(requests).await
}

/// Failure talking to the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring client could not be built: {0}")]
    Client(String),
    #[error("scoring request for {key} failed: {message}")]
    Transport { key: CriterionKey, message: String },
    #[error("scoring service answered {status} for {key}")]
    Status { key: CriterionKey, status: u16 },
    #[error("scoring service returned a malformed payload for {key}: {message}")]
    Malformed { key: CriterionKey, message: String },
}
