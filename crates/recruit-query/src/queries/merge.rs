use std::sync::Arc;

use super::domain::{Criterion, CriterionKey, CriterionResult, ResultSet};
use super::scoring::{self, Credential, ScoringError, ScoringSource};

/// Builds and grows result sets while keeping criterion keys unique.
pub struct ResultMerger<G> {
    source: Arc<G>,
}

/// Result of expanding a query: the merged set plus the freshly scored delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub results: ResultSet,
    pub added: Vec<CriterionResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("criterion {0} was already evaluated with a different minimum aggregate")]
    ConflictingCriterion(CriterionKey),
    #[error(transparent)]
    Upstream(#[from] ScoringError),
}

impl<G> ResultMerger<G>
where
    G: ScoringSource,
{
    pub fn new(source: Arc<G>) -> Self {
        Self { source }
    }

    /// Score a fresh list of criteria.
    pub async fn evaluate_criteria(
        &self,
        criteria: &[Criterion],
        credential: &Credential,
    ) -> Result<ResultSet, MergeError> {
        let pending = pending_criteria(criteria, &ResultSet::default())?;
        let results = scoring::evaluate(self.source.as_ref(), &pending, credential).await?;
        Ok(ResultSet::from(results))
    }

    /// Append the criteria not yet present in `existing`.
    ///
    /// Re-submitting a known criterion with the same threshold is a no-op; a
    /// different threshold rejects the whole call before anything is scored.
    pub async fn expand_criteria(
        &self,
        criteria: &[Criterion],
        existing: &ResultSet,
        credential: &Credential,
    ) -> Result<Expansion, MergeError> {
        let pending = pending_criteria(criteria, existing)?;
        if pending.is_empty() {
            return Ok(Expansion {
                results: existing.clone(),
                added: Vec::new(),
            });
        }

        let added = scoring::evaluate(self.source.as_ref(), &pending, credential).await?;
        let mut results = existing.clone();
        results.extend(added.iter().cloned());

        Ok(Expansion { results, added })
    }
}

fn pending_criteria(
    submitted: &[Criterion],
    existing: &ResultSet,
) -> Result<Vec<Criterion>, MergeError> {
    let mut pending: Vec<Criterion> = Vec::new();

    for criterion in submitted {
        let key = criterion.key();
        let known = existing
            .find(&key)
            .map(|result| result.min_aggregate)
            .or_else(|| {
                pending
                    .iter()
                    .find(|queued| queued.key() == key)
                    .map(|queued| queued.min_aggregate)
            });

        match known {
            Some(threshold) if criterion.same_threshold(threshold) => continue,
            Some(_) => return Err(MergeError::ConflictingCriterion(key)),
            None => pending.push(criterion.clone()),
        }
    }

    Ok(pending)
}
