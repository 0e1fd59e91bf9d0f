use serde::{Deserialize, Serialize};

use super::domain::{QueryDocument, ResponseTable, ResultSet};

/// Engagement ratios over the students of one result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub viewed: f64,
    pub responded: f64,
    pub accepted: f64,
    pub attended: f64,
}

/// Stored document together with its freshly computed metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    #[serde(flatten)]
    pub document: QueryDocument,
    pub metrics: Metrics,
}

impl QueryReport {
    pub fn new(document: QueryDocument) -> Self {
        let metrics = compute_ratios(&document.results, &document.responses);
        Self { document, metrics }
    }
}

/// Ratios are taken over the distinct students of `results`; responses for
/// anyone else are ignored. An empty result set yields all zeros.
pub fn compute_ratios(results: &ResultSet, responses: &ResponseTable) -> Metrics {
    let recipients = results.recipients();
    if recipients.is_empty() {
        return Metrics::default();
    }

    let records: Vec<_> = recipients
        .iter()
        .filter_map(|recipient| responses.get(recipient))
        .collect();
    let total = recipients.len() as f64;
    let ratio = |count: usize| count as f64 / total;

    Metrics {
        viewed: ratio(records.iter().filter(|r| r.viewed.is_some()).count()),
        responded: ratio(records.iter().filter(|r| r.responded.is_some()).count()),
        accepted: ratio(records.iter().filter(|r| r.accepted).count()),
        attended: ratio(records.iter().filter(|r| r.attended).count()),
    }
}
