use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::stamp::Stamp;

/// Identifier wrapper for stored query documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub String);

impl QueryId {
    /// Validate a caller supplied identifier before it is handed to the store.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let well_formed = !trimmed.is_empty()
            && trimmed.len() <= 64
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        well_formed.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque address of a matched student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecipientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selection filter submitted by a recruiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub university_id: String,
    pub degree_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(alias = "absolute")]
    pub min_aggregate: f64,
}

impl Criterion {
    pub fn key(&self) -> CriterionKey {
        CriterionKey {
            university_id: self.university_id.clone(),
            degree_id: self.degree_id.clone(),
            course_id: self.course_id.clone(),
        }
    }

    pub fn same_threshold(&self, min_aggregate: f64) -> bool {
        (self.min_aggregate - min_aggregate).abs() < f64::EPSILON
    }
}

/// Identity of a criterion, without its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriterionKey {
    pub university_id: String,
    pub degree_id: String,
    pub course_id: Option<String>,
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "university {} / degree {} / course {}",
            self.university_id,
            self.degree_id,
            self.course_id.as_deref().unwrap_or("*")
        )
    }
}

/// One scored student returned by the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "student_address")]
    pub recipient_id: RecipientId,
    #[serde(rename = "avg")]
    pub aggregate_score: f64,
    pub complete: bool,
    pub timestamp: Stamp,
}

/// Matches produced by a single criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub university_id: String,
    pub degree_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    pub min_aggregate: f64,
    #[serde(rename = "result", default)]
    pub matches: Vec<MatchRecord>,
}

impl CriterionResult {
    pub fn new(criterion: &Criterion, matches: Vec<MatchRecord>) -> Self {
        Self {
            university_id: criterion.university_id.clone(),
            degree_id: criterion.degree_id.clone(),
            course_id: criterion.course_id.clone(),
            min_aggregate: criterion.min_aggregate,
            matches,
        }
    }

    pub fn key(&self) -> CriterionKey {
        CriterionKey {
            university_id: self.university_id.clone(),
            degree_id: self.degree_id.clone(),
            course_id: self.course_id.clone(),
        }
    }

    pub fn criterion(&self) -> Criterion {
        Criterion {
            university_id: self.university_id.clone(),
            degree_id: self.degree_id.clone(),
            course_id: self.course_id.clone(),
            min_aggregate: self.min_aggregate,
        }
    }
}

/// Accumulated criterion results of one query; keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<CriterionResult>);

impl ResultSet {
    pub fn as_slice(&self) -> &[CriterionResult] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CriterionResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, key: &CriterionKey) -> Option<&CriterionResult> {
        self.0.iter().find(|result| &result.key() == key)
    }

    pub fn recipients(&self) -> BTreeSet<RecipientId> {
        self.0
            .iter()
            .flat_map(|result| result.matches.iter())
            .map(|record| record.recipient_id.clone())
            .collect()
    }

    pub fn contains_recipient(&self, recipient: &RecipientId) -> bool {
        self.0
            .iter()
            .flat_map(|result| result.matches.iter())
            .any(|record| &record.recipient_id == recipient)
    }

    pub(crate) fn extend(&mut self, results: impl IntoIterator<Item = CriterionResult>) {
        self.0.extend(results);
    }
}

impl From<Vec<CriterionResult>> for ResultSet {
    fn from(value: Vec<CriterionResult>) -> Self {
        Self(value)
    }
}

/// Notification and decision state tracked per student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub sent: Stamp,
    #[serde(default, with = "crate::queries::stamp::optional")]
    pub viewed: Option<Stamp>,
    #[serde(default, with = "crate::queries::stamp::optional")]
    pub responded: Option<Stamp>,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub attended: bool,
}

impl ResponseRecord {
    pub fn sent_at(sent: Stamp) -> Self {
        Self {
            sent,
            viewed: None,
            responded: None,
            accepted: false,
            attended: false,
        }
    }
}

pub type ResponseTable = BTreeMap<RecipientId, ResponseRecord>;

/// Free-form event description attached to a query.
pub type EventDetails = serde_json::Map<String, Value>;

/// Stored query document as exchanged with the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDocument {
    pub id: QueryId,
    pub customer_id: String,
    #[serde(default)]
    pub event: EventDetails,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub results: ResultSet,
    #[serde(default)]
    pub responses: ResponseTable,
    pub last_modified: Stamp,
}

/// Document contents prior to the store assigning an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueryDocument {
    pub customer_id: String,
    pub event: EventDetails,
    pub criteria: Vec<Criterion>,
    pub results: ResultSet,
    pub responses: ResponseTable,
    pub last_modified: Stamp,
}

impl NewQueryDocument {
    pub fn into_document(self, id: QueryId) -> QueryDocument {
        QueryDocument {
            id,
            customer_id: self.customer_id,
            event: self.event,
            criteria: self.criteria,
            results: self.results,
            responses: self.responses,
            last_modified: self.last_modified,
        }
    }
}
