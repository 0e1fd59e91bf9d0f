use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as DocumentMutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::access::{authorize, AccessError, Caller, Operation};
use super::domain::{
    Criterion, CriterionKey, CriterionResult, EventDetails, NewQueryDocument, QueryDocument,
    QueryId, RecipientId, ResponseRecord,
};
use super::merge::{MergeError, ResultMerger};
use super::metrics::QueryReport;
use super::projection::{for_recipient, merge_event_details, rsvp, RecipientView, RsvpView};
use super::repository::{QueryField, QueryFilter, QueryStore, RepositoryError};
use super::responses::{apply_status, init_responses, notify_new, renotify, StatusUpdate};
use super::scoring::{ScoringError, ScoringSource};
use super::stamp::Stamp;

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Recruiter submission creating a new query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub customer_id: String,
    #[serde(default)]
    pub event: EventDetails,
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedQuery {
    pub id: QueryId,
    pub notified: Vec<RecipientId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DryRunSummary {
    pub criteria: usize,
    pub recipients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandOutcome {
    pub query: QueryReport,
    pub notified: Vec<RecipientId>,
}

/// Service composing the store, the scoring gateway and the response tracker.
///
/// Every operation checks the caller's scope first and validates the document
/// identifier before the store is touched. Read-modify-write operations on a
/// document hold that document's lock for the whole sequence.
pub struct QueryService<S, G> {
    store: Arc<S>,
    merger: ResultMerger<G>,
    clock: Arc<dyn Clock>,
    locks: DocumentLocks,
}

/// Per-document async locks. An entry lives only while some caller holds or
/// waits on it.
#[derive(Default)]
struct DocumentLocks {
    entries: Mutex<HashMap<QueryId, LockEntry>>,
}

struct LockEntry {
    lock: Arc<DocumentMutex<()>>,
    users: usize,
}

impl DocumentLocks {
    fn entries(&self) -> MutexGuard<'_, HashMap<QueryId, LockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self, id: &QueryId) -> DocumentGuard<'_> {
        let lock = {
            let mut entries = self.entries();
            let entry = entries.entry(id.clone()).or_insert_with(|| LockEntry {
                lock: Arc::default(),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };

        // Registered before waiting so a cancelled caller still releases its slot.
        let mut guard = DocumentGuard {
            locks: self,
            id: id.clone(),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    id: QueryId,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());

        let mut entries = self.locks.entries();
        if let Some(entry) = entries.get_mut(&self.id) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                entries.remove(&self.id);
            }
        }
    }
}

impl<S, G> QueryService<S, G>
where
    S: QueryStore + 'static,
    G: ScoringSource + 'static,
{
    pub fn new(store: Arc<S>, source: Arc<G>) -> Self {
        Self::with_clock(store, source, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, source: Arc<G>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            merger: ResultMerger::new(source),
            clock,
            locks: DocumentLocks::default(),
        }
    }

    /// Evaluate the criteria, start tracking every match and persist the query.
    pub async fn create(
        &self,
        caller: &Caller,
        request: QueryRequest,
    ) -> Result<CreatedQuery, QueryServiceError> {
        authorize(caller, Operation::CreateQuery)?;

        let results = self
            .merger
            .evaluate_criteria(&request.criteria, caller.credential())
            .await
            .inspect_err(|error| warn!(%error, "query evaluation failed"))?;

        let now = self.clock.now();
        let (responses, notified) = init_responses(&results, now);
        let criteria = results.iter().map(CriterionResult::criterion).collect();

        let id = self.store.insert(NewQueryDocument {
            customer_id: request.customer_id,
            event: request.event,
            criteria,
            results,
            responses,
            last_modified: Stamp::at(now),
        })?;

        info!(query_id = %id, notified = notified.len(), "query created");
        Ok(CreatedQuery { id, notified })
    }

    /// Evaluate without persisting anything.
    pub async fn dry_run(
        &self,
        caller: &Caller,
        criteria: &[Criterion],
    ) -> Result<DryRunSummary, QueryServiceError> {
        authorize(caller, Operation::DryRun)?;

        let results = self
            .merger
            .evaluate_criteria(criteria, caller.credential())
            .await?;

        Ok(DryRunSummary {
            criteria: results.len(),
            recipients: results.recipients().len(),
        })
    }

    pub async fn get(&self, caller: &Caller, raw_id: &str) -> Result<QueryReport, QueryServiceError> {
        authorize(caller, Operation::ReadQuery)?;
        let id = parse_id(raw_id)?;

        Ok(QueryReport::new(self.load(&id)?))
    }

    /// Add criteria to a stored query without losing earlier results.
    pub async fn expand(
        &self,
        caller: &Caller,
        raw_id: &str,
        criteria: Vec<Criterion>,
    ) -> Result<ExpandOutcome, QueryServiceError> {
        authorize(caller, Operation::ExpandQuery)?;
        let id = parse_id(raw_id)?;

        let _guard = self.locks.acquire(&id).await;
        let mut document = self.load(&id)?;

        let expansion = self
            .merger
            .expand_criteria(&criteria, &document.results, caller.credential())
            .await
            .inspect_err(|error| warn!(query_id = %id, %error, "query expansion rejected"))?;

        if expansion.added.is_empty() {
            return Ok(ExpandOutcome {
                query: QueryReport::new(document),
                notified: Vec::new(),
            });
        }

        let now = self.clock.now();
        let (responses, notified) = notify_new(&document.responses, &expansion.added, now);
        document
            .criteria
            .extend(expansion.added.iter().map(CriterionResult::criterion));
        document.results = expansion.results;
        document.responses = responses;
        document.last_modified = Stamp::at(now);

        self.store.update_fields(
            &id,
            vec![
                QueryField::Criteria(document.criteria.clone()),
                QueryField::Results(document.results.clone()),
                QueryField::Responses(document.responses.clone()),
                QueryField::LastModified(document.last_modified.clone()),
            ],
        )?;

        info!(
            query_id = %id,
            added = expansion.added.len(),
            notified = notified.len(),
            "query expanded"
        );
        Ok(ExpandOutcome {
            query: QueryReport::new(document),
            notified,
        })
    }

    pub async fn update_event(
        &self,
        caller: &Caller,
        raw_id: &str,
        patch: EventDetails,
    ) -> Result<QueryReport, QueryServiceError> {
        authorize(caller, Operation::UpdateEvent)?;
        let id = parse_id(raw_id)?;

        let _guard = self.locks.acquire(&id).await;
        let mut document = self.load(&id)?;

        let event = merge_event_details(&patch, &document.event);
        self.store
            .update_fields(&id, vec![QueryField::Event(event.clone())])?;
        document.event = event;

        Ok(QueryReport::new(document))
    }

    pub async fn update_status(
        &self,
        caller: &Caller,
        raw_id: &str,
        update: StatusUpdate,
    ) -> Result<ResponseRecord, QueryServiceError> {
        authorize(caller, Operation::UpdateStatus)?;
        let id = parse_id(raw_id)?;

        self.transition(&id, update).await
    }

    pub async fn record_attendance(
        &self,
        caller: &Caller,
        raw_id: &str,
        recipient: RecipientId,
    ) -> Result<ResponseRecord, QueryServiceError> {
        authorize(caller, Operation::RecordAttendance)?;
        let id = parse_id(raw_id)?;

        let update = StatusUpdate {
            recipient_id: recipient,
            attended: Some(true),
            ..StatusUpdate::default()
        };
        self.transition(&id, update).await
    }

    pub async fn rsvp(&self, caller: &Caller, raw_id: &str) -> Result<RsvpView, QueryServiceError> {
        authorize(caller, Operation::ReadRsvp)?;
        let id = parse_id(raw_id)?;

        Ok(rsvp(&self.load(&id)?))
    }

    /// Re-send the invitation to every student who has not answered yet.
    pub async fn notify(
        &self,
        caller: &Caller,
        raw_id: &str,
    ) -> Result<Vec<RecipientId>, QueryServiceError> {
        authorize(caller, Operation::NotifyStudents)?;
        let id = parse_id(raw_id)?;

        let _guard = self.locks.acquire(&id).await;
        let document = self.load(&id)?;

        let (responses, notified) = renotify(&document.responses, self.clock.now());
        self.store
            .update_fields(&id, vec![QueryField::Responses(responses)])?;

        info!(query_id = %id, notified = notified.len(), "students re-notified");
        Ok(notified)
    }

    pub async fn customer_queries(
        &self,
        caller: &Caller,
        customer_id: &str,
    ) -> Result<Vec<QueryReport>, QueryServiceError> {
        authorize(caller, Operation::CustomerQueries)?;

        let documents = self
            .store
            .find_by_filter(&QueryFilter::Customer(customer_id.to_string()))?;
        Ok(documents.into_iter().map(QueryReport::new).collect())
    }

    pub async fn student_queries(
        &self,
        caller: &Caller,
        recipient: &RecipientId,
    ) -> Result<Vec<RecipientView>, QueryServiceError> {
        authorize(caller, Operation::StudentQueries)?;

        let documents = self
            .store
            .find_by_filter(&QueryFilter::Recipient(recipient.clone()))?;
        Ok(for_recipient(recipient, &documents))
    }

    async fn transition(
        &self,
        id: &QueryId,
        update: StatusUpdate,
    ) -> Result<ResponseRecord, QueryServiceError> {
        let _guard = self.locks.acquire(id).await;
        let document = self.load(id)?;

        // Only students matched by the query are tracked.
        let record = document
            .responses
            .get(&update.recipient_id)
            .cloned()
            .ok_or(QueryServiceError::NotFound)?;
        let record = apply_status(&update, record, self.clock.now());

        self.store.update_fields(
            id,
            vec![QueryField::Response(
                update.recipient_id.clone(),
                record.clone(),
            )],
        )?;
        Ok(record)
    }

    /// Number of documents with a live lock entry.
    pub fn locked_documents(&self) -> usize {
        self.locks.len()
    }

    fn load(&self, id: &QueryId) -> Result<QueryDocument, QueryServiceError> {
        self.store
            .find_by_id(id)?
            .ok_or(QueryServiceError::NotFound)
    }
}

fn parse_id(raw: &str) -> Result<QueryId, QueryServiceError> {
    QueryId::parse(raw).ok_or(QueryServiceError::NotFound)
}

/// Error raised by the query service.
#[derive(Debug, thiserror::Error)]
pub enum QueryServiceError {
    #[error("no matching query found")]
    NotFound,
    #[error("criterion {0} was already evaluated with a different minimum aggregate")]
    ConflictingCriterion(CriterionKey),
    #[error(transparent)]
    Upstream(ScoringError),
    #[error(transparent)]
    Unauthorized(#[from] AccessError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<MergeError> for QueryServiceError {
    fn from(value: MergeError) -> Self {
        match value {
            MergeError::ConflictingCriterion(key) => Self::ConflictingCriterion(key),
            MergeError::Upstream(error) => Self::Upstream(error),
        }
    }
}

impl From<RepositoryError> for QueryServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}
