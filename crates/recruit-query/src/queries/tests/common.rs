use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tokio::sync::Notify;

use crate::queries::access::{Caller, Scope};
use crate::queries::domain::{
    Criterion, CriterionKey, MatchRecord, NewQueryDocument, QueryDocument, QueryId, RecipientId,
};
use crate::queries::identity::{Claims, TokenVerifier};
use crate::queries::repository::{QueryField, QueryFilter, QueryStore, RepositoryError};
use crate::queries::scoring::{Credential, ScoringError, ScoringSource};
use crate::queries::service::{Clock, QueryRequest, QueryService};
use crate::queries::stamp::Stamp;
use crate::queries::query_router;

pub(super) const SECRET: &str = "routing-secret-for-query-tests";

pub(super) fn criterion(university_id: &str, degree_id: &str, min_aggregate: f64) -> Criterion {
    Criterion {
        university_id: university_id.to_string(),
        degree_id: degree_id.to_string(),
        course_id: None,
        min_aggregate,
    }
}

/// Matches `s1` and `s2`.
pub(super) fn computing() -> Criterion {
    criterion("uni-1", "computing", 60.0)
}

/// Matches `s2` and `s3`.
pub(super) fn physics() -> Criterion {
    criterion("uni-1", "physics", 55.0)
}

/// Matches `s4` only.
pub(super) fn law() -> Criterion {
    criterion("uni-2", "law", 70.0)
}

pub(super) fn match_record(recipient: &str, aggregate_score: f64) -> MatchRecord {
    MatchRecord {
        recipient_id: RecipientId::from(recipient),
        aggregate_score,
        complete: true,
        timestamp: Stamp::parse("2011-12-31 09:30").expect("valid stamp"),
    }
}

pub(super) fn request(criteria: Vec<Criterion>) -> QueryRequest {
    let mut event = crate::queries::domain::EventDetails::new();
    event.insert("title".to_string(), Value::from("Graduate open day"));
    event.insert("location".to_string(), Value::from("Main hall"));

    QueryRequest {
        customer_id: "acme".to_string(),
        event,
        criteria,
    }
}

pub(super) fn caller(scopes: &[Scope]) -> Caller {
    Caller::new("auth0|caller", scopes.iter().copied(), Credential::bearer("token"))
}

pub(super) fn recruiter() -> Caller {
    caller(&[Scope::Recruiter])
}

pub(super) fn student() -> Caller {
    caller(&[Scope::Student])
}

pub(super) fn registree() -> Caller {
    caller(&[Scope::Registree])
}

pub(super) fn moment(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 1, 1, hour, minute, 0)
        .single()
        .expect("valid moment")
}

/// Clock that can be moved forward by tests.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Pauses scoring of one criterion until the test releases it.
struct ScoringGate {
    key: CriterionKey,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Scoring fake answering from a fixed table and recording each request.
#[derive(Default)]
pub(super) struct FakeScoring {
    answers: HashMap<CriterionKey, Vec<MatchRecord>>,
    calls: Mutex<Vec<CriterionKey>>,
    failing: bool,
    failing_keys: HashSet<CriterionKey>,
    delays: HashMap<CriterionKey, Duration>,
    gate: Option<ScoringGate>,
}

impl FakeScoring {
    pub(super) fn with_answer(mut self, criterion: &Criterion, recipients: &[(&str, f64)]) -> Self {
        let records = recipients
            .iter()
            .map(|(recipient, score)| match_record(recipient, *score))
            .collect();
        self.answers.insert(criterion.key(), records);
        self
    }

    pub(super) fn standard() -> Self {
        Self::default()
            .with_answer(&computing(), &[("s1", 71.5), ("s2", 64.0)])
            .with_answer(&physics(), &[("s2", 58.0), ("s3", 80.25)])
            .with_answer(&law(), &[("s4", 74.0)])
    }

    pub(super) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Fail only requests for `criterion`.
    pub(super) fn failing_on(mut self, criterion: &Criterion) -> Self {
        self.failing_keys.insert(criterion.key());
        self
    }

    /// Answer `criterion` only after `delay`.
    pub(super) fn with_delay(mut self, criterion: &Criterion, delay: Duration) -> Self {
        self.delays.insert(criterion.key(), delay);
        self
    }

    /// Hold `criterion` until `release` is notified. `entered` fires once the
    /// request is in flight.
    pub(super) fn gated_on(mut self, criterion: &Criterion) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.gate = Some(ScoringGate {
            key: criterion.key(),
            entered: entered.clone(),
            release: release.clone(),
        });
        (self, entered, release)
    }

    pub(super) fn calls(&self) -> Vec<CriterionKey> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

#[async_trait]
impl ScoringSource for FakeScoring {
    async fn matches(
        &self,
        criterion: &Criterion,
        _credential: &Credential,
    ) -> Result<Vec<MatchRecord>, ScoringError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(criterion.key());

        let key = criterion.key();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(gate) = self.gate.as_ref().filter(|gate| gate.key == key) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.failing || self.failing_keys.contains(&key) {
            return Err(ScoringError::Status {
                key: criterion.key(),
                status: 503,
            });
        }

        Ok(self
            .answers
            .get(&criterion.key())
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(super) struct MemoryStore {
    documents: Mutex<HashMap<QueryId, QueryDocument>>,
    sequence: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub(super) fn document(&self, id: &QueryId) -> QueryDocument {
        self.documents
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
            .expect("document stored")
    }

    pub(super) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl QueryStore for MemoryStore {
    fn insert(&self, document: NewQueryDocument) -> Result<QueryId, RepositoryError> {
        let id = QueryId(format!(
            "query-{:06}",
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        ));
        self.documents
            .lock()
            .expect("store mutex poisoned")
            .insert(id.clone(), document.into_document(id.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn find_by_id(&self, id: &QueryId) -> Result<Option<QueryDocument>, RepositoryError> {
        Ok(self
            .documents
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }

    fn find_by_filter(&self, filter: &QueryFilter) -> Result<Vec<QueryDocument>, RepositoryError> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        let mut documents: Vec<_> = guard
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect();
        documents.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(documents)
    }

    fn update_fields(&self, id: &QueryId, fields: Vec<QueryField>) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let document = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        for field in fields {
            field.apply(document);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl QueryStore for UnavailableStore {
    fn insert(&self, _document: NewQueryDocument) -> Result<QueryId, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_id(&self, _id: &QueryId) -> Result<Option<QueryDocument>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_filter(&self, _filter: &QueryFilter) -> Result<Vec<QueryDocument>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_fields(&self, _id: &QueryId, _fields: Vec<QueryField>) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct Harness {
    pub(super) service: QueryService<MemoryStore, FakeScoring>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) scoring: Arc<FakeScoring>,
    pub(super) clock: Arc<FixedClock>,
}

pub(super) fn harness_with(scoring: FakeScoring) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let scoring = Arc::new(scoring);
    let clock = Arc::new(FixedClock::new(moment(14, 0)));
    let service = QueryService::with_clock(store.clone(), scoring.clone(), clock.clone());

    Harness {
        service,
        store,
        scoring,
        clock,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(FakeScoring::standard())
}

pub(super) fn token(scopes: &str) -> String {
    let claims = Claims {
        sub: "auth0|http".to_string(),
        scope: scopes.to_string(),
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encodes")
}

pub(super) fn router_for(harness: &Harness) -> axum::Router {
    let service = QueryService::with_clock(
        harness.store.clone(),
        harness.scoring.clone(),
        harness.clock.clone(),
    );
    query_router(Arc::new(service), Arc::new(TokenVerifier::new(SECRET)))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
