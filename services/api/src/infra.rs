use metrics_exporter_prometheus::PrometheusHandle;
use recruit_query::queries::{
    NewQueryDocument, QueryDocument, QueryField, QueryFilter, QueryId, QueryStore,
    RepositoryError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local query store used by the standalone service and the CLI.
#[derive(Default, Clone)]
pub(crate) struct InMemoryQueryStore {
    documents: Arc<Mutex<HashMap<QueryId, QueryDocument>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryQueryStore {
    fn documents(&self) -> MutexGuard<'_, HashMap<QueryId, QueryDocument>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryStore for InMemoryQueryStore {
    fn insert(&self, document: NewQueryDocument) -> Result<QueryId, RepositoryError> {
        let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = QueryId(format!("query-{next:06}"));
        self.documents()
            .insert(id.clone(), document.into_document(id.clone()));
        Ok(id)
    }

    fn find_by_id(&self, id: &QueryId) -> Result<Option<QueryDocument>, RepositoryError> {
        Ok(self.documents().get(id).cloned())
    }

    fn find_by_filter(&self, filter: &QueryFilter) -> Result<Vec<QueryDocument>, RepositoryError> {
        let mut matching: Vec<_> = self
            .documents()
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect();
        matching.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(matching)
    }

    fn update_fields(&self, id: &QueryId, fields: Vec<QueryField>) -> Result<(), RepositoryError> {
        let mut guard = self.documents();
        let document = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        for field in fields {
            field.apply(document);
        }
        Ok(())
    }
}
