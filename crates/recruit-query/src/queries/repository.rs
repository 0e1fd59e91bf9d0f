use super::domain::{
    Criterion, EventDetails, NewQueryDocument, QueryDocument, QueryId, RecipientId,
    ResponseRecord, ResponseTable, ResultSet,
};
use super::stamp::Stamp;

/// Targeted field update; stores write only the named paths.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryField {
    Criteria(Vec<Criterion>),
    Results(ResultSet),
    Responses(ResponseTable),
    Response(RecipientId, ResponseRecord),
    Event(EventDetails),
    LastModified(Stamp),
}

impl QueryField {
    /// Apply the update to a detached copy, for stores that keep whole documents.
    pub fn apply(self, document: &mut QueryDocument) {
        match self {
            QueryField::Criteria(criteria) => document.criteria = criteria,
            QueryField::Results(results) => document.results = results,
            QueryField::Responses(responses) => document.responses = responses,
            QueryField::Response(recipient, record) => {
                document.responses.insert(recipient, record);
            }
            QueryField::Event(event) => document.event = event,
            QueryField::LastModified(stamp) => document.last_modified = stamp,
        }
    }
}

/// Selection used by multi-document reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    Customer(String),
    Recipient(RecipientId),
}

impl QueryFilter {
    pub fn matches(&self, document: &QueryDocument) -> bool {
        match self {
            QueryFilter::Customer(customer_id) => &document.customer_id == customer_id,
            QueryFilter::Recipient(recipient) => document.results.contains_recipient(recipient),
        }
    }
}

/// Storage abstraction over query documents.
pub trait QueryStore: Send + Sync {
    fn insert(&self, document: NewQueryDocument) -> Result<QueryId, RepositoryError>;
    fn find_by_id(&self, id: &QueryId) -> Result<Option<QueryDocument>, RepositoryError>;
    fn find_by_filter(&self, filter: &QueryFilter) -> Result<Vec<QueryDocument>, RepositoryError>;
    fn update_fields(&self, id: &QueryId, fields: Vec<QueryField>) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
