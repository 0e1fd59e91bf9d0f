//! Recruiter queries over academic records.
//!
//! A query stores the criteria a recruiter submitted, the students each
//! criterion matched, and one response record per matched student. Queries can
//! be expanded later with more criteria; earlier results are never re-scored
//! and students already tracked are never notified twice.

pub mod access;
pub mod domain;
pub mod identity;
pub mod merge;
pub mod metrics;
pub mod projection;
pub mod repository;
pub mod responses;
pub mod router;
pub mod scoring;
pub mod service;
pub mod stamp;

#[cfg(test)]
mod tests;

pub use access::{authorize, AccessError, Caller, Operation, Scope};
pub use domain::{
    Criterion, CriterionKey, CriterionResult, EventDetails, MatchRecord, NewQueryDocument,
    QueryDocument, QueryId, RecipientId, ResponseRecord, ResponseTable, ResultSet,
};
pub use identity::{Claims, IdentityError, TokenVerifier};
pub use merge::{Expansion, MergeError, ResultMerger};
pub use metrics::{compute_ratios, Metrics, QueryReport};
pub use projection::{RecipientView, RsvpView};
pub use repository::{QueryField, QueryFilter, QueryStore, RepositoryError};
pub use responses::StatusUpdate;
pub use router::query_router;
pub use scoring::{Credential, HttpScoringSource, ScoringError, ScoringSource};
pub use service::{
    Clock, CreatedQuery, DryRunSummary, ExpandOutcome, QueryRequest, QueryService,
    QueryServiceError, SystemClock,
};
pub use stamp::Stamp;
