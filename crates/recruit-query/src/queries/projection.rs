use serde::Serialize;
use serde_json::json;

use super::domain::{EventDetails, QueryDocument, QueryId, RecipientId, ResponseRecord};
use super::stamp::Stamp;

/// What a student sees for one query they were matched by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientView {
    pub query_id: QueryId,
    pub customer_id: String,
    pub event: EventDetails,
    pub response: ResponseRecord,
    pub timestamp: Stamp,
    /// Scannable check-in token.
    #[serde(rename = "qr")]
    pub confirmation: String,
}

/// Registree facing summary of the decisions collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RsvpView {
    pub query_id: QueryId,
    pub accepted: Vec<RecipientId>,
    pub declined: Vec<RecipientId>,
    pub pending: Vec<RecipientId>,
}

pub fn confirmation_payload(query_id: &QueryId, recipient: &RecipientId) -> String {
    json!({
        "query_id": query_id.as_str(),
        "student_address": recipient.as_str(),
    })
    .to_string()
}

pub fn for_recipient<'a, I>(recipient: &RecipientId, documents: I) -> Vec<RecipientView>
where
    I: IntoIterator<Item = &'a QueryDocument>,
{
    documents
        .into_iter()
        .filter(|document| document.results.contains_recipient(recipient))
        .filter_map(|document| {
            let response = document.responses.get(recipient)?.clone();
            Some(RecipientView {
                query_id: document.id.clone(),
                customer_id: document.customer_id.clone(),
                event: document.event.clone(),
                response,
                timestamp: document.last_modified.clone(),
                confirmation: confirmation_payload(&document.id, recipient),
            })
        })
        .collect()
}

/// Shallow merge: keys in `patch` replace those in `existing`, nothing is removed.
pub fn merge_event_details(patch: &EventDetails, existing: &EventDetails) -> EventDetails {
    let mut merged = existing.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub fn rsvp(document: &QueryDocument) -> RsvpView {
    let mut view = RsvpView {
        query_id: document.id.clone(),
        ..RsvpView::default()
    };

    for (recipient, record) in &document.responses {
        match (record.responded.is_some(), record.accepted) {
            (true, true) => view.accepted.push(recipient.clone()),
            (true, false) => view.declined.push(recipient.clone()),
            (false, _) => view.pending.push(recipient.clone()),
        }
    }

    view
}
