//! Per-student response tracking.
//!
//! A record only ever moves forward: `viewed` and `responded` are stamped once
//! and never cleared. The `accepted` decision is the exception and always takes
//! the latest supplied value, without re-stamping `responded`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CriterionResult, RecipientId, ResponseRecord, ResponseTable, ResultSet};
use super::stamp::Stamp;

/// Status change submitted by a student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "student_address")]
    pub recipient_id: RecipientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attended: Option<bool>,
}

/// Fresh records for every student in `results`, plus the students to notify.
pub fn init_responses(
    results: &ResultSet,
    now: DateTime<Utc>,
) -> (ResponseTable, Vec<RecipientId>) {
    notify_new(&ResponseTable::new(), results.as_slice(), now)
}

/// Add records for students in `added` that `existing` does not track yet.
pub fn notify_new(
    existing: &ResponseTable,
    added: &[CriterionResult],
    now: DateTime<Utc>,
) -> (ResponseTable, Vec<RecipientId>) {
    let sent = Stamp::at(now);
    let mut table = existing.clone();
    let mut notified = Vec::new();

    for record in added.iter().flat_map(|result| result.matches.iter()) {
        if table.contains_key(&record.recipient_id) {
            continue;
        }
        table.insert(
            record.recipient_id.clone(),
            ResponseRecord::sent_at(sent.clone()),
        );
        notified.push(record.recipient_id.clone());
    }

    (table, notified)
}

pub fn apply_status(
    update: &StatusUpdate,
    mut record: ResponseRecord,
    now: DateTime<Utc>,
) -> ResponseRecord {
    if update.viewed == Some(true) && record.viewed.is_none() {
        record.viewed = Some(Stamp::at(now));
    }

    if let Some(accepted) = update.accepted {
        if record.responded.is_none() {
            record.responded = Some(Stamp::at(now));
        }
        record.accepted = accepted;
    }

    if let Some(attended) = update.attended {
        record.attended = attended;
    }

    record
}

/// Re-stamp `sent` for every student who has not responded yet.
pub fn renotify(table: &ResponseTable, now: DateTime<Utc>) -> (ResponseTable, Vec<RecipientId>) {
    let sent = Stamp::at(now);
    let mut table = table.clone();
    let mut notified = Vec::new();

    for (recipient, record) in table.iter_mut() {
        if record.responded.is_some() {
            continue;
        }
        record.sent = sent.clone();
        notified.push(recipient.clone());
    }

    (table, notified)
}
