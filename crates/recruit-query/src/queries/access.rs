use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::scoring::Credential;

/// Capabilities a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Student,
    Recruiter,
    Registree,
}

impl Scope {
    pub const fn label(self) -> &'static str {
        match self {
            Scope::Student => "student",
            Scope::Recruiter => "recruiter",
            Scope::Registree => "registree",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Scope::Student),
            "recruiter" => Some(Scope::Recruiter),
            "registree" => Some(Scope::Registree),
            _ => None,
        }
    }
}

/// Authenticated caller as seen by the service.
#[derive(Debug, Clone)]
pub struct Caller {
    pub subject: String,
    pub scopes: BTreeSet<Scope>,
    credential: Credential,
}

impl Caller {
    pub fn new(
        subject: impl Into<String>,
        scopes: impl IntoIterator<Item = Scope>,
        credential: Credential,
    ) -> Self {
        Self {
            subject: subject.into(),
            scopes: scopes.into_iter().collect(),
            credential,
        }
    }

    pub fn has_scope(&self, required: &[Scope]) -> bool {
        required.iter().any(|scope| self.scopes.contains(scope))
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Operations exposed by the query service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateQuery,
    DryRun,
    ReadQuery,
    ExpandQuery,
    UpdateEvent,
    UpdateStatus,
    RecordAttendance,
    StudentQueries,
    ReadRsvp,
    NotifyStudents,
    CustomerQueries,
}

impl Operation {
    pub const fn required_scopes(self) -> &'static [Scope] {
        match self {
            Operation::CreateQuery
            | Operation::DryRun
            | Operation::ReadQuery
            | Operation::ExpandQuery
            | Operation::UpdateEvent => &[Scope::Recruiter],
            Operation::UpdateStatus | Operation::RecordAttendance | Operation::StudentQueries => {
                &[Scope::Student]
            }
            Operation::ReadRsvp | Operation::NotifyStudents => &[Scope::Registree],
            Operation::CustomerQueries => &[Scope::Recruiter, Scope::Registree],
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Operation::CreateQuery => "create query",
            Operation::DryRun => "dry run",
            Operation::ReadQuery => "read query",
            Operation::ExpandQuery => "expand query",
            Operation::UpdateEvent => "update event",
            Operation::UpdateStatus => "update status",
            Operation::RecordAttendance => "record attendance",
            Operation::StudentQueries => "list student queries",
            Operation::ReadRsvp => "read rsvp",
            Operation::NotifyStudents => "notify students",
            Operation::CustomerQueries => "list customer queries",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{operation} requires scope {required}")]
pub struct AccessError {
    pub operation: &'static str,
    pub required: String,
}

pub fn authorize(caller: &Caller, operation: Operation) -> Result<(), AccessError> {
    let required = operation.required_scopes();
    if caller.has_scope(required) {
        return Ok(());
    }

    Err(AccessError {
        operation: operation.label(),
        required: required
            .iter()
            .map(|scope| scope.label())
            .collect::<Vec<_>>()
            .join(" or "),
    })
}
