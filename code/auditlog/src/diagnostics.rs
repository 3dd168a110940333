/// Diagnostics are the non-fatal findings of ingestion, finalization and extraction.  None of them
/// stops the analysis; they are collected so that the caller can count and report them, and each
/// is logged at the moment it is recorded.
///
/// A reference to an entity that has not been created yet is not a diagnostic at all: the entity
/// is created on the spot, because the input files can be read in any order.
use crate::configs::DuplicatePolicy;
use crate::skew::SkewUnavailable;

use log::{debug, warn};
use rustutils::Timestamp;
use std::fmt;
use thiserror::Error;
use ustr::Ustr;

/// The settable fields of tasks and requests, for reporting duplicate assignments.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Arrival,
    NodeAddress,
    SchedulerAssigned,
    NodeRequested,
    NodeStarted,
    Completed,
    PreviousTask,
    RoundTripLaunch,
    RoundTripRemote,
    RoundTripComplete,
    GetTask,
    GetTaskComplete,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Arrival => "arrival",
            Field::NodeAddress => "node address",
            Field::SchedulerAssigned => "scheduler-assigned time",
            Field::NodeRequested => "node-requested time",
            Field::NodeStarted => "node-started time",
            Field::Completed => "completion time",
            Field::PreviousTask => "previous task",
            Field::RoundTripLaunch => "round-trip launch time",
            Field::RoundTripRemote => "round-trip remote time",
            Field::RoundTripComplete => "round-trip completion time",
            Field::GetTask => "get-task time",
            Field::GetTaskComplete => "get-task completion time",
        })
    }
}

/// A second write to a set-once field.  Returned by the setters; the caller knows which entity it
/// concerns and turns it into a Diagnostic.

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub field: Field,
    pub old: String,
    pub new: String,
}

/// Where in the input a line-level diagnostic comes from.  `line` is 1-based.

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub file: Option<String>,
    pub line: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            Some(ref file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("{location}: malformed input: {reason}")]
    MalformedInput { location: Location, reason: String },

    #[error("{location}: unknown event kind '{kind}'")]
    UnknownEventKind { location: Location, kind: String },

    #[error("{entity}: {field} assigned twice ({old}, then {new}); {policy}")]
    DuplicateAssignment {
        entity: String,
        field: Field,
        old: String,
        new: String,
        policy: DuplicatePolicy,
    },

    #[error("request {request} task {task}: clock skew unavailable: {reason}")]
    SkewEstimationUnavailable {
        request: Ustr,
        task: Ustr,
        reason: SkewUnavailable,
    },

    #[error("request {request} task {task}: adjusted completion {adjusted} precedes arrival {arrival}, the skew estimate is inaccurate")]
    SkewBeforeArrival {
        request: Ustr,
        task: Ustr,
        adjusted: f64,
        arrival: Timestamp,
    },

    #[error("request {request} task {task}: assigned at {assigned} but requested by the node at {requested}, suggesting clock skew")]
    SuspectedSkew {
        request: Ustr,
        task: Ustr,
        assigned: Timestamp,
        requested: Timestamp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MalformedInput,
    UnknownEventKind,
    DuplicateAssignment,
    SkewEstimationUnavailable,
    SkewBeforeArrival,
    SuspectedSkew,
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::MalformedInput { .. } => DiagnosticKind::MalformedInput,
            Diagnostic::UnknownEventKind { .. } => DiagnosticKind::UnknownEventKind,
            Diagnostic::DuplicateAssignment { .. } => DiagnosticKind::DuplicateAssignment,
            Diagnostic::SkewEstimationUnavailable { .. } => {
                DiagnosticKind::SkewEstimationUnavailable
            }
            Diagnostic::SkewBeforeArrival { .. } => DiagnosticKind::SkewBeforeArrival,
            Diagnostic::SuspectedSkew { .. } => DiagnosticKind::SuspectedSkew,
        }
    }
}

/// An append-only bag of diagnostics, in the order they were recorded.

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics { entries: vec![] }
    }

    pub fn record(&mut self, d: Diagnostic) {
        match d.kind() {
            DiagnosticKind::SkewEstimationUnavailable | DiagnosticKind::SuspectedSkew => {
                debug!("{d}")
            }
            _ => warn!("{d}"),
        }
        self.entries.push(d);
    }

    /// Record a duplicate assignment, if there was one.  `entity` is only evaluated if needed.

    pub fn conflict<F>(&mut self, c: Option<Conflict>, policy: DuplicatePolicy, entity: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(Conflict { field, old, new }) = c {
            self.record(Diagnostic::DuplicateAssignment {
                entity: entity(),
                field,
                old,
                new,
                policy,
            });
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries)
    }
}

#[test]
fn test_diagnostics_count() {
    let mut diags = Diagnostics::new();
    let location = Location {
        file: Some("a.log".to_string()),
        line: 3,
    };
    diags.record(Diagnostic::UnknownEventKind {
        location: location.clone(),
        kind: "frob".to_string(),
    });
    diags.conflict(None, DuplicatePolicy::Overwrite, || panic!("Not needed"));
    diags.conflict(
        Some(Conflict {
            field: Field::Completed,
            old: "1".to_string(),
            new: "2".to_string(),
        }),
        DuplicatePolicy::KeepFirst,
        || "request r task t".to_string(),
    );
    assert!(diags.len() == 2);
    assert!(diags.count(DiagnosticKind::UnknownEventKind) == 1);
    assert!(diags.count(DiagnosticKind::DuplicateAssignment) == 1);
    assert!(diags.count(DiagnosticKind::MalformedInput) == 0);
    assert!(diags.entries()[0].to_string() == "a.log:3: unknown event kind 'frob'");
    assert!(
        diags.entries()[1].to_string()
            == "request r task t: completion time assigned twice (1, then 2); first value kept"
    );
}
