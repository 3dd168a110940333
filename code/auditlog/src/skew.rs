/// Clock skew estimation, and the finalization pass that runs it.
///
/// Nodes and schedulers log by their own clocks, and nothing in the trace synchronizes them.  What
/// the trace does have is paired timestamps that bracket an observation on the other machine, and
/// assuming the one-way delay is the same in both directions the midpoint of the bracket is the
/// moment of the observation:
///
/// - A round trip is bracketed by the scheduler: it sends at `launch`, the node logs `remote` by its
///   clock, the scheduler logs `complete`.  skew = remote - (midpoint(launch, complete) - hop/2).
///
/// - A get-task is bracketed by the node: it asks at `get_task`, the scheduler logs the assignment
///   of the task, the node logs `get_task_complete`.
///   skew = (midpoint(get_task, get_task_complete) - hop/2) - scheduler_assigned.
///
/// `hop` is the processing time at the far end of the bracket, which shifts the observation
/// earlier.  Skew is the number of milliseconds by which the node's clock is ahead; subtract it
/// from a node time to get scheduler time.
///
/// Per task the get-task estimate is preferred, as it is specific to the task; otherwise the round
/// trip to the task's node is used.  Estimates are never averaged.
use crate::configs::AnalysisConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::registry::TraceRegistry;
use crate::request::{Request, RoundTrip};
use crate::task::{SkewEstimate, SkewSource, Task};

use log::debug;
use rustutils::Timestamp;
use std::fmt;
use ustr::Ustr;

#[derive(Debug, Clone, PartialEq)]
pub enum SkewUnavailable {
    NoNodeAddress,
    NoEvidence(Ustr),
    IncompleteEvidence(Ustr),
}

impl fmt::Display for SkewUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkewUnavailable::NoNodeAddress => write!(f, "the task's node is not known"),
            SkewUnavailable::NoEvidence(addr) => {
                write!(f, "no round trip or get-task for node {addr}")
            }
            SkewUnavailable::IncompleteEvidence(addr) => {
                write!(f, "timing evidence for node {addr} is incomplete")
            }
        }
    }
}

fn midpoint(a: Timestamp, b: Timestamp) -> f64 {
    (a as f64 + b as f64) / 2.0
}

pub fn round_trip_skew(rt: &RoundTrip, hop_processing_ms: f64) -> Option<f64> {
    if !rt.is_complete() {
        return None;
    }
    let sent = midpoint(rt.launch?, rt.complete?) - hop_processing_ms / 2.0;
    Some(rt.remote? as f64 - sent)
}

pub fn get_task_skew(
    get_task: Timestamp,
    get_task_complete: Timestamp,
    scheduler_assigned: Timestamp,
    hop_processing_ms: f64,
) -> f64 {
    (midpoint(get_task, get_task_complete) - hop_processing_ms / 2.0) - scheduler_assigned as f64
}

/// Estimate the skew of the node the task ran on, from the evidence in its request.

pub fn estimate_task_skew(
    request: &Request,
    task: &Task,
    hop_processing_ms: f64,
) -> Result<SkewEstimate, SkewUnavailable> {
    let Some(addr) = task.node_address else {
        return Err(SkewUnavailable::NoNodeAddress);
    };
    let get_task = (
        request.get_task.get(&addr),
        request.get_task_complete.get(&addr),
        task.scheduler_assigned,
    );
    if let (Some(gt), Some(gtc), Some(assigned)) = get_task {
        return Ok(SkewEstimate {
            millis: get_task_skew(*gt, *gtc, assigned, hop_processing_ms),
            source: SkewSource::GetTask,
        });
    }
    match request.round_trips.get(&addr) {
        Some(rt) => match round_trip_skew(rt, hop_processing_ms) {
            Some(millis) => Ok(SkewEstimate {
                millis,
                source: SkewSource::RoundTrip,
            }),
            None => Err(SkewUnavailable::IncompleteEvidence(addr)),
        },
        None => {
            if get_task.0.is_some() || get_task.1.is_some() {
                Err(SkewUnavailable::IncompleteEvidence(addr))
            } else {
                Err(SkewUnavailable::NoEvidence(addr))
            }
        }
    }
}

/// The finalization pass, run once after all input has been ingested:
///
/// - a task the node fetched with a get-task has its node-requested time filled in from the
///   get-task time, if no event set it directly
/// - every task is given a skew estimate, if there is evidence for one
///
/// Calling it again does nothing.

pub fn finalize(registry: &mut TraceRegistry, config: &AnalysisConfig, diags: &mut Diagnostics) {
    if registry.finalized {
        debug!("Registry already finalized");
        return;
    }
    let mut finds = vec![];
    for request in registry.requests_mut() {
        let mut backfills = vec![];
        for task in request.tasks.values() {
            if let (Some(addr), None) = (task.node_address, task.node_requested) {
                if let Some(t) = request.get_task.get(&addr) {
                    backfills.push((task.id.task_id, *t));
                }
            }
        }
        for (task_id, t) in backfills {
            request.task_mut(task_id).node_requested = Some(t);
        }

        let estimates = {
            let r: &Request = request;
            r.tasks
                .values()
                .map(|task| {
                    (
                        task.id.task_id,
                        estimate_task_skew(r, task, config.hop_processing_ms),
                    )
                })
                .collect::<Vec<_>>()
        };
        for (task_id, estimate) in estimates {
            match estimate {
                Ok(skew) => request.task_mut(task_id).clock_skew = Some(skew),
                Err(reason) => finds.push(Diagnostic::SkewEstimationUnavailable {
                    request: request.id,
                    task: task_id,
                    reason,
                }),
            }
        }
    }

    // The registry is a hash map; report in a stable order.
    finds.sort_by(|a, b| match (a, b) {
        (
            Diagnostic::SkewEstimationUnavailable {
                request: ra,
                task: ta,
                ..
            },
            Diagnostic::SkewEstimationUnavailable {
                request: rb,
                task: tb,
                ..
            },
        ) => (ra, ta).cmp(&(rb, tb)),
        _ => std::cmp::Ordering::Equal,
    });
    for d in finds {
        diags.record(d);
    }
    registry.finalized = true;
}

#[cfg(test)]
fn make_request() -> Request {
    Request::new(Ustr::from("r1"))
}

#[test]
fn test_round_trip_skew() {
    let rt = RoundTrip {
        launch: Some(1002),
        remote: Some(1013),
        complete: Some(1004),
    };
    assert!(round_trip_skew(&rt, 0.0) == Some(10.0));
    assert!(round_trip_skew(&rt, 2.0) == Some(11.0));
    let rt = RoundTrip {
        launch: Some(1002),
        remote: Some(999),
        complete: Some(1004),
    };
    assert!(round_trip_skew(&rt, 0.0) == Some(-4.0));
    assert!(round_trip_skew(&RoundTrip::default(), 0.0).is_none());
}

#[test]
fn test_get_task_skew() {
    assert!(get_task_skew(5030, 5032, 5011, 0.0) == 20.0);
    assert!(get_task_skew(4000, 4002, 4001, 0.0) == 0.0);
    assert!(get_task_skew(4000, 4002, 4001, 2.0) == -1.0);
}

#[test]
fn test_estimate_task_skew() {
    use crate::configs::DuplicatePolicy;

    let p = DuplicatePolicy::Overwrite;
    let n1 = Ustr::from("n1");
    let mut r = make_request();
    let mut t = r.task_mut(Ustr::from("t1")).clone();
    assert!(estimate_task_skew(&r, &t, 0.0) == Err(SkewUnavailable::NoNodeAddress));
    t.note_node_address(n1, p);
    assert!(estimate_task_skew(&r, &t, 0.0) == Err(SkewUnavailable::NoEvidence(n1)));
    r.set_round_trip_launch(n1, 100, p);
    assert!(estimate_task_skew(&r, &t, 0.0) == Err(SkewUnavailable::IncompleteEvidence(n1)));
    r.set_round_trip_remote(n1, 150, p);
    r.set_round_trip_complete(n1, 110, p);
    let s = estimate_task_skew(&r, &t, 0.0).unwrap();
    assert!(s.millis == 45.0 && s.source == SkewSource::RoundTrip);

    // get-task evidence wins once it is complete
    r.set_get_task(n1, 200, p);
    t.set_scheduler_assigned(150, p);
    assert!(estimate_task_skew(&r, &t, 0.0).unwrap().source == SkewSource::RoundTrip);
    r.set_get_task_complete(n1, 210, p);
    let s = estimate_task_skew(&r, &t, 0.0).unwrap();
    assert!(s.millis == 55.0 && s.source == SkewSource::GetTask);
}

#[test]
fn test_finalize() {
    use crate::configs::DuplicatePolicy;
    use crate::diagnostics::DiagnosticKind;

    let p = DuplicatePolicy::Overwrite;
    let n1 = Ustr::from("n1");
    let mut reg = TraceRegistry::new();
    let r = reg.request_mut(Ustr::from("r1"));
    r.set_get_task(n1, 200, p);
    r.set_get_task_complete(n1, 210, p);
    let t = r.task_mut(Ustr::from("a"));
    t.note_node_address(n1, p);
    t.set_scheduler_assigned(150, p);
    r.task_mut(Ustr::from("b"));

    let config = AnalysisConfig::default();
    let mut diags = Diagnostics::new();
    finalize(&mut reg, &config, &mut diags);
    assert!(reg.is_finalized());
    let a = reg.request("r1").unwrap().tasks[&Ustr::from("a")].clone();
    assert!(a.node_requested == Some(200));
    assert!(a.clock_skew.unwrap().millis == 55.0);
    assert!(diags.len() == 1);
    assert!(diags.count(DiagnosticKind::SkewEstimationUnavailable) == 1);

    // A second pass changes nothing and reports nothing.
    finalize(&mut reg, &config, &mut diags);
    assert!(diags.len() == 1);
    assert!(reg.request("r1").unwrap().tasks[&Ustr::from("a")] == a);
}
