/// A request arrives at a scheduler and is fanned out into a known number of tasks.  Besides the
/// tasks, the request owns the per-node timing evidence used to estimate clock skew: the round trips
/// of the probes or reservations the scheduler sent to each node, and the times at which each node
/// asked for and received a task.
///
/// Maps are ordered so that iteration, and hence anything derived from it, is deterministic.
use crate::configs::DuplicatePolicy;
use crate::diagnostics::{Conflict, Field};
use crate::task::{Task, TaskRef};

use log::trace;
use rustutils::{TimeDelta, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use ustr::Ustr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub time: Timestamp,
    pub expected_tasks: usize,
    pub scheduler: Ustr,
}

impl fmt::Display for Arrival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} tasks from {})",
            self.time, self.expected_tasks, self.scheduler
        )
    }
}

/// A scheduler-initiated exchange with a node: the scheduler sends at `launch`, the node observes
/// the message at `remote` by its own clock, and the scheduler sees the reply at `complete`.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundTrip {
    pub launch: Option<Timestamp>,
    pub remote: Option<Timestamp>,
    pub complete: Option<Timestamp>,
}

impl RoundTrip {
    pub fn is_complete(&self) -> bool {
        self.launch.is_some() && self.remote.is_some() && self.complete.is_some()
    }

    /// Network round trip in the scheduler's frame; skew does not enter into it.

    pub fn round_trip_time(&self) -> Option<TimeDelta> {
        if !self.is_complete() {
            return None;
        }
        Some(self.complete? - self.launch?)
    }
}

/// Why a response time can't be computed.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Incomplete {
    NoArrival,
    // Fewer tasks have been seen than the arrival announced.
    MissingTasks { expected: usize, seen: usize },
    MissingCompletion(Ustr),
    UnknownSkew(Ustr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTime {
    pub millis: f64,

    // Tasks whose skew-adjusted completion precedes the arrival, with the adjusted time.
    pub early_completions: Vec<(Ustr, f64)>,

    // Tasks assigned by the scheduler after the node requested them, when skew is not used.
    pub suspected_skew: Vec<Ustr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Ustr,
    pub arrival: Option<Arrival>,
    pub tasks: BTreeMap<Ustr, Task>,
    pub round_trips: BTreeMap<Ustr, RoundTrip>,
    pub get_task: BTreeMap<Ustr, Timestamp>,
    pub get_task_complete: BTreeMap<Ustr, Timestamp>,
}

impl Request {
    pub fn new(id: Ustr) -> Request {
        Request {
            id,
            arrival: None,
            tasks: BTreeMap::new(),
            round_trips: BTreeMap::new(),
            get_task: BTreeMap::new(),
            get_task_complete: BTreeMap::new(),
        }
    }

    /// Get the task, creating it if this is the first time it is mentioned.

    pub fn task_mut(&mut self, task_id: Ustr) -> &mut Task {
        let request_id = self.id;
        self.tasks.entry(task_id).or_insert_with(|| {
            trace!("New task {request_id}/{task_id}");
            Task::new(TaskRef::new(request_id, task_id))
        })
    }

    pub fn set_arrival(&mut self, arrival: Arrival, policy: DuplicatePolicy) -> Option<Conflict> {
        policy.assign(&mut self.arrival, arrival, Field::Arrival)
    }

    pub fn set_round_trip_launch(
        &mut self,
        addr: Ustr,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        let rt = self.round_trips.entry(addr).or_default();
        policy.assign(&mut rt.launch, t, Field::RoundTripLaunch)
    }

    pub fn set_round_trip_remote(
        &mut self,
        addr: Ustr,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        let rt = self.round_trips.entry(addr).or_default();
        policy.assign(&mut rt.remote, t, Field::RoundTripRemote)
    }

    pub fn set_round_trip_complete(
        &mut self,
        addr: Ustr,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        let rt = self.round_trips.entry(addr).or_default();
        policy.assign(&mut rt.complete, t, Field::RoundTripComplete)
    }

    pub fn set_get_task(
        &mut self,
        addr: Ustr,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        assign_in(&mut self.get_task, addr, t, policy, Field::GetTask)
    }

    pub fn set_get_task_complete(
        &mut self,
        addr: Ustr,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        assign_in(
            &mut self.get_task_complete,
            addr,
            t,
            policy,
            Field::GetTaskComplete,
        )
    }

    /// Complete means: the arrival has been seen and announced a nonzero number of tasks, exactly
    /// that many tasks are known, and each of them is complete.  A request with more tasks than
    /// announced is not complete either.

    pub fn is_complete(&self) -> bool {
        match self.arrival {
            Some(a) => {
                a.expected_tasks > 0
                    && self.tasks.len() == a.expected_tasks
                    && self.tasks.values().all(|t| t.is_complete())
            }
            None => false,
        }
    }

    /// The time from arrival until the last task completed.  Every announced task must have been
    /// seen and have completed.  With `incorporate_skew`, completion
    /// times are first translated to the scheduler's clock, and a task whose translated completion
    /// precedes the arrival is reported but not clamped; the response time itself never goes below
    /// zero since the arrival is part of the maximum.

    pub fn response_time(&self, incorporate_skew: bool) -> Result<ResponseTime, Incomplete> {
        let Some(arrival) = self.arrival else {
            return Err(Incomplete::NoArrival);
        };
        if self.tasks.len() < arrival.expected_tasks {
            return Err(Incomplete::MissingTasks {
                expected: arrival.expected_tasks,
                seen: self.tasks.len(),
            });
        }
        let arrival_time = arrival.time as f64;
        let mut latest = arrival_time;
        let mut early_completions = vec![];
        let mut suspected_skew = vec![];
        for (task_id, task) in &self.tasks {
            let Some(completed) = task.completed else {
                return Err(Incomplete::MissingCompletion(*task_id));
            };
            let finish = if incorporate_skew {
                let Some(adjusted) = task.adjusted_completion() else {
                    return Err(Incomplete::UnknownSkew(*task_id));
                };
                if adjusted < arrival_time {
                    early_completions.push((*task_id, adjusted));
                }
                adjusted
            } else {
                if let (Some(assigned), Some(requested)) =
                    (task.scheduler_assigned, task.node_requested)
                {
                    if assigned > requested {
                        suspected_skew.push(*task_id);
                    }
                }
                completed as f64
            };
            latest = latest.max(finish);
        }
        Ok(ResponseTime {
            millis: latest - arrival_time,
            early_completions,
            suspected_skew,
        })
    }
}

fn assign_in(
    m: &mut BTreeMap<Ustr, Timestamp>,
    addr: Ustr,
    t: Timestamp,
    policy: DuplicatePolicy,
    field: Field,
) -> Option<Conflict> {
    let mut slot = m.get(&addr).copied();
    let c = policy.assign(&mut slot, t, field);
    if let Some(v) = slot {
        m.insert(addr, v);
    }
    c
}

#[cfg(test)]
fn make_request(expected_tasks: usize) -> Request {
    let mut r = Request::new(Ustr::from("r1"));
    r.set_arrival(
        Arrival {
            time: 0,
            expected_tasks,
            scheduler: Ustr::from("s"),
        },
        DuplicatePolicy::Overwrite,
    );
    r
}

#[cfg(test)]
fn complete_task(r: &mut Request, id: &str, assigned: Timestamp, completed: Timestamp) {
    let p = DuplicatePolicy::Overwrite;
    let t = r.task_mut(Ustr::from(id));
    t.set_scheduler_assigned(assigned, p);
    t.set_node_requested(assigned + 1, p);
    t.set_node_started(assigned + 4, p);
    t.set_completed(completed, p);
}

#[test]
fn test_request_completeness() {
    // Two announced tasks: one is not enough, three is too many.
    let mut r = make_request(2);
    complete_task(&mut r, "a", 1, 10);
    assert!(!r.is_complete());
    complete_task(&mut r, "b", 1, 12);
    assert!(r.is_complete());
    complete_task(&mut r, "c", 1, 14);
    assert!(!r.is_complete());

    // An announced count of zero never makes a complete request
    let r = make_request(0);
    assert!(!r.is_complete());

    let mut r = Request::new(Ustr::from("r2"));
    complete_task(&mut r, "a", 1, 10);
    assert!(!r.is_complete());
    assert!(r.response_time(false) == Err(Incomplete::NoArrival));
}

#[test]
fn test_response_time() {
    let mut r = make_request(2);
    complete_task(&mut r, "a", 1, 40);
    assert!(!r.is_complete());
    assert!(
        r.response_time(false)
            == Err(Incomplete::MissingTasks {
                expected: 2,
                seen: 1
            })
    );
    r.task_mut(Ustr::from("b"));
    assert!(r.response_time(false) == Err(Incomplete::MissingCompletion(Ustr::from("b"))));
    complete_task(&mut r, "b", 1, 25);
    assert!(r.response_time(false).unwrap().millis == 40.0);
    assert!(r.response_time(true) == Err(Incomplete::UnknownSkew(Ustr::from("a"))));

    use crate::task::{SkewEstimate, SkewSource};
    let skew = |millis| {
        Some(SkewEstimate {
            millis,
            source: SkewSource::RoundTrip,
        })
    };
    r.task_mut(Ustr::from("a")).clock_skew = skew(5.0);
    r.task_mut(Ustr::from("b")).clock_skew = skew(30.0);
    let rt = r.response_time(true).unwrap();
    assert!(rt.millis == 35.0);
    assert!(rt.early_completions == vec![(Ustr::from("b"), -5.0)]);

    // Every completion before the arrival: the response time is zero, not negative.
    r.task_mut(Ustr::from("a")).clock_skew = skew(50.0);
    let rt = r.response_time(true).unwrap();
    assert!(rt.millis == 0.0);
    assert!(rt.early_completions.len() == 2);
}

#[test]
fn test_suspected_skew() {
    let p = DuplicatePolicy::Overwrite;
    let mut r = make_request(1);
    let t = r.task_mut(Ustr::from("a"));
    t.set_scheduler_assigned(10, p);
    t.set_node_requested(8, p);
    t.set_node_started(9, p);
    t.set_completed(20, p);
    let rt = r.response_time(false).unwrap();
    assert!(rt.suspected_skew == vec![Ustr::from("a")]);
    assert!(rt.millis == 20.0);
}

#[test]
fn test_round_trips() {
    let p = DuplicatePolicy::KeepFirst;
    let n1 = Ustr::from("n1");
    let mut r = make_request(1);
    assert!(r.set_round_trip_launch(n1, 100, p).is_none());
    assert!(r.set_round_trip_complete(n1, 104, p).is_none());
    assert!(r.round_trips[&n1].round_trip_time().is_none());
    assert!(r.set_round_trip_remote(n1, 150, p).is_none());
    assert!(r.round_trips[&n1].round_trip_time() == Some(4));
    assert!(r.set_round_trip_remote(n1, 151, p).is_some());
    assert!(r.round_trips[&n1].remote == Some(150));

    assert!(r.set_get_task(n1, 7, p).is_none());
    assert!(r.set_get_task(n1, 8, DuplicatePolicy::Overwrite).is_some());
    assert!(r.get_task[&n1] == 8);
    assert!(r.set_get_task_complete(n1, 9, p).is_none());
    assert!(r.get_task_complete[&n1] == 9);
}
