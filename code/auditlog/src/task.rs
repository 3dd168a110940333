/// Per-task state.  A task accumulates the timestamps of its lifecycle as events arrive, in any
/// order, from the scheduler and from the node it runs on:
///
///   scheduler_assigned  the scheduler assigned the task to a node (scheduler clock)
///   node_requested      the node asked for (or was told to launch) the task (node clock)
///   node_started        the node started executing the task (node clock)
///   completed           the task finished (node clock)
///
/// Every field is set at most once by legitimate input.  The setters return a Conflict when a value
/// was already present and leave it to the caller to report it and to apply the policy.
use crate::configs::DuplicatePolicy;
use crate::diagnostics::{Conflict, Field};

use rustutils::{TimeDelta, Timestamp};
use std::fmt;
use ustr::Ustr;

/// The key of a task.  Task ids are only unique within their request.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskRef {
    pub request_id: Ustr,
    pub task_id: Ustr,
}

impl TaskRef {
    pub fn new(request_id: Ustr, task_id: Ustr) -> TaskRef {
        TaskRef {
            request_id,
            task_id,
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.request_id, self.task_id)
    }
}

/// Which piece of timing evidence a skew estimate was computed from.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewSource {
    RoundTrip,
    GetTask,
}

/// Milliseconds by which the node's clock is ahead of the scheduler's.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewEstimate {
    pub millis: f64,
    pub source: SkewSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskRef,
    pub node_address: Option<Ustr>,
    pub scheduler_assigned: Option<Timestamp>,
    pub node_requested: Option<Timestamp>,
    pub node_started: Option<Timestamp>,
    pub completed: Option<Timestamp>,
    pub previous: Option<TaskRef>,
    pub clock_skew: Option<SkewEstimate>,
}

impl Task {
    pub fn new(id: TaskRef) -> Task {
        Task {
            id,
            node_address: None,
            scheduler_assigned: None,
            node_requested: None,
            node_started: None,
            completed: None,
            previous: None,
            clock_skew: None,
        }
    }

    /// Associating a task with the node it already has is not a conflict, several event kinds
    /// carry the address.

    pub fn note_node_address(&mut self, addr: Ustr, policy: DuplicatePolicy) -> Option<Conflict> {
        if self.node_address == Some(addr) {
            return None;
        }
        policy.assign(&mut self.node_address, addr, Field::NodeAddress)
    }

    pub fn set_scheduler_assigned(
        &mut self,
        t: Timestamp,
        policy: DuplicatePolicy,
    ) -> Option<Conflict> {
        policy.assign(&mut self.scheduler_assigned, t, Field::SchedulerAssigned)
    }

    pub fn set_node_requested(&mut self, t: Timestamp, policy: DuplicatePolicy) -> Option<Conflict> {
        policy.assign(&mut self.node_requested, t, Field::NodeRequested)
    }

    pub fn set_node_started(&mut self, t: Timestamp, policy: DuplicatePolicy) -> Option<Conflict> {
        policy.assign(&mut self.node_started, t, Field::NodeStarted)
    }

    pub fn set_completed(&mut self, t: Timestamp, policy: DuplicatePolicy) -> Option<Conflict> {
        policy.assign(&mut self.completed, t, Field::Completed)
    }

    pub fn set_previous(&mut self, prev: TaskRef, policy: DuplicatePolicy) -> Option<Conflict> {
        policy.assign(&mut self.previous, prev, Field::PreviousTask)
    }

    pub fn is_complete(&self) -> bool {
        self.scheduler_assigned.is_some()
            && self.node_requested.is_some()
            && self.node_started.is_some()
            && self.completed.is_some()
    }

    /// Time spent queued on the node.  Not clamped: a negative value means the events are
    /// inconsistent and that should be visible.

    pub fn queue_time(&self) -> Option<TimeDelta> {
        if !self.is_complete() {
            return None;
        }
        Some(self.node_started? - self.node_requested?)
    }

    pub fn service_time(&self) -> Option<TimeDelta> {
        if !self.is_complete() {
            return None;
        }
        Some(self.completed? - self.node_started?)
    }

    /// Time from the scheduler's assignment until the node requested the task, in the scheduler's
    /// frame.  Needs the skew.

    pub fn launch_delay(&self) -> Option<f64> {
        if !self.is_complete() {
            return None;
        }
        let skew = self.clock_skew?.millis;
        Some((self.node_requested? as f64 - skew) - self.scheduler_assigned? as f64)
    }

    /// The completion time translated to the scheduler's clock.

    pub fn adjusted_completion(&self) -> Option<f64> {
        Some(self.completed? as f64 - self.clock_skew?.millis)
    }
}

#[cfg(test)]
fn make_task() -> Task {
    Task::new(TaskRef::new(Ustr::from("r1"), Ustr::from("t1")))
}

#[test]
fn test_task_completeness() {
    let p = DuplicatePolicy::Overwrite;
    let mut t = make_task();
    assert!(!t.is_complete());
    assert!(t.queue_time().is_none());
    t.set_scheduler_assigned(1, p);
    t.set_node_requested(2, p);
    t.set_node_started(5, p);
    assert!(!t.is_complete());
    assert!(t.service_time().is_none());
    t.set_completed(30, p);
    assert!(t.is_complete());
    assert!(t.queue_time() == Some(3));
    assert!(t.service_time() == Some(25));

    // Skew-dependent values need the skew
    assert!(t.launch_delay().is_none());
    assert!(t.adjusted_completion().is_none());
    t.clock_skew = Some(SkewEstimate {
        millis: -2.0,
        source: SkewSource::RoundTrip,
    });
    assert!(t.launch_delay() == Some(3.0));
    assert!(t.adjusted_completion() == Some(32.0));
}

#[test]
fn test_task_conflicts() {
    let mut t = make_task();
    let n1 = Ustr::from("n1");
    assert!(t.note_node_address(n1, DuplicatePolicy::KeepFirst).is_none());
    assert!(t.note_node_address(n1, DuplicatePolicy::KeepFirst).is_none());
    let c = t
        .note_node_address(Ustr::from("n2"), DuplicatePolicy::KeepFirst)
        .unwrap();
    assert!(c.field == Field::NodeAddress && c.old == "n1" && c.new == "n2");
    assert!(t.node_address == Some(n1));

    assert!(t.set_completed(10, DuplicatePolicy::KeepFirst).is_none());
    assert!(t.set_completed(12, DuplicatePolicy::Overwrite).is_some());
    assert!(t.completed == Some(12));

    let prev = TaskRef::new(Ustr::from("r0"), Ustr::from("t9"));
    assert!(t.set_previous(prev, DuplicatePolicy::KeepFirst).is_none());
    assert!(t.previous == Some(prev));
    assert!(prev.to_string() == "r0/t9");
}
