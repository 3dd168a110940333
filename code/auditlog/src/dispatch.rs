/// Routing of parsed events to the registry.
///
/// Two generations of the trace format are accepted, in the same run and even in the same file.
/// The older one is probe based:
///
///   arrived:req:num_tasks:scheduler       request arrival
///   probe_launch:req:addr                 scheduler sends a probe to a node
///   probe_received:req:addr               the node sees it (node clock)
///   probe_completion:req:addr             scheduler sees the reply
///   scheduler_launch:req:task             scheduler assigns the task
///   nodemonitor_launch_start:req:addr:task  the node is told to launch the task (node clock)
///   task_start:req:task                   the task starts running (node clock)
///   task_completion:req:task              the task finishes (node clock)
///
/// The newer one is reservation based, and nodes fetch their tasks:
///
///   scheduler_launch_enqueue_task:req:addr        scheduler sends a reservation
///   reservation_enqueued:addr:req:queue_length    the node enqueues it (node clock)
///   scheduler_complete_enqueue_task:req:addr      scheduler sees the reply
///   node_monitor_get_task:req:addr                the node asks for a task (node clock)
///   node_monitor_get_task_complete:req:addr       the node gets the reply (node clock)
///   scheduler_assigned_task:req:task:addr         scheduler hands out the task
///   task_launch:req:task:addr[:prev_req:prev_task]  the task starts, in a slot previously used by
///                                                 prev_req/prev_task if those are not empty
///   task_completed:req:task:addr                  the task finishes
///   node_monitor_queue_length:addr:queue_length   a queue length sample
///
/// Every handler only fills in fields, so the order of the events does not matter except when the
/// same field is written twice with different values, and then the duplicate policy decides.
use crate::configs::DuplicatePolicy;
use crate::diagnostics::{Conflict, Diagnostic, Diagnostics, Location};
use crate::event::{parse_line, Event};
use crate::registry::TraceRegistry;
use crate::request::Arrival;
use crate::task::TaskRef;

use std::str::FromStr;
use ustr::Ustr;

/// Why a well-formed line could not be dispatched.

enum Reject {
    Malformed(String),
    Unknown,
}

fn params<'a, const N: usize>(event: &Event<'a>) -> Result<[&'a str; N], Reject> {
    match <[&str; N]>::try_from(event.params.as_slice()) {
        Ok(ps) => Ok(ps),
        Err(_) => Err(Reject::Malformed(format!(
            "'{}' takes {} parameters, found {}",
            event.kind,
            N,
            event.params.len()
        ))),
    }
}

fn count(s: &str, what: &str) -> Result<usize, Reject> {
    match usize::from_str(s) {
        Ok(n) => Ok(n),
        Err(_) => Err(Reject::Malformed(format!("bad {what} '{s}'"))),
    }
}

/// Dispatch one event.  Duplicate assignments are recorded in `diags`; the return value says
/// whether the event was used at all.

pub fn dispatch(
    registry: &mut TraceRegistry,
    event: &Event,
    location: &Location,
    policy: DuplicatePolicy,
    diags: &mut Diagnostics,
) -> bool {
    match apply(registry, event, policy) {
        Ok(conflicts) => {
            for (entity, c) in conflicts {
                diags.conflict(Some(c), policy, || entity);
            }
            true
        }
        Err(Reject::Malformed(reason)) => {
            diags.record(Diagnostic::MalformedInput {
                location: location.clone(),
                reason,
            });
            false
        }
        Err(Reject::Unknown) => {
            diags.record(Diagnostic::UnknownEventKind {
                location: location.clone(),
                kind: event.kind.to_string(),
            });
            false
        }
    }
}

type Conflicts = Vec<(String, Conflict)>;

fn on_request(c: Option<Conflict>, req: &str, out: &mut Conflicts) {
    if let Some(c) = c {
        out.push((format!("request {req}"), c));
    }
}

fn on_node(c: Option<Conflict>, req: &str, addr: &str, out: &mut Conflicts) {
    if let Some(c) = c {
        out.push((format!("request {req} node {addr}"), c));
    }
}

fn on_task(c: Option<Conflict>, req: &str, task: &str, out: &mut Conflicts) {
    if let Some(c) = c {
        out.push((format!("request {req} task {task}"), c));
    }
}

fn apply(
    registry: &mut TraceRegistry,
    event: &Event,
    policy: DuplicatePolicy,
) -> Result<Conflicts, Reject> {
    let t = event.timestamp;
    let mut out = vec![];
    match event.kind {
        "arrived" => {
            let [req, num_tasks, scheduler] = params(event)?;
            let arrival = Arrival {
                time: t,
                expected_tasks: count(num_tasks, "task count")?,
                scheduler: Ustr::from(scheduler),
            };
            let c = registry
                .request_mut(Ustr::from(req))
                .set_arrival(arrival, policy);
            on_request(c, req, &mut out);
        }
        "probe_launch" | "scheduler_launch_enqueue_task" => {
            let [req, addr] = params(event)?;
            let c = registry.request_mut(Ustr::from(req)).set_round_trip_launch(
                Ustr::from(addr),
                t,
                policy,
            );
            on_node(c, req, addr, &mut out);
        }
        "probe_received" => {
            let [req, addr] = params(event)?;
            let c = registry.request_mut(Ustr::from(req)).set_round_trip_remote(
                Ustr::from(addr),
                t,
                policy,
            );
            on_node(c, req, addr, &mut out);
        }
        "reservation_enqueued" => {
            let [addr, req, queue_length] = params(event)?;
            let queue_length = count(queue_length, "queue length")?;
            let c = registry.request_mut(Ustr::from(req)).set_round_trip_remote(
                Ustr::from(addr),
                t,
                policy,
            );
            on_node(c, req, addr, &mut out);
            registry.add_queue_length(Ustr::from(addr), t, queue_length);
        }
        "probe_completion" | "scheduler_complete_enqueue_task" => {
            let [req, addr] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .set_round_trip_complete(Ustr::from(addr), t, policy);
            on_node(c, req, addr, &mut out);
        }
        "node_monitor_get_task" => {
            let [req, addr] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .set_get_task(Ustr::from(addr), t, policy);
            on_node(c, req, addr, &mut out);
        }
        "node_monitor_get_task_complete" => {
            let [req, addr] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .set_get_task_complete(Ustr::from(addr), t, policy);
            on_node(c, req, addr, &mut out);
        }
        "scheduler_launch" => {
            let [req, task] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task))
                .set_scheduler_assigned(t, policy);
            on_task(c, req, task, &mut out);
        }
        "scheduler_assigned_task" => {
            let [req, task, addr] = params(event)?;
            let tk = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task));
            on_task(tk.note_node_address(Ustr::from(addr), policy), req, task, &mut out);
            on_task(tk.set_scheduler_assigned(t, policy), req, task, &mut out);
        }
        "nodemonitor_launch_start" => {
            let [req, addr, task] = params(event)?;
            let tk = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task));
            on_task(tk.note_node_address(Ustr::from(addr), policy), req, task, &mut out);
            on_task(tk.set_node_requested(t, policy), req, task, &mut out);
        }
        "task_start" => {
            let [req, task] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task))
                .set_node_started(t, policy);
            on_task(c, req, task, &mut out);
        }
        "task_launch" => {
            let (req, task, addr, previous) = match event.params.len() {
                3 => {
                    let [req, task, addr] = params(event)?;
                    (req, task, addr, None)
                }
                _ => {
                    let [req, task, addr, prev_req, prev_task] = params(event)?;
                    let previous = if prev_req.is_empty() || prev_task.is_empty() {
                        None
                    } else {
                        Some(TaskRef::new(Ustr::from(prev_req), Ustr::from(prev_task)))
                    };
                    (req, task, addr, previous)
                }
            };
            let tk = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task));
            on_task(tk.note_node_address(Ustr::from(addr), policy), req, task, &mut out);
            on_task(tk.set_node_started(t, policy), req, task, &mut out);
            if let Some(prev) = previous {
                on_task(tk.set_previous(prev, policy), req, task, &mut out);
            }
        }
        "task_completion" => {
            let [req, task] = params(event)?;
            let c = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task))
                .set_completed(t, policy);
            on_task(c, req, task, &mut out);
        }
        "task_completed" => {
            let [req, task, addr] = params(event)?;
            let tk = registry
                .request_mut(Ustr::from(req))
                .task_mut(Ustr::from(task));
            on_task(tk.note_node_address(Ustr::from(addr), policy), req, task, &mut out);
            on_task(tk.set_completed(t, policy), req, task, &mut out);
        }
        "node_monitor_queue_length" => {
            let [addr, queue_length] = params(event)?;
            let queue_length = count(queue_length, "queue length")?;
            registry.add_queue_length(Ustr::from(addr), t, queue_length);
        }
        _ => return Err(Reject::Unknown),
    }
    Ok(out)
}

/// Parse and dispatch one line.  Returns false if the line was discarded: malformed, or of an
/// unknown kind.  Blank lines are not discarded, they are simply not there.

pub fn ingest_line(
    registry: &mut TraceRegistry,
    line: &str,
    location: &Location,
    policy: DuplicatePolicy,
    diags: &mut Diagnostics,
) -> bool {
    match parse_line(line) {
        Ok(Some(event)) => dispatch(registry, &event, location, policy, diags),
        Ok(None) => true,
        Err(e) => {
            diags.record(Diagnostic::MalformedInput {
                location: location.clone(),
                reason: e.to_string(),
            });
            false
        }
    }
}

/// Ingest a sequence of lines that did not come from a named file.  Diagnostics carry the 1-based
/// line number.

pub fn ingest<'a, I>(registry: &mut TraceRegistry, lines: I, policy: DuplicatePolicy) -> Diagnostics
where
    I: IntoIterator<Item = &'a str>,
{
    let mut diags = Diagnostics::new();
    for (n, line) in lines.into_iter().enumerate() {
        let location = Location {
            file: None,
            line: n + 1,
        };
        ingest_line(registry, line, &location, policy, &mut diags);
    }
    diags
}

#[cfg(test)]
fn tasks_of(reg: &TraceRegistry, req: &str) -> Vec<crate::task::Task> {
    reg.request(req)
        .unwrap()
        .tasks
        .values()
        .cloned()
        .collect()
}

#[test]
fn test_dispatch_probe_format() {
    use crate::diagnostics::DiagnosticKind;

    let lines = [
        "audit\t0\tarrived:r1:1:sched1",
        "audit\t0\tprobe_launch:r1:n1",
        "audit\t5\tprobe_received:r1:n1",
        "audit\t2\tprobe_completion:r1:n1",
        "audit\t1\tscheduler_launch:r1:t1",
        "audit\t2\tnodemonitor_launch_start:r1:n1:t1",
        "audit\t5\ttask_start:r1:t1",
        "audit\t30\ttask_completion:r1:t1",
    ];
    let mut reg = TraceRegistry::new();
    let diags = ingest(&mut reg, lines, DuplicatePolicy::Overwrite);
    assert!(diags.is_empty());
    let r = reg.request("r1").unwrap();
    assert!(r.is_complete());
    let a = r.arrival.unwrap();
    assert!(a.time == 0 && a.expected_tasks == 1 && a.scheduler.as_str() == "sched1");
    assert!(r.round_trips[&Ustr::from("n1")].round_trip_time() == Some(2));
    let t = &tasks_of(&reg, "r1")[0];
    assert!(t.node_address == Some(Ustr::from("n1")));
    assert!(t.queue_time() == Some(3));
    assert!(t.service_time() == Some(25));

    // The same again, as a second ingestion: every field is now a duplicate.
    let diags = ingest(&mut reg, lines, DuplicatePolicy::Overwrite);
    assert!(diags.len() == 8);
    assert!(diags.count(DiagnosticKind::DuplicateAssignment) == 8);
}

#[test]
fn test_dispatch_reservation_format() {
    let lines = [
        "audit\t100\tscheduler_launch_enqueue_task:q1:n1",
        "audit\t150\treservation_enqueued:n1:q1:4",
        "audit\t104\tscheduler_complete_enqueue_task:q1:n1",
        "audit\t160\tnode_monitor_get_task:q1:n1",
        "audit\t162\tnode_monitor_get_task_complete:q1:n1",
        "audit\t110\tscheduler_assigned_task:q1:a:n1",
        "audit\t165\ttask_launch:q1:a:n1:q0:z",
        "audit\t166\ttask_launch:q1:b:n1::",
        "audit\t180\ttask_completed:q1:a:n1",
        "audit\t170\tnode_monitor_queue_length:n1:2",
    ];
    let mut reg = TraceRegistry::new();
    let diags = ingest(&mut reg, lines, DuplicatePolicy::KeepFirst);
    assert!(diags.is_empty());
    let r = reg.request("q1").unwrap();
    let n1 = Ustr::from("n1");
    assert!(r.round_trips[&n1].remote == Some(150));
    assert!(r.get_task[&n1] == 160);
    assert!(r.get_task_complete[&n1] == 162);
    let ts = tasks_of(&reg, "q1");
    assert!(ts[0].scheduler_assigned == Some(110));
    assert!(ts[0].node_started == Some(165));
    assert!(ts[0].completed == Some(180));
    assert!(ts[0].previous == Some(TaskRef::new(Ustr::from("q0"), Ustr::from("z"))));
    assert!(ts[1].previous.is_none());
    assert!(reg.queue_lengths()[&n1] == vec![(150, 4), (170, 2)]);
}

#[test]
fn test_dispatch_rejects() {
    use crate::diagnostics::DiagnosticKind;

    let lines = [
        "garbage",
        "",
        "audit\tabc\ttask_start:r1:t1",
        "audit\t1\ttask_start:r1",
        "audit\t1\tarrived:r1:many:s",
        "audit\t1\treservation_enqueued:n1:r1:-1",
        "audit\t1\ttask_launch:r1:t1:n1:r0",
        "audit\t1\tfrobnicate:r1",
        "audit\t1\ttask_completion:r1:t1",
    ];
    let mut reg = TraceRegistry::new();
    let diags = ingest(&mut reg, lines, DuplicatePolicy::Overwrite);
    assert!(diags.count(DiagnosticKind::MalformedInput) == 6);
    assert!(diags.count(DiagnosticKind::UnknownEventKind) == 1);
    match &diags.entries()[0] {
        Diagnostic::MalformedInput { location, .. } => assert!(location.line == 1),
        _ => panic!("Expected malformed input"),
    }
    match &diags.entries()[6] {
        Diagnostic::UnknownEventKind { location, kind } => {
            assert!(location.line == 8 && kind == "frobnicate")
        }
        _ => panic!("Expected unknown kind"),
    }

    // Rejected lines leave no trace; the last line still creates the request.
    assert!(reg.len() == 1);
    assert!(reg.request("r1").unwrap().arrival.is_none());
    assert!(reg.queue_lengths().is_empty());
}

#[test]
fn test_dispatch_node_address_conflict() {
    let lines = [
        "audit\t1\tscheduler_assigned_task:r:t:n1",
        "audit\t2\ttask_completed:r:t:n2",
    ];
    let mut reg = TraceRegistry::new();
    let diags = ingest(&mut reg, lines, DuplicatePolicy::KeepFirst);
    assert!(diags.len() == 1);
    assert!(
        diags.entries()[0].to_string()
            == "request r task t: node address assigned twice (n1, then n2); first value kept"
    );
    assert!(tasks_of(&reg, "r")[0].node_address == Some(Ustr::from("n1")));
}
