/// One row per request, in order of arrival, whether it is inside the window or not.  A request
/// without a response time shows why instead.
use crate::format;

use anyhow::Result;
use auditlog::{AnalysisConfig, Incomplete, Request, TraceRegistry};
use rustutils::{format_timestamp, Timestamp};
use std::collections::HashMap;
use std::io;
use ustr::Ustr;

struct RequestRow {
    id: Ustr,
    arrival: Option<Timestamp>,
    scheduler: Option<Ustr>,
    expected: Option<usize>,
    tasks: usize,
    complete: bool,
    response: Result<f64, Incomplete>,
}

fn request_row(r: &Request, incorporate_skew: bool) -> RequestRow {
    RequestRow {
        id: r.id,
        arrival: r.arrival.map(|a| a.time),
        scheduler: r.arrival.map(|a| a.scheduler),
        expected: r.arrival.map(|a| a.expected_tasks),
        tasks: r.tasks.len(),
        complete: r.is_complete(),
        response: r.response_time(incorporate_skew).map(|rt| rt.millis),
    }
}

pub fn print(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    registry: &TraceRegistry,
    config: &AnalysisConfig,
) -> Result<()> {
    let rows = registry
        .sorted_requests()
        .into_iter()
        .map(|r| request_row(r, config.incorporate_skew))
        .collect::<Vec<RequestRow>>();
    let (formatters, aliases) = my_formatters();
    format::format_with(
        output,
        fmt,
        FMT_DEFAULTS,
        &formatters,
        &aliases,
        &rows,
        crate::nodefaults(fmt),
    )
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "id,arrival,tasks,response,reason";

fn my_formatters() -> (format::Formatters<RequestRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<RequestRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("id".to_string(), &format_id);
    formatters.insert("arrival".to_string(), &format_arrival);
    formatters.insert("arrival-ms".to_string(), &format_arrival_ms);
    formatters.insert("scheduler".to_string(), &format_scheduler);
    formatters.insert("expected".to_string(), &format_expected);
    formatters.insert("tasks".to_string(), &format_tasks);
    formatters.insert("complete".to_string(), &format_complete);
    formatters.insert("response".to_string(), &format_response);
    formatters.insert("reason".to_string(), &format_reason);
    aliases.insert(
        "all".to_string(),
        vec![
            "id".to_string(),
            "arrival".to_string(),
            "arrival-ms".to_string(),
            "scheduler".to_string(),
            "expected".to_string(),
            "tasks".to_string(),
            "complete".to_string(),
            "response".to_string(),
            "reason".to_string(),
        ],
    );

    (formatters, aliases)
}

fn missing(nodefaults: bool) -> String {
    if nodefaults {
        "*skip*".to_string()
    } else {
        "-".to_string()
    }
}

fn format_id(r: &RequestRow, _: bool) -> String {
    r.id.to_string()
}

fn format_arrival(r: &RequestRow, nodefaults: bool) -> String {
    match r.arrival {
        Some(t) => format_timestamp(t),
        None => missing(nodefaults),
    }
}

fn format_arrival_ms(r: &RequestRow, nodefaults: bool) -> String {
    match r.arrival {
        Some(t) => t.to_string(),
        None => missing(nodefaults),
    }
}

fn format_scheduler(r: &RequestRow, nodefaults: bool) -> String {
    match r.scheduler {
        Some(s) => s.to_string(),
        None => missing(nodefaults),
    }
}

fn format_expected(r: &RequestRow, nodefaults: bool) -> String {
    match r.expected {
        Some(n) => n.to_string(),
        None => missing(nodefaults),
    }
}

fn format_tasks(r: &RequestRow, _: bool) -> String {
    r.tasks.to_string()
}

fn format_complete(r: &RequestRow, _: bool) -> String {
    (if r.complete { "yes" } else { "no" }).to_string()
}

fn format_response(r: &RequestRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.response.ok(), nodefaults)
}

// A complete request can still lack a response time, if the skew of some task is unknown.

fn format_reason(r: &RequestRow, nodefaults: bool) -> String {
    match r.response {
        Ok(_) => missing(nodefaults),
        Err(Incomplete::NoArrival) => "no arrival".to_string(),
        Err(Incomplete::MissingTasks { expected, seen }) => {
            format!("{seen} of {expected} tasks seen")
        }
        Err(Incomplete::MissingCompletion(task)) => format!("task {task} not completed"),
        Err(Incomplete::UnknownSkew(task)) => format!("skew of task {task} unknown"),
    }
}

#[test]
fn test_requests() {
    let config = AnalysisConfig::default();
    let (registry, _) = crate::analyze_fixture("../tests/auditlog/probe-trace.log", &config);
    let mut out = vec![];
    print(
        &mut out,
        &Some("id,arrival-ms,expected,tasks,complete,response,reason,csvnamed,nodefaults".to_string()),
        &registry,
        &config,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(
        text == "id=r1,arrival-ms=1000,expected=2,tasks=2,complete=yes,response=50\n\
                 id=r2,arrival-ms=2000,expected=1,tasks=1,complete=no,reason=task t1 not completed\n"
    );

    let mut registry = registry;
    registry.request_mut(Ustr::from("r0"));
    let mut out = vec![];
    print(&mut out, &Some("id,response,reason,awk".to_string()), &registry, &config).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("r0 - no_arrival\n"));

    // A request whose tasks have not all been seen has no response time, even if the ones seen
    // have completed.
    registry.request_mut(Ustr::from("r9")).set_arrival(
        auditlog::Arrival {
            time: 3000,
            expected_tasks: 3,
            scheduler: Ustr::from("sched1"),
        },
        auditlog::DuplicatePolicy::Overwrite,
    );
    let t = registry
        .request_mut(Ustr::from("r9"))
        .task_mut(Ustr::from("t1"));
    t.set_completed(3010, auditlog::DuplicatePolicy::Overwrite);
    let mut out = vec![];
    print(&mut out, &Some("id,response,reason,csv".to_string()), &registry, &config).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("r9,-,1 of 3 tasks seen\n"));
}
