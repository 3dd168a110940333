/// Launch curves: for each request, the number of tasks the scheduler has assigned against the time
/// since the request arrived, one row per assignment.
use crate::format;

use anyhow::Result;
use auditlog::Metrics;
use rustutils::{format_utc_short, TimeDelta, Timestamp};
use std::collections::HashMap;
use std::io;
use ustr::Ustr;

struct LaunchRow {
    request: Ustr,
    arrival: Timestamp,
    offset: TimeDelta,
    launched: usize,
}

pub fn print(output: &mut dyn io::Write, fmt: &Option<String>, metrics: &Metrics) -> Result<()> {
    let rows = metrics
        .launch_curves
        .iter()
        .flat_map(|c| {
            c.points.iter().map(|(offset, launched)| LaunchRow {
                request: c.request,
                arrival: c.arrival,
                offset: *offset,
                launched: *launched,
            })
        })
        .collect::<Vec<LaunchRow>>();
    let (formatters, aliases) = my_formatters();
    format::format_with(output, fmt, FMT_DEFAULTS, &formatters, &aliases, &rows, false)
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "request,offset,launched";

fn my_formatters() -> (format::Formatters<LaunchRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<LaunchRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("request".to_string(), &format_request);
    formatters.insert("arrival".to_string(), &format_arrival);
    formatters.insert("offset".to_string(), &format_offset);
    formatters.insert("launched".to_string(), &format_launched);
    aliases.insert(
        "all".to_string(),
        vec![
            "request".to_string(),
            "arrival".to_string(),
            "offset".to_string(),
            "launched".to_string(),
        ],
    );

    (formatters, aliases)
}

fn format_request(r: &LaunchRow, _: bool) -> String {
    r.request.to_string()
}

fn format_arrival(r: &LaunchRow, _: bool) -> String {
    format_utc_short(r.arrival)
}

fn format_offset(r: &LaunchRow, _: bool) -> String {
    r.offset.to_string()
}

fn format_launched(r: &LaunchRow, _: bool) -> String {
    r.launched.to_string()
}

#[test]
fn test_launches() {
    use auditlog::AnalysisConfig;

    let config = AnalysisConfig::default();
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/reservation-trace.log", &config);
    let mut out = vec![];
    print(&mut out, &None, &metrics).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "request  offset  launched\nq0       1       1\nq1       11      1\nq1       11      2\n");
}
