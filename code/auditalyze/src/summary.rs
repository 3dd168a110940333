/// One line about the whole trace: the response-time percentiles of the requests in the window, the
/// counts of what happened to the other requests, and the number of diagnostics of each kind.
use crate::format;

use anyhow::Result;
use auditlog::{DiagnosticKind, Diagnostics, Exclusions, Metrics, Summary};
use std::collections::HashMap;
use std::io;

struct SummaryRow {
    response: Summary,
    exclusions: Exclusions,
    diagnostics: HashMap<DiagnosticKind, usize>,
}

pub fn print(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    metrics: &Metrics,
    diags: &Diagnostics,
) -> Result<()> {
    let row = SummaryRow {
        response: Summary::of(&metrics.response_times),
        exclusions: metrics.exclusions,
        diagnostics: [
            DiagnosticKind::MalformedInput,
            DiagnosticKind::UnknownEventKind,
            DiagnosticKind::DuplicateAssignment,
            DiagnosticKind::SkewEstimationUnavailable,
            DiagnosticKind::SkewBeforeArrival,
            DiagnosticKind::SuspectedSkew,
        ]
        .into_iter()
        .map(|k| (k, diags.count(k)))
        .collect(),
    };
    let (formatters, aliases) = my_formatters();
    format::format_with(
        output,
        fmt,
        FMT_DEFAULTS,
        &formatters,
        &aliases,
        &[row],
        crate::nodefaults(fmt),
    )
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "requests,measured,p50,p95,p99";

fn my_formatters() -> (format::Formatters<SummaryRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<SummaryRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("requests".to_string(), &format_requests);
    formatters.insert("complete".to_string(), &format_complete);
    formatters.insert("incomplete".to_string(), &format_incomplete);
    formatters.insert("outside".to_string(), &format_outside);
    formatters.insert("unmeasured".to_string(), &format_unmeasured);
    formatters.insert("measured".to_string(), &format_measured);
    formatters.insert("p50".to_string(), &format_p50);
    formatters.insert("p95".to_string(), &format_p95);
    formatters.insert("p99".to_string(), &format_p99);
    formatters.insert("malformed".to_string(), &format_malformed);
    formatters.insert("unknown".to_string(), &format_unknown);
    formatters.insert("duplicates".to_string(), &format_duplicates);
    formatters.insert("noskew".to_string(), &format_noskew);
    formatters.insert("early".to_string(), &format_early);
    formatters.insert("suspected".to_string(), &format_suspected);
    aliases.insert(
        "counts".to_string(),
        vec![
            "requests".to_string(),
            "complete".to_string(),
            "incomplete".to_string(),
            "outside".to_string(),
            "unmeasured".to_string(),
            "measured".to_string(),
        ],
    );
    aliases.insert(
        "response".to_string(),
        vec!["p50".to_string(), "p95".to_string(), "p99".to_string()],
    );
    aliases.insert(
        "diagnostics".to_string(),
        vec![
            "malformed".to_string(),
            "unknown".to_string(),
            "duplicates".to_string(),
            "noskew".to_string(),
            "early".to_string(),
            "suspected".to_string(),
        ],
    );
    let all = ["counts", "response", "diagnostics"]
        .iter()
        .flat_map(|a| aliases[*a].clone())
        .collect::<Vec<String>>();
    aliases.insert("all".to_string(), all);

    (formatters, aliases)
}

fn format_requests(r: &SummaryRow, _: bool) -> String {
    r.exclusions.total.to_string()
}

fn format_complete(r: &SummaryRow, _: bool) -> String {
    r.exclusions.complete.to_string()
}

fn format_incomplete(r: &SummaryRow, _: bool) -> String {
    r.exclusions.incomplete.to_string()
}

fn format_outside(r: &SummaryRow, _: bool) -> String {
    r.exclusions.outside_window.to_string()
}

fn format_unmeasured(r: &SummaryRow, _: bool) -> String {
    r.exclusions.unmeasured.to_string()
}

// Requests in the window with a response time.

fn format_measured(r: &SummaryRow, _: bool) -> String {
    (r.exclusions.windowed - r.exclusions.unmeasured).to_string()
}

fn format_p50(r: &SummaryRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.response.p50, nodefaults)
}

fn format_p95(r: &SummaryRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.response.p95, nodefaults)
}

fn format_p99(r: &SummaryRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.response.p99, nodefaults)
}

fn count(r: &SummaryRow, kind: DiagnosticKind) -> String {
    r.diagnostics.get(&kind).copied().unwrap_or(0).to_string()
}

fn format_malformed(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::MalformedInput)
}

fn format_unknown(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::UnknownEventKind)
}

fn format_duplicates(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::DuplicateAssignment)
}

fn format_noskew(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::SkewEstimationUnavailable)
}

fn format_early(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::SkewBeforeArrival)
}

fn format_suspected(r: &SummaryRow, _: bool) -> String {
    count(r, DiagnosticKind::SuspectedSkew)
}

#[test]
fn test_summary() {
    use auditlog::AnalysisConfig;

    let config = AnalysisConfig::default();
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/reservation-trace.log", &config);
    let mut out = vec![];
    print(
        &mut out,
        &Some("all,csv,header".to_string()),
        &metrics,
        &Diagnostics::new(),
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 2);
    assert!(lines[0].starts_with("requests,complete,incomplete,outside,unmeasured,measured,p50,"));
    assert!(lines[1].starts_with("2,2,0,0,0,2,530,"));
    assert!(lines[1].ends_with(",0,0,0,0,0,0"));
}
