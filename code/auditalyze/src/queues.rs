/// Queue-length samples, one row per sample, grouped by node and in time order within a node.  These
/// are not windowed: the queue is a property of the node, not of any request.
use crate::format;

use anyhow::Result;
use auditlog::Metrics;
use rustutils::{format_timestamp, Timestamp};
use std::collections::HashMap;
use std::io;
use ustr::Ustr;

struct QueueRow {
    node: Ustr,
    time: Timestamp,
    length: usize,
}

pub fn print(output: &mut dyn io::Write, fmt: &Option<String>, metrics: &Metrics) -> Result<()> {
    let mut rows = vec![];
    for (node, samples) in &metrics.queue_lengths {
        let mut samples = samples.clone();
        samples.sort();
        for (time, length) in samples {
            rows.push(QueueRow {
                node: *node,
                time,
                length,
            });
        }
    }
    let (formatters, aliases) = my_formatters();
    format::format_with(output, fmt, FMT_DEFAULTS, &formatters, &aliases, &rows, false)
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "node,time,length";

fn my_formatters() -> (format::Formatters<QueueRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<QueueRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("node".to_string(), &format_node);
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("time-ms".to_string(), &format_time_ms);
    formatters.insert("length".to_string(), &format_length);
    aliases.insert(
        "all".to_string(),
        vec![
            "node".to_string(),
            "time".to_string(),
            "time-ms".to_string(),
            "length".to_string(),
        ],
    );

    (formatters, aliases)
}

fn format_node(r: &QueueRow, _: bool) -> String {
    r.node.to_string()
}

fn format_time(r: &QueueRow, _: bool) -> String {
    format_timestamp(r.time)
}

fn format_time_ms(r: &QueueRow, _: bool) -> String {
    r.time.to_string()
}

fn format_length(r: &QueueRow, _: bool) -> String {
    r.length.to_string()
}

#[test]
fn test_queues() {
    use auditlog::AnalysisConfig;

    let config = AnalysisConfig::default();
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/reservation-trace.log", &config);
    let mut out = vec![];
    print(&mut out, &Some("node,time-ms,length,awk".to_string()), &metrics).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 3);
    assert!(lines[1..] == ["n2 4500 3", "n2 5002 0"]);
}
