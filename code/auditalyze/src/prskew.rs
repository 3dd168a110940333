/// Clock skew distributions.  For each pair of machines, the skew samples sorted by value form a
/// CDF; at most about `resolution` rows of it are printed, taking every stride'th sample.  The
/// fraction of a row is the share of samples up to and including the stride ending at it, so the
/// last row of a pair need not be 1, and it never exceeds 1.
use crate::format;

use anyhow::Result;
use auditlog::{AnalysisConfig, Metrics, SkewSample};
use itertools::Itertools;
use rustutils::{format_timestamp, Timestamp};
use std::collections::HashMap;
use std::io;
use ustr::Ustr;

struct SkewRow {
    first: Ustr,
    second: Ustr,
    fraction: f64,
    skew: f64,
    arrival: Timestamp,
}

pub fn print(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    metrics: &Metrics,
    config: &AnalysisConfig,
) -> Result<()> {
    let rows = skew_rows(&metrics.skew_samples, config.percentile_resolution);
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

// The samples are sorted by pair and then by skew.

fn skew_rows(samples: &[SkewSample], resolution: usize) -> Vec<SkewRow> {
    let mut rows = vec![];
    for (_, group) in &samples.iter().group_by(|s| (s.first, s.second)) {
        let group = group.collect::<Vec<&SkewSample>>();
        let n = group.len();
        let stride = usize::max(1, n / resolution.max(1));
        for (i, s) in group.iter().step_by(stride).enumerate() {
            rows.push(SkewRow {
                first: s.first,
                second: s.second,
                fraction: (((i + 1) * stride) as f64 / n as f64).min(1.0),
                skew: s.skew,
                arrival: s.arrival,
            });
        }
    }
    rows
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "first,second,fraction,skew,arrival";

fn my_formatters() -> (format::Formatters<SkewRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<SkewRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("first".to_string(), &format_first);
    formatters.insert("second".to_string(), &format_second);
    formatters.insert("fraction".to_string(), &format_fraction);
    formatters.insert("skew".to_string(), &format_skew);
    formatters.insert("arrival".to_string(), &format_arrival);
    formatters.insert("arrival-ms".to_string(), &format_arrival_ms);
    aliases.insert(
        "all".to_string(),
        vec![
            "first".to_string(),
            "second".to_string(),
            "fraction".to_string(),
            "skew".to_string(),
            "arrival".to_string(),
        ],
    );

    (formatters, aliases)
}

fn format_first(r: &SkewRow, _: bool) -> String {
    r.first.to_string()
}

fn format_second(r: &SkewRow, _: bool) -> String {
    r.second.to_string()
}

fn format_fraction(r: &SkewRow, _: bool) -> String {
    format!("{:.3}", r.fraction)
}

fn format_skew(r: &SkewRow, _: bool) -> String {
    crate::format_millis(r.skew)
}

fn format_arrival(r: &SkewRow, _: bool) -> String {
    format_timestamp(r.arrival)
}

fn format_arrival_ms(r: &SkewRow, _: bool) -> String {
    r.arrival.to_string()
}

#[test]
fn test_skew_rows() {
    let a = Ustr::from("a");
    let b = Ustr::from("b");
    let c = Ustr::from("c");
    let mut samples = (0..10)
        .map(|i| SkewSample::new(a, b, i as f64, 1000 + i))
        .collect::<Vec<SkewSample>>();
    samples.push(SkewSample::new(a, c, -2.0, 7));

    let rows = skew_rows(&samples, 4);
    let pairs = rows
        .iter()
        .map(|r| (r.second.as_str(), r.fraction, r.skew))
        .collect::<Vec<_>>();
    assert!(
        pairs
            == vec![
                ("b", 0.2, 0.0),
                ("b", 0.4, 2.0),
                ("b", 0.6, 4.0),
                ("b", 0.8, 6.0),
                ("b", 1.0, 8.0),
                ("c", 1.0, -2.0),
            ]
    );

    // Eleven samples at resolution 4: the last stride runs past the end.
    samples.insert(0, SkewSample::new(a, b, -1.0, 999));
    let rows = skew_rows(&samples, 4);
    assert!(rows.len() == 7);
    assert!(rows[5].fraction == 1.0 && rows[5].skew == 9.0);
    assert!(rows.iter().all(|r| r.fraction <= 1.0));
    samples.remove(0);

    let rows = skew_rows(&samples, 100);
    assert!(rows.len() == 11);
    assert!(rows[9].fraction == 1.0 && rows[9].arrival == 1009);
}

#[test]
fn test_print_skew() {
    let config = AnalysisConfig::default();
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/probe-trace.log", &config);
    let mut out = vec![];
    print(
        &mut out,
        &Some("first,second,fraction,skew,arrival-ms,csv".to_string()),
        &metrics,
        &config,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "n1,sched1,0.500,-10,1000\nn1,sched1,1.000,-10,2000\nn2,sched1,1.000,4,1000\n");
}
