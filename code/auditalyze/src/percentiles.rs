/// The percentile table: one row per grid point i/resolution, with the interpolated value of each
/// metric sequence at that point.  A sequence with no data has no values.
use crate::format;

use anyhow::Result;
use auditlog::{percentile_table, AnalysisConfig, Metrics};
use std::collections::HashMap;
use std::io;

struct PercentileRow {
    fraction: f64,
    response: Option<f64>,
    network: Option<f64>,
    service: Option<f64>,
    queue: Option<f64>,
    launch: Option<f64>,
    handoff: Option<f64>,
}

pub fn print(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    metrics: &Metrics,
    config: &AnalysisConfig,
) -> Result<()> {
    let rows = percentile_rows(metrics, config.percentile_resolution);
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

fn percentile_rows(metrics: &Metrics, resolution: usize) -> Vec<PercentileRow> {
    let response = percentile_table(&metrics.response_times, resolution);
    let network = percentile_table(&metrics.network_round_trips, resolution);
    let service = percentile_table(&metrics.service_times, resolution);
    let queue = percentile_table(&metrics.queue_times, resolution);
    let launch = percentile_table(&metrics.launch_delays, resolution);
    let handoff = percentile_table(&metrics.handoff_gaps, resolution);
    (0..resolution)
        .map(|i| PercentileRow {
            fraction: response[i].0,
            response: response[i].1,
            network: network[i].1,
            service: service[i].1,
            queue: queue[i].1,
            launch: launch[i].1,
            handoff: handoff[i].1,
        })
        .collect()
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help::new(&formatters, &aliases, FMT_DEFAULTS)
}

const FMT_DEFAULTS: &str = "percentile,response,network,service,queue,launch";

fn my_formatters() -> (format::Formatters<PercentileRow, bool>, format::Aliases) {
    let mut formatters: format::Formatters<PercentileRow, bool> = HashMap::new();
    let mut aliases: format::Aliases = HashMap::new();
    formatters.insert("percentile".to_string(), &format_percentile);
    formatters.insert("response".to_string(), &format_response);
    formatters.insert("network".to_string(), &format_network);
    formatters.insert("service".to_string(), &format_service);
    formatters.insert("queue".to_string(), &format_queue);
    formatters.insert("launch".to_string(), &format_launch);
    formatters.insert("handoff".to_string(), &format_handoff);
    aliases.insert(
        "all".to_string(),
        vec![
            "percentile".to_string(),
            "response".to_string(),
            "network".to_string(),
            "service".to_string(),
            "queue".to_string(),
            "launch".to_string(),
            "handoff".to_string(),
        ],
    );

    (formatters, aliases)
}

fn format_percentile(r: &PercentileRow, _: bool) -> String {
    format!("{:.3}", r.fraction)
}

fn format_response(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.response, nodefaults)
}

fn format_network(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.network, nodefaults)
}

fn format_service(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.service, nodefaults)
}

fn format_queue(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.queue, nodefaults)
}

fn format_launch(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.launch, nodefaults)
}

fn format_handoff(r: &PercentileRow, nodefaults: bool) -> String {
    crate::format_opt_millis(r.handoff, nodefaults)
}

#[test]
fn test_percentiles() {
    let config = AnalysisConfig {
        percentile_resolution: 4,
        ..Default::default()
    };
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/reservation-trace.log", &config);
    let mut out = vec![];
    print(
        &mut out,
        &Some("percentile,response,queue,csv".to_string()),
        &metrics,
        &config,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "0.000,70,3\n0.250,300,3.5\n0.500,530,4\n0.750,760,4.5\n");

    // Nothing to say about the handoff gaps in a trace without them.
    let (_, metrics) = crate::analyze_fixture("../tests/auditlog/probe-trace.log", &config);
    let rows = percentile_rows(&metrics, 4);
    assert!(rows.len() == 4);
    assert!(rows.iter().all(|r| r.handoff.is_none()));
    assert!(rows[0].service == Some(22.0));
}
