/// Extraction of flat metric sequences from a finalized registry.
///
/// The window is a closed interval on request arrival time.  Per-task and per-request timings are
/// taken from complete requests inside the window only.  Network round trips and skew samples don't
/// need the request to be complete, just to be inside the window.  Queue-length series and launch
/// curves are not windowed.
///
/// Every sequence is sorted ascending, ready for the percentile functions.
///
/// Findings about skew made while computing response times go in the `diagnostics` of the result,
/// so that extracting again, say for another window, does not count them twice.
use crate::configs::AnalysisConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::registry::TraceRegistry;
use crate::request::Request;
use crate::task::SkewSource;

use log::{info, warn};
use rustutils::{TimeDelta, Timestamp};
use ustr::Ustr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn all() -> Window {
        Window {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    pub fn new(start: Timestamp, end: Timestamp) -> Window {
        Window { start, end }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }

    /// Cut `lead_ms` off the beginning and `tail_ms` off the end of the range of arrival times in
    /// the registry, to drop the warm-up and drain periods of an experiment.  If that leaves
    /// nothing, the window is empty.

    pub fn trimmed(registry: &TraceRegistry, lead_ms: TimeDelta, tail_ms: TimeDelta) -> Window {
        match registry.arrival_bounds() {
            Some((first, last)) => Window {
                start: first.saturating_add(lead_ms),
                end: last.saturating_sub(tail_ms),
            },
            None => Window::all(),
        }
    }

    /// The intersection of two windows.

    pub fn within(&self, other: &Window) -> Window {
        Window {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
    }
}

/// One observation of the offset between two clocks: the number of milliseconds by which
/// `second`'s clock is ahead of `first`'s, where `first` < `second`.  Ordering the pair makes
/// samples taken in either direction comparable.

#[derive(Debug, Clone, PartialEq)]
pub struct SkewSample {
    pub first: Ustr,
    pub second: Ustr,
    pub skew: f64,
    pub arrival: Timestamp,
}

impl SkewSample {
    /// `node_ahead` is the number of milliseconds by which the node is ahead of the scheduler.

    pub fn new(scheduler: Ustr, node: Ustr, node_ahead: f64, arrival: Timestamp) -> SkewSample {
        if node > scheduler {
            SkewSample {
                first: scheduler,
                second: node,
                skew: node_ahead,
                arrival,
            }
        } else {
            SkewSample {
                first: node,
                second: scheduler,
                skew: -node_ahead,
                arrival,
            }
        }
    }
}

/// Tasks launched against time since the request arrived: for each task, in order of assignment,
/// the assignment's offset from arrival and the number of tasks assigned so far.

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCurve {
    pub request: Ustr,
    pub arrival: Timestamp,
    pub points: Vec<(TimeDelta, usize)>,
}

/// What happened to the requests in the registry.  `outside_window` is always `complete - windowed`
/// and `incomplete` is `total - complete`.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exclusions {
    pub total: usize,
    pub complete: usize,
    pub windowed: usize,
    pub outside_window: usize,
    pub incomplete: usize,
    pub unmeasured: usize,
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub response_times: Vec<f64>,
    pub service_times: Vec<f64>,
    pub queue_times: Vec<f64>,
    pub launch_delays: Vec<f64>,
    pub network_round_trips: Vec<f64>,
    pub handoff_gaps: Vec<f64>,
    pub skew_samples: Vec<SkewSample>,
    pub queue_lengths: Vec<(Ustr, Vec<(Timestamp, usize)>)>,
    pub launch_curves: Vec<LaunchCurve>,
    pub exclusions: Exclusions,
    pub diagnostics: Diagnostics,
}

pub fn extract_metrics(
    registry: &TraceRegistry,
    window: &Window,
    config: &AnalysisConfig,
) -> Metrics {
    if !registry.is_finalized() {
        warn!("Extracting metrics from a registry that has not been finalized, skew is unknown");
    }
    let mut m: Metrics = Default::default();
    let requests = registry.sorted_requests();
    m.exclusions.total = requests.len();

    for r in &requests {
        let complete = r.is_complete();
        if complete {
            m.exclusions.complete += 1;
        } else {
            m.exclusions.incomplete += 1;
        }
        if let Some(curve) = launch_curve(r) {
            m.launch_curves.push(curve);
        }
        let Some(arrival) = r.arrival else {
            continue;
        };
        if !window.contains(arrival.time) {
            continue;
        }

        for (addr, rt) in &r.round_trips {
            if let Some(d) = rt.round_trip_time() {
                m.network_round_trips.push(d as f64);
            }
            if let Some(skew) = crate::skew::round_trip_skew(rt, config.hop_processing_ms) {
                m.skew_samples
                    .push(SkewSample::new(arrival.scheduler, *addr, skew, arrival.time));
            }
        }
        for task in r.tasks.values() {
            if let (Some(addr), Some(skew)) = (task.node_address, task.clock_skew) {
                if skew.source == SkewSource::GetTask {
                    m.skew_samples.push(SkewSample::new(
                        arrival.scheduler,
                        addr,
                        skew.millis,
                        arrival.time,
                    ));
                }
            }
        }

        if !complete {
            continue;
        }
        m.exclusions.windowed += 1;
        for task in r.tasks.values() {
            if let Some(t) = task.service_time() {
                m.service_times.push(t as f64);
            }
            if let Some(t) = task.queue_time() {
                m.queue_times.push(t as f64);
            }
            if let Some(t) = task.launch_delay() {
                m.launch_delays.push(t);
            }
            if let (Some(prev), Some(requested)) = (task.previous, task.node_requested) {
                // The previous task must have run in the same slot, hence on the same node.
                if let Some(p) = registry.task(&prev) {
                    if let Some(done) = p.completed {
                        if p.node_address == task.node_address {
                            m.handoff_gaps.push((requested - done) as f64);
                        }
                    }
                }
            }
        }
        match r.response_time(config.incorporate_skew) {
            Ok(rt) => {
                for (task, adjusted) in rt.early_completions {
                    m.diagnostics.record(Diagnostic::SkewBeforeArrival {
                        request: r.id,
                        task,
                        adjusted,
                        arrival: arrival.time,
                    });
                }
                for task in rt.suspected_skew {
                    if let Some(t) = r.tasks.get(&task) {
                        if let (Some(assigned), Some(requested)) =
                            (t.scheduler_assigned, t.node_requested)
                        {
                            m.diagnostics.record(Diagnostic::SuspectedSkew {
                                request: r.id,
                                task,
                                assigned,
                                requested,
                            });
                        }
                    }
                }
                m.response_times.push(rt.millis);
            }
            Err(_) => m.exclusions.unmeasured += 1,
        }
    }
    m.exclusions.outside_window = m.exclusions.complete - m.exclusions.windowed;

    for xs in [
        &mut m.response_times,
        &mut m.service_times,
        &mut m.queue_times,
        &mut m.launch_delays,
        &mut m.network_round_trips,
        &mut m.handoff_gaps,
    ] {
        xs.sort_by(|a, b| a.total_cmp(b));
    }
    m.skew_samples.sort_by(|a, b| {
        (a.first, a.second)
            .cmp(&(b.first, b.second))
            .then_with(|| a.skew.total_cmp(&b.skew))
            .then_with(|| a.arrival.cmp(&b.arrival))
    });

    m.queue_lengths = registry
        .queue_lengths()
        .iter()
        .map(|(addr, samples)| (*addr, samples.clone()))
        .collect();
    m.queue_lengths.sort_by(|a, b| a.0.cmp(&b.0));

    info!(
        "{} requests: {} complete, {} in window, {} without response time",
        m.exclusions.total, m.exclusions.complete, m.exclusions.windowed, m.exclusions.unmeasured
    );
    m
}

fn launch_curve(r: &Request) -> Option<LaunchCurve> {
    let arrival = r.arrival?;
    let mut offsets = r
        .tasks
        .values()
        .filter_map(|t| t.scheduler_assigned)
        .map(|t| t - arrival.time)
        .collect::<Vec<TimeDelta>>();
    if offsets.is_empty() {
        return None;
    }
    offsets.sort();
    Some(LaunchCurve {
        request: r.id,
        arrival: arrival.time,
        points: offsets
            .into_iter()
            .enumerate()
            .map(|(i, d)| (d, i + 1))
            .collect(),
    })
}

#[test]
fn test_window() {
    let w = Window::new(10, 20);
    assert!(w.contains(10) && w.contains(20) && !w.contains(21) && !w.contains(9));
    assert!(Window::all().contains(Timestamp::MIN));
    assert!(w.within(&Window::new(15, 30)) == Window::new(15, 20));

    let reg = TraceRegistry::new();
    assert!(Window::trimmed(&reg, 5, 5) == Window::all());
}

#[test]
fn test_skew_sample_orientation() {
    let s = SkewSample::new(Ustr::from("sched1"), Ustr::from("n1"), 10.0, 7);
    assert!(s.first.as_str() == "n1" && s.second.as_str() == "sched1" && s.skew == -10.0);
    let s = SkewSample::new(Ustr::from("a"), Ustr::from("n1"), 10.0, 7);
    assert!(s.first.as_str() == "a" && s.second.as_str() == "n1" && s.skew == 10.0);
}

// One task: arrival at 0, assigned at 10, requested at 12, started at 15, completed at 40, and
// nothing known about the skew.

#[test]
fn test_single_task_example() {
    use crate::configs::DuplicatePolicy;
    use crate::dispatch::ingest;
    use crate::request::Incomplete;
    use crate::skew::finalize;

    let lines = [
        "audit\t0\tarrived:r1:1:s",
        "audit\t10\tscheduler_launch:r1:t1",
        "audit\t12\tnodemonitor_launch_start:r1:n1:t1",
        "audit\t15\ttask_start:r1:t1",
        "audit\t40\ttask_completion:r1:t1",
    ];
    let mut reg = TraceRegistry::new();
    let mut diags = ingest(&mut reg, lines, DuplicatePolicy::Overwrite);
    let config = AnalysisConfig::default();
    finalize(&mut reg, &config, &mut diags);
    let r = reg.request("r1").unwrap();
    assert!(r.is_complete());
    assert!(r.response_time(true) == Err(Incomplete::UnknownSkew(Ustr::from("t1"))));
    assert!(r.response_time(false).unwrap().millis >= 40.0);

    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.queue_times == vec![3.0]);
    assert!(m.service_times == vec![25.0]);
    assert!(m.response_times.is_empty());
    assert!(m.exclusions.unmeasured == 1);

    let config = AnalysisConfig {
        incorporate_skew: false,
        ..Default::default()
    };
    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.response_times == vec![40.0]);
    assert!(m.exclusions.unmeasured == 0);
    assert!(m.launch_curves[0].points == vec![(10, 1)]);
}

#[cfg(test)]
fn read_fixture(file: &str, config: &AnalysisConfig) -> (TraceRegistry, Diagnostics) {
    use crate::logfile::read_logfiles;
    use crate::skew::finalize;

    let (mut reg, mut diags) = read_logfiles(&[file.to_string()], config.duplicate_policy).unwrap();
    finalize(&mut reg, config, &mut diags);
    (reg, diags)
}

#[test]
fn test_probe_trace_metrics() {
    use crate::diagnostics::DiagnosticKind;

    let config = AnalysisConfig::default();
    let (reg, diags) = read_fixture("../tests/auditlog/probe-trace.log", &config);
    assert!(diags.count(DiagnosticKind::SkewEstimationUnavailable) == 0);
    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.response_times == vec![50.0]);
    assert!(m.queue_times == vec![2.0, 3.0]);
    assert!(m.service_times == vec![22.0, 41.0]);
    assert!(m.launch_delays == vec![1.0, 1.0]);
    assert!(m.network_round_trips == vec![2.0, 2.0, 2.0]);
    assert!(m.handoff_gaps.is_empty());
    let skews = m
        .skew_samples
        .iter()
        .map(|s| (s.first.as_str(), s.second.as_str(), s.skew, s.arrival))
        .collect::<Vec<_>>();
    assert!(
        skews
            == vec![
                ("n1", "sched1", -10.0, 1000),
                ("n1", "sched1", -10.0, 2000),
                ("n2", "sched1", 4.0, 1000)
            ]
    );
    assert!(
        m.exclusions
            == Exclusions {
                total: 2,
                complete: 1,
                windowed: 1,
                outside_window: 0,
                incomplete: 1,
                unmeasured: 0,
            }
    );
    assert!(m.diagnostics.is_empty());

    // Without skew, the node-local completion times are used as they are, and the task whose
    // node clock is behind looks like it was requested before it was assigned.
    let config = AnalysisConfig {
        incorporate_skew: false,
        ..Default::default()
    };
    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.response_times == vec![46.0]);
    assert!(m.diagnostics.count(DiagnosticKind::SuspectedSkew) == 1);

    // A second extraction reports the same findings again in its own result, and leaves the
    // ingestion diagnostics alone.
    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.diagnostics.len() == 1);
    assert!(m.diagnostics.count(DiagnosticKind::SuspectedSkew) == 1);
    assert!(diags.count(DiagnosticKind::SuspectedSkew) == 0);
}

#[test]
fn test_reservation_trace_metrics() {
    let config = AnalysisConfig::default();
    let (reg, diags) = read_fixture("../tests/auditlog/reservation-trace.log", &config);
    assert!(diags.is_empty());

    let q1 = reg.request("q1").unwrap();
    let a = &q1.tasks[&Ustr::from("a")];
    let b = &q1.tasks[&Ustr::from("b")];
    assert!(a.clock_skew.unwrap().source == SkewSource::GetTask);
    assert!(a.clock_skew.unwrap().millis == 20.0);
    assert!(b.clock_skew.unwrap().source == SkewSource::RoundTrip);
    assert!(b.node_requested == Some(5010));

    let m = extract_metrics(&reg, &Window::all(), &config);
    assert!(m.response_times == vec![70.0, 990.0]);
    assert!(m.queue_times == vec![3.0, 4.0, 5.0]);
    assert!(m.service_times == vec![45.0, 56.0, 987.0]);
    assert!(m.launch_delays == vec![-1.0, -1.0, -1.0]);
    assert!(m.handoff_gaps == vec![20.0]);
    assert!(m.skew_samples.len() == 4);
    assert!(m.exclusions.complete == 2 && m.exclusions.windowed == 2);
    let n2 = Ustr::from("n2");
    assert!(m.queue_lengths.len() == 2);
    assert!(m.queue_lengths[1] == (n2, vec![(4500, 3), (5002, 0)]));
    let curves = m
        .launch_curves
        .iter()
        .map(|c| (c.request.as_str(), c.points.clone()))
        .collect::<Vec<_>>();
    assert!(curves == vec![("q0", vec![(1, 1)]), ("q1", vec![(11, 1), (11, 2)])]);

    // q0 arrives before the window.  Its handoff to q1 still counts, as q1 is inside.
    let m = extract_metrics(&reg, &Window::new(4500, 6000), &config);
    assert!(m.exclusions.complete == 2);
    assert!(m.exclusions.windowed == 1);
    assert!(m.exclusions.outside_window == 1);
    assert!(m.response_times == vec![70.0]);
    assert!(m.handoff_gaps == vec![20.0]);
    assert!(m.skew_samples.len() == 3);

    // Trimming the first millisecond of the arrival range amounts to the same window.
    let w = Window::trimmed(&reg, 1, 0);
    assert!(w == Window::new(4001, 5000));
    let m = extract_metrics(&reg, &w, &config);
    assert!(m.exclusions.windowed == 1 && m.exclusions.outside_window == 1);
    assert!(m.diagnostics.is_empty());
}

#[test]
fn test_permutation_invariance() {
    use crate::configs::DuplicatePolicy;
    use crate::dispatch::ingest;
    use crate::skew::finalize;

    let text = std::fs::read_to_string("../tests/auditlog/reservation-trace.log").unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    let mut reversed = lines.clone();
    reversed.reverse();
    let mut rotated = lines.clone();
    rotated.rotate_left(lines.len() / 3);

    let config = AnalysisConfig::default();
    let mut results = vec![];
    for input in [lines, reversed, rotated] {
        let mut reg = TraceRegistry::new();
        let mut diags = ingest(&mut reg, input, DuplicatePolicy::KeepFirst);
        finalize(&mut reg, &config, &mut diags);
        assert!(diags.is_empty());
        let requests = reg
            .sorted_requests()
            .into_iter()
            .cloned()
            .collect::<Vec<Request>>();
        let mut queue_lengths = extract_metrics(&reg, &Window::all(), &config)
            .queue_lengths
            .into_iter()
            .map(|(addr, mut samples)| {
                samples.sort();
                (addr, samples)
            })
            .collect::<Vec<_>>();
        queue_lengths.sort();
        results.push((requests, queue_lengths));
    }
    assert!(results[0] == results[1]);
    assert!(results[0] == results[2]);
}

#[test]
fn test_double_ingestion() {
    use crate::diagnostics::DiagnosticKind;
    use crate::logfile::read_logfiles;
    use crate::skew::finalize;

    let file = "../tests/auditlog/reservation-trace.log".to_string();
    let config = AnalysisConfig::default();
    let (once, diags_once) = read_fixture(&file, &config);
    let (mut twice, mut diags_twice) =
        read_logfiles(&[file.clone(), file], config.duplicate_policy).unwrap();
    finalize(&mut twice, &config, &mut diags_twice);

    // Every field write is repeated; the rest of the diagnostics are the same.
    assert!(diags_twice.count(DiagnosticKind::DuplicateAssignment) > 0);
    assert!(
        diags_twice.len() - diags_twice.count(DiagnosticKind::DuplicateAssignment)
            == diags_once.len()
    );

    let m1 = extract_metrics(&once, &Window::all(), &config);
    let m2 = extract_metrics(&twice, &Window::all(), &config);
    assert!(m1.response_times == m2.response_times);
    assert!(m1.service_times == m2.service_times);
    assert!(m1.queue_times == m2.queue_times);
    assert!(m1.launch_delays == m2.launch_delays);
    assert!(m1.network_round_trips == m2.network_round_trips);
    assert!(m1.handoff_gaps == m2.handoff_gaps);
    assert!(m1.skew_samples == m2.skew_samples);
    assert!(m1.queue_lengths == m2.queue_lengths);
    assert!(m1.launch_curves == m2.launch_curves);
    assert!(m1.exclusions == m2.exclusions);
}
