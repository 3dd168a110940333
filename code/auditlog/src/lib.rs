/// An audit trace is a set of text files written independently by the schedulers, the node
/// monitors and the task backends of a distributed task scheduler.  Each line is a timestamped
/// *event*, and events refer to *requests* (units of work that arrive at a scheduler), *tasks*
/// (the units a request is fanned out into, each run on one node), and *nodes* (by address).
///
/// Nothing orders the events: the files can be read in any order, the lines of a file are not
/// necessarily in time order, some events never make it to a file, and some appear twice.  Clocks
/// on different machines are not synchronized.
///
/// This library has as its fundamental task to reconstruct per-request, per-task timelines from the
/// events and derive latency metrics from them.  This breaks down into a number of subtasks:
///
/// - Find audit files in a data directory.
///
/// - Parse the lines into events and dispatch them to a registry of requests and tasks, creating
///   entities as they are first mentioned and reporting, but tolerating, bad and duplicated input.
///
/// - Finalize the registry once all input is in: estimate the clock skew of each task's node from
///   the paired timestamps in the trace.
///
/// - Extract flat, sorted metric sequences for a window of arrival times, and compute percentiles
///   over them.
mod configs;
mod diagnostics;
mod dispatch;
mod event;
mod logfile;
mod logtree;
mod metrics;
mod percentile;
mod registry;
mod request;
mod skew;
mod task;

// What to do about a second write to a set-once field, and the default.

pub use configs::DuplicatePolicy;
pub use configs::DEFAULT_DUPLICATE_POLICY;

// Assumed processing time at the far end of a timing bracket.

pub use configs::ASSUMED_HOP_PROCESSING_MS;

// Default number of rows in a percentile table.

pub use configs::DEFAULT_PERCENTILE_RESOLUTION;

// Audit files in a directory are recognized by this substring of their name.

pub use configs::DEFAULT_FILE_PATTERN;

// All the analysis policy in one place.

pub use configs::AnalysisConfig;

// Read an AnalysisConfig from a JSON file.

pub use configs::read_analysis_config;

// Decode an AnalysisConfig from already-parsed configuration fields.

pub use configs::analysis_config_from_fields;

// The diagnostic taxonomy, and the bag they are collected in.

pub use diagnostics::Diagnostic;
pub use diagnostics::DiagnosticKind;
pub use diagnostics::Diagnostics;

// Which field a duplicate assignment was to.

pub use diagnostics::Field;

// A second write to a set-once field, as reported by the setters.

pub use diagnostics::Conflict;

// File and line of a line-level diagnostic.

pub use diagnostics::Location;

// A parsed trace line.

pub use event::Event;

// Parse a trace line.

pub use event::parse_line;

// Why a trace line could not be parsed.

pub use event::LineError;

// Apply one event to the registry.

pub use dispatch::dispatch;

// Parse and apply one line.

pub use dispatch::ingest_line;

// Parse and apply a sequence of lines.

pub use dispatch::ingest;

// Read one audit file into a registry.

pub use logfile::parse_logfile;

// Read a set of audit files into a new registry.

pub use logfile::read_logfiles;

// Find the audit files in a directory.

pub use logtree::find_logfiles;

// The owner of all requests.

pub use registry::TraceRegistry;

// A request and its parts.

pub use request::Arrival;
pub use request::Request;
pub use request::RoundTrip;

// The result of computing a request's response time.

pub use request::Incomplete;
pub use request::ResponseTime;

// A task and its key.

pub use task::Task;
pub use task::TaskRef;

// A task's clock skew and where it came from.

pub use task::SkewEstimate;
pub use task::SkewSource;

// Skew estimates from individual pieces of evidence, and for a task.

pub use skew::estimate_task_skew;
pub use skew::get_task_skew;
pub use skew::round_trip_skew;

// Why there is no skew estimate for a task.

pub use skew::SkewUnavailable;

// Backfill and skew estimation after all input has been ingested.

pub use skew::finalize;

// Windowed metric extraction.

pub use metrics::extract_metrics;
pub use metrics::Exclusions;
pub use metrics::LaunchCurve;
pub use metrics::Metrics;
pub use metrics::SkewSample;
pub use metrics::Window;

// Interpolated percentiles.

pub use percentile::percentile;
pub use percentile::percentile_table;
pub use percentile::Summary;
