/// Analysis policy, and reading it from a JSON configuration file.
///
/// The trace formats have changed over time and the tools that consumed them have not agreed on
/// every detail.  Where they disagree, the choice is a named policy here rather than something
/// buried in the code.
///
/// File format: an object { ... } with the following optional fields:
///
///   duplicates - string, "keep-first" or "overwrite": what a second write to a set-once field does
///   incorporate-skew - bool, whether response times are corrected for estimated clock skew
///   hop-processing-ms - number, assumed processing time at the intermediate hop of a round trip
///   percentile-resolution - integer, number of rows in a percentile table
///   file-pattern - string, substring that names audit files when scanning a directory
///   trim-start-ms - integer, arrivals this close to the first arrival are outside the window
///   trim-end-ms - integer, arrivals this close to the last arrival are outside the window
///
/// Any field name starting with '#' is reserved for arbitrary comments.
use anyhow::{bail, Result};
use log::warn;
use rustutils::{read_config_fields, ConfigFields, TimeDelta};
use std::fmt;

use crate::diagnostics::{Conflict, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    KeepFirst,
    Overwrite,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DuplicatePolicy::KeepFirst => "first value kept",
            DuplicatePolicy::Overwrite => "latest value kept",
        })
    }
}

impl DuplicatePolicy {
    /// Store `value` in a set-once `slot`.  Any previous value, even an equal one, is reported as a
    /// conflict; whether the new value replaces it is up to the policy.

    pub fn assign<T>(self, slot: &mut Option<T>, value: T, field: Field) -> Option<Conflict>
    where
        T: Copy + fmt::Display,
    {
        match *slot {
            None => {
                *slot = Some(value);
                None
            }
            Some(old) => {
                if self == DuplicatePolicy::Overwrite {
                    *slot = Some(value);
                }
                Some(Conflict {
                    field,
                    old: old.to_string(),
                    new: value.to_string(),
                })
            }
        }
    }
}

/// The older analysis tool overwrote on a second write.

pub const DEFAULT_DUPLICATE_POLICY: DuplicatePolicy = DuplicatePolicy::Overwrite;

/// Processing time at the remote end of a round trip is assumed to be negligible.

pub const ASSUMED_HOP_PROCESSING_MS: f64 = 0.0;

pub const DEFAULT_PERCENTILE_RESOLUTION: usize = 100;

pub const DEFAULT_FILE_PATTERN: &str = "sparrow_audit";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub duplicate_policy: DuplicatePolicy,
    pub incorporate_skew: bool,
    pub hop_processing_ms: f64,
    pub percentile_resolution: usize,
    pub file_pattern: String,
    pub trim_start_ms: TimeDelta,
    pub trim_end_ms: TimeDelta,
}

impl Default for AnalysisConfig {
    fn default() -> AnalysisConfig {
        AnalysisConfig {
            duplicate_policy: DEFAULT_DUPLICATE_POLICY,
            incorporate_skew: true,
            hop_processing_ms: ASSUMED_HOP_PROCESSING_MS,
            percentile_resolution: DEFAULT_PERCENTILE_RESOLUTION,
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            trim_start_ms: 0,
            trim_end_ms: 0,
        }
    }
}

const KNOWN_FIELDS: [&str; 7] = [
    "duplicates",
    "incorporate-skew",
    "hop-processing-ms",
    "percentile-resolution",
    "file-pattern",
    "trim-start-ms",
    "trim-end-ms",
];

pub fn read_analysis_config(filename: &str) -> Result<AnalysisConfig> {
    analysis_config_from_fields(&read_config_fields(filename)?)
}

/// Fields not present keep their default values.  Unknown fields are ignored with a warning, they
/// are most likely misspellings.

pub fn analysis_config_from_fields(fields: &ConfigFields) -> Result<AnalysisConfig> {
    let mut cfg: AnalysisConfig = Default::default();
    for name in fields.names() {
        if !KNOWN_FIELDS.contains(&name.as_str()) {
            warn!("Ignoring unknown configuration field '{name}'");
        }
    }
    if let Some(s) = fields.grab_string_opt("duplicates")? {
        cfg.duplicate_policy = match s.as_str() {
            "keep-first" => DuplicatePolicy::KeepFirst,
            "overwrite" => DuplicatePolicy::Overwrite,
            _ => bail!("Field 'duplicates' must be \"keep-first\" or \"overwrite\""),
        }
    }
    if let Some(b) = fields.grab_bool_opt("incorporate-skew")? {
        cfg.incorporate_skew = b;
    }
    if let Some(ms) = fields.grab_f64_opt("hop-processing-ms")? {
        if ms < 0.0 {
            bail!("Field 'hop-processing-ms' must not be negative");
        }
        cfg.hop_processing_ms = ms;
    }
    if let Some(n) = fields.grab_usize_opt("percentile-resolution")? {
        if n == 0 {
            bail!("Field 'percentile-resolution' must be positive");
        }
        cfg.percentile_resolution = n;
    }
    if let Some(s) = fields.grab_string_opt("file-pattern")? {
        cfg.file_pattern = s;
    }
    if let Some(ms) = fields.grab_i64_opt("trim-start-ms")? {
        cfg.trim_start_ms = ms;
    }
    if let Some(ms) = fields.grab_i64_opt("trim-end-ms")? {
        cfg.trim_end_ms = ms;
    }
    Ok(cfg)
}

#[test]
fn test_assign() {
    let mut slot = None;
    assert!(DuplicatePolicy::KeepFirst
        .assign(&mut slot, 5i64, Field::Completed)
        .is_none());
    let c = DuplicatePolicy::KeepFirst
        .assign(&mut slot, 7i64, Field::Completed)
        .unwrap();
    assert!(slot == Some(5));
    assert!(c.old == "5" && c.new == "7" && c.field == Field::Completed);
    let c = DuplicatePolicy::Overwrite
        .assign(&mut slot, 7i64, Field::Completed)
        .unwrap();
    assert!(slot == Some(7));
    assert!(c.old == "5");

    // An equal value is still reported, and changes nothing under either policy.
    assert!(DuplicatePolicy::Overwrite
        .assign(&mut slot, 7i64, Field::Completed)
        .is_some());
    assert!(slot == Some(7));
}

// Whitebox test of the config file reader, the fixture sets every field.

#[test]
fn test_read_analysis_config() {
    let cfg = read_analysis_config("../tests/auditlog/analysis-config.json").unwrap();
    assert!(cfg.duplicate_policy == DuplicatePolicy::KeepFirst);
    assert!(!cfg.incorporate_skew);
    assert!(cfg.hop_processing_ms == 2.0);
    assert!(cfg.percentile_resolution == 20);
    assert!(cfg.file_pattern == "audit");
    assert!(cfg.trim_start_ms == 1000);
    assert!(cfg.trim_end_ms == 500);
}

#[test]
fn test_analysis_config_defaults_and_errors() {
    use rustutils::config_fields_from_str;

    let cfg = analysis_config_from_fields(&config_fields_from_str(r##"{"#": "x"}"##).unwrap())
        .unwrap();
    assert!(cfg == AnalysisConfig::default());
    assert!(cfg.duplicate_policy == DuplicatePolicy::Overwrite);
    assert!(cfg.incorporate_skew);
    assert!(cfg.hop_processing_ms == 0.0);

    let bad = [
        r#"{"duplicates": "sometimes"}"#,
        r#"{"hop-processing-ms": -1}"#,
        r#"{"percentile-resolution": 0}"#,
        r#"{"incorporate-skew": "yes"}"#,
    ];
    for text in bad {
        assert!(analysis_config_from_fields(&config_fields_from_str(text).unwrap()).is_err());
    }
}
