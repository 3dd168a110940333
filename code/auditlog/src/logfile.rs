/// Reading audit files into the registry.
///
/// NOTE:
///
/// - A bad line is never fatal.  It is recorded as a diagnostic and skipped, and reading continues
///   with the next line.  Trace files are appended to by running daemons and the last line of a
///   file may well be partly written.
///
/// - A line that is not UTF8 is a bad line like any other.  Lines are read as bytes so that one
///   such line does not stop the reading of the file.
use crate::configs::DuplicatePolicy;
use crate::diagnostics::{Diagnostic, Diagnostics, Location};
use crate::dispatch::ingest_line;
use crate::registry::TraceRegistry;

use anyhow::Result;
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Parse an audit file into `registry`.  Return an error in the case of I/O errors, and otherwise
/// the number of discarded lines; the reasons for discarding them are in `diags`.

pub fn parse_logfile(
    file_name: &str,
    registry: &mut TraceRegistry,
    policy: DuplicatePolicy,
    diags: &mut Diagnostics,
) -> Result<usize> {
    let file = File::open(file_name)?;
    let mut reader = BufReader::new(file);
    let mut buf = vec![];
    let mut discarded = 0;
    let mut lineno = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lineno += 1;
        let location = Location {
            file: Some(file_name.to_string()),
            line: lineno,
        };
        match std::str::from_utf8(&buf) {
            Ok(line) => {
                if !ingest_line(registry, line, &location, policy, diags) {
                    discarded += 1;
                }
            }
            Err(_) => {
                diags.record(Diagnostic::MalformedInput {
                    location,
                    reason: "not UTF8".to_string(),
                });
                discarded += 1;
            }
        }
    }
    Ok(discarded)
}

/// Read all the files into a fresh registry.  The order of the files does not matter.

pub fn read_logfiles(
    logfiles: &[String],
    policy: DuplicatePolicy,
) -> Result<(TraceRegistry, Diagnostics)> {
    let mut registry = TraceRegistry::new();
    let mut diags = Diagnostics::new();
    let mut discarded = 0;
    for file in logfiles {
        discarded += parse_logfile(file, &mut registry, policy, &mut diags)?;
    }
    info!(
        "Read {} files: {} requests, {} lines discarded",
        logfiles.len(),
        registry.len(),
        discarded
    );
    Ok((registry, diags))
}

#[test]
fn test_parse_logfile() {
    use crate::diagnostics::DiagnosticKind;

    let mut reg = TraceRegistry::new();
    let mut diags = Diagnostics::new();
    let discarded = parse_logfile(
        "../tests/auditlog/probe-trace.log",
        &mut reg,
        DuplicatePolicy::Overwrite,
        &mut diags,
    )
    .unwrap();
    assert!(discarded == 3);
    assert!(diags.count(DiagnosticKind::MalformedInput) == 2);
    assert!(diags.count(DiagnosticKind::UnknownEventKind) == 1);
    assert!(reg.len() == 2);
    match &diags.entries()[0] {
        Diagnostic::MalformedInput { location, .. } => {
            assert!(location.file.as_deref() == Some("../tests/auditlog/probe-trace.log"));
        }
        _ => panic!("Expected malformed input"),
    }
}

#[test]
fn test_parse_logfile_missing() {
    let mut reg = TraceRegistry::new();
    let mut diags = Diagnostics::new();
    assert!(parse_logfile(
        "../tests/auditlog/no-such-file.log",
        &mut reg,
        DuplicatePolicy::Overwrite,
        &mut diags,
    )
    .is_err());
}

#[test]
fn test_read_logfiles_split_tree() {
    use crate::logtree::find_logfiles;

    // The scheduler's and the node's view of the same request, in separate files.
    let files = find_logfiles("../tests/auditlog/tree", "sparrow_audit").unwrap();
    let (reg, diags) = read_logfiles(&files, DuplicatePolicy::Overwrite).unwrap();
    assert!(diags.is_empty());
    assert!(reg.len() == 1);
    assert!(reg.request("s1").unwrap().is_complete());
}
