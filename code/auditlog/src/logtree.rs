/// Enumerate audit files in a data directory.
use anyhow::{bail, Result};
use std::path;

/// Find the audit files directly inside `data_path`: regular files whose name contains `pattern`.
/// The directory is not searched recursively.  The returned names are sorted lexicographically.
///
/// This returns an error if `data_path` does not name a directory or cannot be read.  It does not
/// return an error if the files cannot be read; that has to be handled later.
///
/// File names that are not representable as UTF8 are ignored.

pub fn find_logfiles(data_path: &str, pattern: &str) -> Result<Vec<String>> {
    let p = path::Path::new(data_path);
    if !p.is_dir() {
        bail!("Not a viable data directory: {data_path}");
    }

    let mut filenames = vec![];
    for entry in p.read_dir()? {
        let Ok(entry) = entry else {
            // Bad directory entries are ignored, as for a log tree.
            continue;
        };
        let p = entry.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains(pattern) {
            continue;
        }
        if let Some(pstr) = p.to_str() {
            filenames.push(pstr.to_string());
        }
    }
    filenames.sort();
    Ok(filenames)
}

#[test]
fn test_find_logfiles() {
    // The tree has a subdirectory whose name matches, and a file that does not match.
    let xs = find_logfiles("../tests/auditlog/tree", "sparrow_audit").unwrap();
    assert!(xs.eq(&vec![
        "../tests/auditlog/tree/node1_sparrow_audit.log",
        "../tests/auditlog/tree/sched_sparrow_audit.log",
    ]));

    let xs = find_logfiles("../tests/auditlog/tree", "sched").unwrap();
    assert!(xs.eq(&vec!["../tests/auditlog/tree/sched_sparrow_audit.log"]));
}

#[test]
fn test_find_logfiles_not_a_directory() {
    assert!(find_logfiles("../tests/auditlog/probe-trace.log", "").is_err());
    assert!(find_logfiles("../tests/auditlog/no-such-dir", "").is_err());
}
