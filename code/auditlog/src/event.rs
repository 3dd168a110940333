/// Parser for a single audit trace line.
///
/// A line has three tab-separated fields: a class (the name of the component that logged it, which
/// is not used), an integer timestamp in milliseconds since the epoch, and a descriptor.  The
/// descriptor is colon-separated; its first token is the event kind and the rest are the event's
/// parameters, in order.  For example:
///
///   audit	1357000000123	task_start:r1:t1
///
/// The parameters borrow from the line, so an Event is only valid while the line is.  Nothing keeps
/// events around after they have been dispatched.
use rustutils::Timestamp;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, PartialEq)]
pub struct Event<'a> {
    pub kind: &'a str,
    pub timestamp: Timestamp,
    pub params: Vec<&'a str>,
}

#[derive(Error, Debug, PartialEq)]
pub enum LineError {
    #[error("expected 3 tab-separated fields, found {0}")]
    FieldCount(usize),

    #[error("bad timestamp '{0}'")]
    Timestamp(String),

    #[error("empty event kind")]
    EmptyKind,
}

/// Parse one line.  A blank line is not an error and yields Ok(None).

pub fn parse_line(line: &str) -> Result<Option<Event<'_>>, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(None);
    }
    let fields = line.split('\t').collect::<Vec<&str>>();
    if fields.len() != 3 {
        return Err(LineError::FieldCount(fields.len()));
    }
    let timestamp = match Timestamp::from_str(fields[1].trim()) {
        Ok(t) => t,
        Err(_) => return Err(LineError::Timestamp(fields[1].to_string())),
    };
    let mut tokens = fields[2].split(':');
    let kind = tokens.next().unwrap_or_default();
    if kind.is_empty() {
        return Err(LineError::EmptyKind);
    }
    Ok(Some(Event {
        kind,
        timestamp,
        params: tokens.collect(),
    }))
}

#[test]
fn test_parse_line() {
    let e = parse_line("audit\t1357000000123\ttask_start:r1:t1\n")
        .unwrap()
        .unwrap();
    assert!(e.kind == "task_start");
    assert!(e.timestamp == 1357000000123);
    assert!(e.params == vec!["r1", "t1"]);

    // Empty trailing parameters are preserved, the dispatcher decides what they mean.
    let e = parse_line("audit\t5\ttask_launch:r:t:n1::\r\n")
        .unwrap()
        .unwrap();
    assert!(e.params == vec!["r", "t", "n1", "", ""]);

    let e = parse_line("x\t-7\tarrived").unwrap().unwrap();
    assert!(e.timestamp == -7 && e.params.is_empty());
}

#[test]
fn test_parse_line_errors() {
    assert!(parse_line("").unwrap().is_none());
    assert!(parse_line("\r\n").unwrap().is_none());
    assert!(parse_line("garbage") == Err(LineError::FieldCount(1)));
    assert!(parse_line("a\t1\tb\tc") == Err(LineError::FieldCount(4)));
    assert!(parse_line("a\tabc\tb:c") == Err(LineError::Timestamp("abc".to_string())));
    assert!(parse_line("a\t1\t:r1") == Err(LineError::EmptyKind));
    assert!(parse_line("a\t1\t") == Err(LineError::EmptyKind));
}
