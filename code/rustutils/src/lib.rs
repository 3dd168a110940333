// Misc utilities useful to both auditlog and auditalyze.

mod configs;
mod dates;

// A parsed JSON configuration object, and ways to get typed fields out of it.

pub use configs::ConfigFields;

// Read a JSON configuration object from a file.

pub use configs::read_config_fields;

// Ditto from a string.

pub use configs::config_fields_from_str;

// Types and utilities for manipulating epoch-millisecond timestamps.

pub use dates::TimeDelta;
pub use dates::Timestamp;

// Human-readable renditions of a Timestamp.

pub use dates::format_utc_short;
pub use dates::format_timestamp;

// Parse a &str given by a user into a Timestamp.

pub use dates::parse_timestamp;

// Parse a &str given by a user into a TimeDelta.

pub use dates::parse_duration;
