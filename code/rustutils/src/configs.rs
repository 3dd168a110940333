/// Access to small human-written JSON configuration files.
///
/// A configuration file is a single object { ... } with named fields.  Any field name starting with
/// '#' is reserved for arbitrary comments and is ignored, as is any field the reader does not ask
/// for.
///
/// Since the input is human-generated, may vary a lot over time, and have optional fields, I've
/// opted to use the generic JSON parser followed by explicit decoding of the fields, rather than a
/// (derived) strongly-typed parser.
use anyhow::{bail, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

pub struct ConfigFields {
    fields: serde_json::Map<String, Value>,
}

pub fn read_config_fields(filename: &str) -> Result<ConfigFields> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    config_fields_from_value(serde_json::from_reader(reader)?)
}

pub fn config_fields_from_str(text: &str) -> Result<ConfigFields> {
    config_fields_from_value(serde_json::from_str(text)?)
}

fn config_fields_from_value(v: Value) -> Result<ConfigFields> {
    if let Value::Object(fields) = v {
        Ok(ConfigFields { fields })
    } else {
        bail!("Expected an object value")
    }
}

impl ConfigFields {
    pub fn grab_string_opt(&self, name: &str) -> Result<Option<String>> {
        match self.fields.get(name) {
            Some(Value::String(s)) => Ok(Some(s.to_string())),
            Some(_) => bail!("Field '{name}' must have a string value"),
            None => Ok(None),
        }
    }

    pub fn grab_bool_opt(&self, name: &str) -> Result<Option<bool>> {
        match self.fields.get(name) {
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => bail!("Field '{name}' must have a boolean value"),
            None => Ok(None),
        }
    }

    pub fn grab_usize_opt(&self, name: &str) -> Result<Option<usize>> {
        match self.fields.get(name) {
            Some(Value::Number(n)) => {
                if let Some(n) = n.as_u64() {
                    match usize::try_from(n) {
                        Ok(n) => Ok(Some(n)),
                        Err(_e) => bail!("Field '{name}' must have unsigned integer value"),
                    }
                } else {
                    bail!("Field '{name}' must have unsigned integer value")
                }
            }
            Some(_) => bail!("Field '{name}' must have unsigned integer value"),
            None => Ok(None),
        }
    }

    pub fn grab_i64_opt(&self, name: &str) -> Result<Option<i64>> {
        match self.fields.get(name) {
            Some(Value::Number(n)) => {
                if let Some(n) = n.as_i64() {
                    Ok(Some(n))
                } else {
                    bail!("Field '{name}' must have integer value")
                }
            }
            Some(_) => bail!("Field '{name}' must have integer value"),
            None => Ok(None),
        }
    }

    pub fn grab_f64_opt(&self, name: &str) -> Result<Option<f64>> {
        match self.fields.get(name) {
            Some(Value::Number(n)) => {
                if let Some(n) = n.as_f64() {
                    Ok(Some(n))
                } else {
                    bail!("Field '{name}' must have a numeric value")
                }
            }
            Some(_) => bail!("Field '{name}' must have a numeric value"),
            None => Ok(None),
        }
    }

    /// The names of all non-comment fields, sorted.

    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .fields
            .keys()
            .filter(|k| !k.starts_with('#'))
            .cloned()
            .collect::<Vec<String>>();
        names.sort();
        names
    }
}

#[test]
fn test_config_fields() {
    let conf = config_fields_from_str(
        r##"{"#": "comment", "name": "x", "flag": true, "n": 7, "d": -3, "f": 0.5}"##,
    )
    .unwrap();
    assert!(conf.grab_string_opt("name").unwrap() == Some("x".to_string()));
    assert!(conf.grab_string_opt("nope").unwrap().is_none());
    assert!(conf.grab_bool_opt("flag").unwrap() == Some(true));
    assert!(conf.grab_usize_opt("n").unwrap() == Some(7));
    assert!(conf.grab_usize_opt("d").is_err());
    assert!(conf.grab_i64_opt("d").unwrap() == Some(-3));
    assert!(conf.grab_f64_opt("f").unwrap() == Some(0.5));
    assert!(conf.grab_f64_opt("n").unwrap() == Some(7.0));
    assert!(conf.grab_bool_opt("name").is_err());
    assert!(conf.names() == vec!["d", "f", "flag", "n", "name"]);
}

#[test]
fn test_config_not_object() {
    assert!(config_fields_from_str("[1,2]").is_err());
    assert!(config_fields_from_str("{").is_err());
}
