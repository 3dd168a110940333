/// Generic formatting code for rows of data to be presented columnar, as csv, as json, or as
/// space-separated awk input, and (except for json and awk) with or without a header and with or
/// without named fields.
///
/// The output is selected with a `--fmt` string: a comma-separated list of field names, aliases
/// for lists of field names, and control words.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

/// Formatters turn one row of data into the text for one field, given a context that is the same
/// for all rows.

pub type Formatters<DataT, CtxT> = HashMap<String, &'static dyn Fn(&DataT, CtxT) -> String>;
pub type Aliases = HashMap<String, Vec<String>>;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

impl Help {
    pub fn new<DataT, CtxT>(
        formatters: &Formatters<DataT, CtxT>,
        aliases: &Aliases,
        defaults: &str,
    ) -> Help {
        Help {
            fields: formatters.keys().cloned().collect(),
            aliases: aliases
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            defaults: defaults.to_string(),
        }
    }
}

/// If the --fmt string asks for help then print it and return true.

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    let Some(ref s) = fmt else {
        return false;
    };
    if !s.starts_with("help") {
        return false;
    }
    let mut help = f();
    println!("Syntax:\n  --fmt=(field|alias|control),...");
    println!("\nFields:");
    help.fields.sort();
    for f in help.fields {
        println!("  {f}");
    }
    if !help.aliases.is_empty() {
        println!("\nAliases:");
        help.aliases.sort();
        for (name, mut fields) in help.aliases {
            fields.sort();
            println!("  {name} --> {}", fields.join(","));
        }
    }
    println!("\nDefaults:\n  {}", help.defaults);
    println!("\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n  header\n  nodefaults\n  noheader\n  tag:<tagvalue>");
    true
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, CtxT>(
    spec: &'a str,
    formatters: &Formatters<DataT, CtxT>,
    aliases: &'a Aliases,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)> {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(expansion) = aliases.get(x) {
            for name in expansion {
                if formatters.contains_key(name) {
                    fields.push(name.as_ref());
                } else {
                    others.insert(name.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,       // json explicitly requested
    pub csv: bool,        // csv or csvnamed explicitly requested
    pub awk: bool,        // awk explicitly requested
    pub fixed: bool,      // fixed output explicitly requested
    pub named: bool,      // csvnamed explicitly requested
    pub header: bool,     // true if nothing requested b/c fixed+header is default
    pub nodefaults: bool, // if true and a field's text is "*skip*" then csv, json, awk omit it
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    let fixed = others.contains("fixed") && !csv && !json && !awk;
    let nodefaults = others.contains("nodefaults");
    // json and awk get no header, even if one is requested
    let header =
        (!csv && !json && !awk && !others.contains("noheader")) || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:"))
        .map(|t| t.to_string());
    FormatOptions {
        csv,
        json,
        awk,
        header,
        tag,
        fixed,
        named: csvnamed,
        nodefaults,
    }
}

/// Parse the --fmt string (or the defaults) and format `data` to `output` with it.

pub fn format_with<DataT, CtxT>(
    output: &mut dyn io::Write,
    fmt: &Option<String>,
    defaults: &str,
    formatters: &Formatters<DataT, CtxT>,
    aliases: &Aliases,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    CtxT: Copy,
{
    let spec = fmt.as_deref().unwrap_or(defaults);
    let (fields, others) = parse_fields(spec, formatters, aliases)?;
    let opts = standard_options(&others);
    format_data(output, &fields, formatters, &opts, data, ctx)
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format.
/// Set `opts.tag` to Some(s) to print a tag=s field in the output.

pub fn format_data<DataT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &Formatters<DataT, CtxT>,
    opts: &FormatOptions,
    data: &[DataT],
    ctx: CtxT,
) -> Result<()>
where
    CtxT: Copy,
{
    let fns = fields
        .iter()
        .filter_map(|kwd| formatters.get(*kwd))
        .collect::<Vec<_>>();
    let rows = data
        .iter()
        .map(|x| fns.iter().map(|f| f(x, ctx)).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        format_csv(output, fields, opts, rows)
    } else if opts.json {
        format_json(output, fields, opts, rows)
    } else if opts.awk {
        format_awk(output, opts, rows)
    } else {
        format_fixed_width(output, fields, opts, rows)
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    // The column width is the max across all the entries in the column (including header,
    // if present).  If there's a tag, it is printed in the last column.
    let mut widths = vec![0; fields.len()];
    if opts.header {
        for (w, kwd) in widths.iter_mut().zip(fields) {
            *w = kwd.len();
        }
    }
    for row in &rows {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    let mut emit = |vals: &[String], tag: Option<&str>| -> Result<()> {
        let mut s = "".to_string();
        for (val, &w) in vals.iter().zip(&widths) {
            s += format!("{:w$}  ", val).as_str();
        }
        if let Some(tag) = tag {
            s += tag;
        }
        output.write_all(s.trim_end().as_bytes())?;
        output.write_all(b"\n")?;
        Ok(())
    };

    if opts.header {
        let names = fields.iter().map(|k| k.to_string()).collect::<Vec<String>>();
        emit(&names, opts.tag.as_ref().map(|_| "tag"))?;
    }
    for row in &rows {
        emit(row, opts.tag.as_deref())?;
    }
    Ok(())
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        let mut out_fields = fields.iter().map(|k| k.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in rows {
        let mut out_fields = vec![];
        for (kwd, val) in fields.iter().zip(row) {
            if opts.nodefaults && val == "*skip*" {
                // do nothing
            } else if opts.named {
                out_fields.push(format!("{kwd}={val}"));
            } else {
                out_fields.push(val);
            }
        }
        if let Some(ref tag) = opts.tag {
            if opts.named {
                out_fields.push(format!("tag={tag}"));
            } else {
                out_fields.push(tag.clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    let mut objects = vec![];
    for row in rows {
        let mut obj = json::JsonValue::new_object();
        for (kwd, val) in fields.iter().zip(row) {
            if opts.nodefaults && val == "*skip*" {
                // do nothing
            } else {
                obj[*kwd] = val.into();
            }
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.to_string().into();
        }
        objects.push(obj);
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.

fn format_awk(
    output: &mut dyn io::Write,
    opts: &FormatOptions,
    rows: Vec<Vec<String>>,
) -> Result<()> {
    for row in rows {
        let mut vals = row
            .into_iter()
            .filter(|val| !(opts.nodefaults && val == "*skip*"))
            .map(|val| val.replace(' ', "_"))
            .collect::<Vec<String>>();
        if let Some(ref tag) = opts.tag {
            vals.push(tag.clone());
        }
        output.write_all((vals.join(" ") + "\n").as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
type TestDatum = (u32, &'static str);

#[cfg(test)]
fn format_n(d: &TestDatum, _: bool) -> String {
    d.0.to_string()
}

#[cfg(test)]
fn format_name(d: &TestDatum, nodefaults: bool) -> String {
    if d.1.is_empty() && nodefaults {
        "*skip*".to_string()
    } else {
        d.1.to_string()
    }
}

#[cfg(test)]
fn test_formatters() -> (Formatters<TestDatum, bool>, Aliases) {
    let mut formatters: Formatters<TestDatum, bool> = HashMap::new();
    formatters.insert("n".to_string(), &format_n);
    formatters.insert("name".to_string(), &format_name);
    let mut aliases = HashMap::new();
    aliases.insert("all".to_string(), vec!["n".to_string(), "name".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn format_to_string(spec: &str, nodefaults: bool) -> String {
    let (formatters, aliases) = test_formatters();
    let data = vec![(7, "x y"), (1234, "")];
    let mut out = vec![];
    format_with(
        &mut out,
        &Some(spec.to_string()),
        "all",
        &formatters,
        &aliases,
        &data,
        nodefaults,
    )
    .unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_format_fixed() {
    assert!(format_to_string("all", false) == "n     name\n7     x y\n1234\n");
    assert!(format_to_string("name,n,noheader,tag:t", false) == "x y  7     t\n     1234  t\n");
}

#[test]
fn test_format_csv_json_awk() {
    assert!(format_to_string("all,csv", false) == "7,x y\n1234,\n");
    assert!(format_to_string("all,csv,header", false) == "n,name\n7,x y\n1234,\n");
    assert!(format_to_string("all,csvnamed,nodefaults", true) == "n=7,name=x y\nn=1234\n");
    assert!(
        format_to_string("all,json,nodefaults", true)
            == "[{\"n\":\"7\",\"name\":\"x y\"},{\"n\":\"1234\"}]\n"
    );
    assert!(format_to_string("n,name,awk", false) == "7 x_y\n1234 \n");
}

#[test]
fn test_parse_fields() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,csv,bogus", &formatters, &aliases).unwrap();
    assert!(fields == vec!["n", "name"]);
    assert!(others.contains("csv") && others.contains("bogus"));
    assert!(parse_fields("csv", &formatters, &aliases).is_err());
}
