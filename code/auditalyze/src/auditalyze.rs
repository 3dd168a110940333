/// `auditalyze` -- Analyze scheduler audit trace files
///
/// Run with --help for brief help.
///
/// Quirks
///
/// The --from and --to values select requests by their arrival time, and they are applied after
/// --trim-start and --trim-end, which are relative to the first and last arrival in the input.
/// The window only affects the timings of complete requests and the round trips and skew samples;
/// the queue-length series, the launch curves and the request listing cover all the input.
///
/// Options on the command line override the values in the --config-file.
mod format;
mod launches;
mod percentiles;
mod prskew;
mod queues;
mod requests;
mod summary;

use anyhow::{bail, Result};
use auditlog::{
    extract_metrics, finalize, find_logfiles, read_analysis_config, read_logfiles, AnalysisConfig,
    DiagnosticKind, Diagnostics, DuplicatePolicy, Window,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::info;
use rustutils::{parse_duration, parse_timestamp, TimeDelta, Timestamp};
use std::io;
use std::mem;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Print response time percentiles and the fate of the requests
    Summary(CmdArgs),

    /// Print a table of percentiles of response, network, service, queue and launch times
    Percentiles(CmdArgs),

    /// Print the distribution of clock skew for each pair of machines
    Skew(CmdArgs),

    /// Print the queue length samples of each node
    Queues(CmdArgs),

    /// Print the number of tasks launched against time since arrival, per request
    Launches(CmdArgs),

    /// Print information about each request
    Requests(CmdArgs),
}

#[derive(Args, Debug)]
pub struct CmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    analysis_args: AnalysisArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Select the directory holding the audit files (the files whose names contain the file
    /// pattern, "sparrow_audit" by default)
    #[arg(long)]
    data_path: Option<String>,

    /// Audit file names (overrides --data-path)
    #[arg(last = true)]
    logfiles: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AnalysisArgs {
    /// Select requests arriving at this time and later.  Format can be epoch milliseconds,
    /// YYYY-MM-DD, or RFC 3339 [default: no limit]
    #[arg(long, short, value_parser = parse_timestamp)]
    from: Option<Timestamp>,

    /// Select requests arriving at this time and earlier.  Format as for --from [default: no limit]
    #[arg(long, short, value_parser = parse_timestamp)]
    to: Option<Timestamp>,

    /// Drop requests arriving within this long after the first arrival.  Format can be N (ms),
    /// Nms, Ns, Nm, Nh [default: 0]
    #[arg(long, value_parser = parse_duration)]
    trim_start: Option<TimeDelta>,

    /// Drop requests arriving within this long before the last arrival.  Format as for
    /// --trim-start [default: 0]
    #[arg(long, value_parser = parse_duration)]
    trim_end: Option<TimeDelta>,

    /// Do not correct completion times for estimated clock skew
    #[arg(long, default_value_t = false)]
    no_skew: bool,

    /// Keep the first value when a field is set twice, not the latest
    #[arg(long, default_value_t = false)]
    keep_first_duplicate: bool,

    /// Assumed processing time in milliseconds at the far end of a round trip [default: 0]
    #[arg(long)]
    hop_processing: Option<f64>,

    /// Number of rows in percentile tables and skew distributions [default: 100]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    resolution: Option<u64>,

    /// File containing JSON data with analysis settings [default: none]
    #[arg(long)]
    config_file: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and format for the output, "help" for help [default: command dependent]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print more information about the input and the analysis to stderr (repeatable)
    #[arg(long, short, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    match auditalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn init_logging(meta_args: &MetaArgs) -> Result<()> {
    let llv = match meta_args.verbose {
        0 => simplelog::LevelFilter::Warn,
        1 => simplelog::LevelFilter::Info,
        2 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Off)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

// The configuration file, if any, with the command line options applied on top.

fn analysis_config(args: &AnalysisArgs) -> Result<AnalysisConfig> {
    let mut config = match args.config_file {
        Some(ref filename) => read_analysis_config(filename)?,
        None => AnalysisConfig::default(),
    };
    if args.no_skew {
        config.incorporate_skew = false;
    }
    if args.keep_first_duplicate {
        config.duplicate_policy = DuplicatePolicy::KeepFirst;
    }
    if let Some(ms) = args.hop_processing {
        if ms < 0.0 || ms.is_nan() {
            bail!("The --hop-processing time must not be negative");
        }
        config.hop_processing_ms = ms;
    }
    if let Some(n) = args.resolution {
        config.percentile_resolution = n as usize;
    }
    if let Some(ms) = args.trim_start {
        config.trim_start_ms = ms;
    }
    if let Some(ms) = args.trim_end {
        config.trim_end_ms = ms;
    }
    Ok(config)
}

fn auditalyze() -> Result<()> {
    let cli = Cli::parse();

    let args = match cli.command {
        Commands::Version => {
            // Syntax:
            //  - components of the version string are space-separated but there are spaces nowhere else
            //  - the keyword "auditalyze" is always the first component
            //  - every component is keyword(value)
            println!("auditalyze version(0.1.0)");
            return Ok(());
        }
        Commands::Summary(ref args)
        | Commands::Percentiles(ref args)
        | Commands::Skew(ref args)
        | Commands::Queues(ref args)
        | Commands::Launches(ref args)
        | Commands::Requests(ref args) => args,
    };

    if format::maybe_help(&args.print_args.fmt, || match cli.command {
        Commands::Summary(_) => summary::fmt_help(),
        Commands::Percentiles(_) => percentiles::fmt_help(),
        Commands::Skew(_) => prskew::fmt_help(),
        Commands::Queues(_) => queues::fmt_help(),
        Commands::Launches(_) => launches::fmt_help(),
        Commands::Requests(_) | Commands::Version => requests::fmt_help(),
    }) {
        return Ok(());
    }

    init_logging(&args.meta_args)?;
    let config = analysis_config(&args.analysis_args)?;

    let from = args.analysis_args.from.unwrap_or(Timestamp::MIN);
    let to = args.analysis_args.to.unwrap_or(Timestamp::MAX);
    if from > to {
        bail!("The --from time is greater than the --to time");
    }

    let logfiles = if !args.source_args.logfiles.is_empty() {
        args.source_args.logfiles.clone()
    } else if let Some(ref data_path) = args.source_args.data_path {
        info!("Data path: {data_path}");
        find_logfiles(data_path, &config.file_pattern)?
    } else {
        bail!("No data path and no audit files");
    };
    info!("Audit files: {:?}", logfiles);

    let (mut registry, mut diags) = read_logfiles(&logfiles, config.duplicate_policy)?;
    finalize(&mut registry, &config, &mut diags);
    let window = Window::trimmed(&registry, config.trim_start_ms, config.trim_end_ms)
        .within(&Window::new(from, to));
    let mut metrics = extract_metrics(&registry, &window, &config);
    diags.extend(mem::take(&mut metrics.diagnostics));
    report_diagnostics(&diags);

    let output = &mut io::stdout();
    let fmt = &args.print_args.fmt;
    match cli.command {
        Commands::Summary(_) => summary::print(output, fmt, &metrics, &diags),
        Commands::Percentiles(_) => percentiles::print(output, fmt, &metrics, &config),
        Commands::Skew(_) => prskew::print(output, fmt, &metrics, &config),
        Commands::Queues(_) => queues::print(output, fmt, &metrics),
        Commands::Launches(_) => launches::print(output, fmt, &metrics),
        Commands::Requests(_) => requests::print(output, fmt, &registry, &config),
        Commands::Version => bail!("Unexpected"),
    }
}

fn report_diagnostics(diags: &Diagnostics) {
    for (kind, name) in [
        (DiagnosticKind::MalformedInput, "malformed lines"),
        (DiagnosticKind::UnknownEventKind, "unknown events"),
        (DiagnosticKind::DuplicateAssignment, "duplicate assignments"),
        (DiagnosticKind::SkewEstimationUnavailable, "tasks without skew"),
        (DiagnosticKind::SkewBeforeArrival, "completions before arrival"),
        (DiagnosticKind::SuspectedSkew, "tasks suggesting skew"),
    ] {
        let n = diags.count(kind);
        if n > 0 {
            info!("{n} {name}");
        }
    }
}

/// Render a number of milliseconds.  Most values are integral, the rest are shown with one
/// decimal.

pub fn format_millis(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

/// Text for a value that may be absent.  Under `nodefaults` absent values are omitted from csv and
/// json output, otherwise they are shown as "-".

pub fn format_opt_millis(v: Option<f64>, nodefaults: bool) -> String {
    match v {
        Some(v) => format_millis(v),
        None if nodefaults => "*skip*".to_string(),
        None => "-".to_string(),
    }
}

/// Whether the --fmt string asks for absent values to be omitted.

pub fn nodefaults(fmt: &Option<String>) -> bool {
    match fmt {
        Some(s) => s.split(',').any(|x| x == "nodefaults"),
        None => false,
    }
}

// Read a fixture and run the whole pipeline over it, as the commands do.

#[cfg(test)]
pub fn analyze_fixture(
    file: &str,
    config: &AnalysisConfig,
) -> (auditlog::TraceRegistry, auditlog::Metrics) {
    let (mut registry, mut diags) =
        read_logfiles(&[file.to_string()], config.duplicate_policy).unwrap();
    finalize(&mut registry, config, &mut diags);
    let metrics = extract_metrics(&registry, &Window::all(), config);
    (registry, metrics)
}

#[test]
fn test_format_millis() {
    assert!(format_millis(50.0) == "50");
    assert!(format_millis(-4.0) == "-4");
    assert!(format_millis(2.5) == "2.5");
    assert!(format_opt_millis(None, false) == "-");
    assert!(format_opt_millis(None, true) == "*skip*");
    assert!(nodefaults(&Some("csv,nodefaults".to_string())));
    assert!(!nodefaults(&None));
}

#[test]
fn test_analysis_config_overrides() {
    let args = AnalysisArgs {
        from: None,
        to: None,
        trim_start: Some(100),
        trim_end: None,
        no_skew: true,
        keep_first_duplicate: false,
        hop_processing: Some(1.5),
        resolution: Some(10),
        config_file: Some("../tests/auditlog/analysis-config.json".to_string()),
    };
    let config = analysis_config(&args).unwrap();
    assert!(!config.incorporate_skew);
    assert!(config.duplicate_policy == DuplicatePolicy::KeepFirst);
    assert!(config.hop_processing_ms == 1.5);
    assert!(config.percentile_resolution == 10);
    assert!(config.trim_start_ms == 100);
    assert!(config.trim_end_ms == 500);
    assert!(config.file_pattern == "audit");
}
