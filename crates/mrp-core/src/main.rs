//! `mrp`: dwelling ownership estimation by multilevel regression and
//! post-stratification.
//!
//! stdout carries the command payload; logs and errors go to stderr.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use mrp_common::config::{ConfigResolution, ConfigSource, ResolvedConfig, CONFIG_SCHEMA_VERSION};
use mrp_common::error::{format_error_human, StructuredError};
use mrp_common::{
    AgeGroup, ConfigPaths, ConfigResolver, ConfigSnapshot, Error, MrpConfig, OutputFormat, Result,
};
use mrp_core::data::{dataset_id, InputCheck, ObservationTable, StratumTable};
use mrp_core::exit_codes::ExitCode;
use mrp_core::log_event;
use mrp_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use mrp_core::output::render;
use mrp_core::{CancellationToken, MrpReport, Pipeline};

/// Dwelling ownership rates by multilevel regression and post-stratification
#[derive(Parser)]
#[command(name = "mrp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Override the sampler seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Abort sampling after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the model and post-stratify to the census strata
    Fit(FitArgs),

    /// Validate input tables without fitting
    Check(CheckArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print the age group of each age
    BinAge(BinAgeArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct FitArgs {
    /// Survey observations (CSV or JSON)
    #[arg(long)]
    observations: PathBuf,

    /// Census strata (CSV or JSON)
    #[arg(long)]
    strata: PathBuf,

    /// Number of chains
    #[arg(long)]
    chains: Option<usize>,

    /// Warmup iterations per chain
    #[arg(long)]
    warmup: Option<usize>,

    /// Retained draws per chain
    #[arg(long)]
    draws: Option<usize>,

    /// Target acceptance rate for step-size adaptation
    #[arg(long)]
    target_accept: Option<f64>,

    /// Posterior samples per predictive matrix
    #[arg(long)]
    predictive_draws: Option<usize>,

    /// Write the in-sample and population predictive matrices as JSON
    #[arg(long)]
    predictions_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Survey observations (CSV or JSON)
    #[arg(long)]
    observations: PathBuf,

    /// Census strata (CSV or JSON)
    #[arg(long)]
    strata: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,
    /// Validate a config file (or the resolved one)
    Validate {
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct BinAgeArgs {
    /// Ages in years
    #[arg(required = true, allow_negative_numbers = true)]
    ages: Vec<f64>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Clean,
                _ => ExitCode::ArgsError,
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    // Machine-readable payloads get machine-readable logs.
    let log_format = matches!(cli.global.format, OutputFormat::Json).then_some(LogFormat::Jsonl);
    let log_config = LogConfig::from_env(
        LogLevel::from_flags(cli.global.verbose, cli.global.quiet),
        log_format,
    );
    init_logging(&log_config);

    let ctx = LogContext::new(generate_run_id(), get_host_id());
    let exit_code = match &cli.command {
        Commands::Fit(args) => run_fit(&cli.global, args, ctx),
        Commands::Check(args) => run_check(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::BinAge(args) => run_bin_age(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

/// Print `err` to stderr in the requested format and map it to an exit code.
fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(err).with_context("remediation", err.remediation());
            eprintln!("{}", structured.to_json_pretty());
        }
        _ => eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal())),
    }
    let code = ExitCode::from(err);
    if code.is_internal_error() {
        tracing::error!(target: event_names::INTERNAL_ERROR, code = %code, error = %err, "internal error");
    }
    code
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve the config file and apply global CLI overrides.
fn resolve_config(global: &GlobalOpts) -> Result<(MrpConfig, ConfigSource)> {
    let resolver = ConfigResolver::new(ConfigPaths {
        config_path: global.config.clone(),
        config_dir: None,
    });
    let (mut config, source) = resolver.load()?;
    match source.resolution {
        ConfigResolution::Default => {
            tracing::debug!(target: event_names::CONFIG_DEFAULT_USED, "using built-in defaults")
        }
        resolution => tracing::debug!(
            target: event_names::CONFIG_LOADED,
            path = source.path.as_deref().unwrap_or_default(),
            resolution = %resolution,
            "config loaded"
        ),
    }
    if let Some(seed) = global.seed {
        config.sampler.seed = seed;
    }
    if global.timeout.is_some() {
        config.sampler.timeout_secs = global.timeout;
    }
    Ok((config, source))
}

// ============================================================================
// fit
// ============================================================================

fn run_fit(global: &GlobalOpts, args: &FitArgs, ctx: LogContext) -> ExitCode {
    match fit_command(global, args, ctx) {
        Ok(code) => code,
        Err(e) => output_error(global, &e),
    }
}

fn fit_command(global: &GlobalOpts, args: &FitArgs, ctx: LogContext) -> Result<ExitCode> {
    let (mut config, source) = resolve_config(global)?;
    if let Some(chains) = args.chains {
        config.sampler.chains = chains;
    }
    if let Some(warmup) = args.warmup {
        config.sampler.warmup = warmup;
    }
    if let Some(draws) = args.draws {
        config.sampler.draws = draws;
    }
    if let Some(target) = args.target_accept {
        config.sampler.target_accept = target;
    }
    if let Some(draws) = args.predictive_draws {
        config.predictive.draws = draws;
    }
    config.validate()?;
    // Hash the settings actually used, overrides included.
    let snapshot = ConfigSnapshot::new(&config, source)?;

    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "estimation run started",
        config = snapshot.source.resolution.as_str(),
        seed = config.sampler.seed
    );

    let observations = ObservationTable::from_path(&args.observations)?;
    log_event!(
        ctx,
        INFO,
        event_names::LOAD_OBSERVATIONS,
        Stage::Load,
        "observations loaded",
        rows = observations.len(),
        skipped_unknown = observations.skipped_unknown()
    );
    let strata = StratumTable::from_path(&args.strata)?;
    log_event!(
        ctx,
        INFO,
        event_names::LOAD_STRATA,
        Stage::Load,
        "strata loaded",
        rows = strata.len(),
        total_population = strata.total_population()
    );

    let ctx = ctx.with_dataset_id(dataset_id(&[args.observations.as_path(), args.strata.as_path()])?);
    let report = Pipeline::new(config)
        .with_log_context(ctx)
        .with_snapshot(snapshot)
        .run(&observations, &strata, &CancellationToken::new())?;

    if let Some(path) = &args.predictions_out {
        write_predictions(path, &report)?;
    }
    println!("{}", render(&report, global.format)?);

    Ok(if report.reliable {
        ExitCode::Clean
    } else {
        ExitCode::Unreliable
    })
}

fn write_predictions(path: &Path, report: &MrpReport) -> Result<()> {
    let payload = serde_json::json!({
        "in_sample": &report.predictions.in_sample.matrix,
        "population": &report.predictions.population.matrix,
    });
    std::fs::write(path, serde_json::to_string(&payload)?)?;
    Ok(())
}

// ============================================================================
// check
// ============================================================================

fn run_check(global: &GlobalOpts, args: &CheckArgs) -> ExitCode {
    let result = (|| -> Result<InputCheck> {
        let observations = ObservationTable::from_path(&args.observations)?;
        let strata = args
            .strata
            .as_deref()
            .map(StratumTable::from_path)
            .transpose()?;
        Ok(InputCheck::new(&observations, strata.as_ref()))
    })();
    let check = match result {
        Ok(check) => check,
        Err(e) => return output_error(global, &e),
    };

    let printed = match global.format {
        OutputFormat::Json => print_json(&check),
        _ => {
            let obs = &check.observations;
            println!(
                "observations: {} rows ({} skipped unknown), {} owners",
                obs.rows, obs.skipped_unknown, obs.owned
            );
            if let Some(strata) = &check.strata {
                println!(
                    "strata: {} rows, population {}, complete: {}, unmatched: {}",
                    strata.rows,
                    strata.total_population,
                    strata.complete,
                    strata.unmatched_strata.len()
                );
            }
            Ok(())
        }
    };
    if let Err(e) = printed {
        return output_error(global, &e);
    }

    if check.is_usable() {
        ExitCode::Clean
    } else if check
        .strata
        .as_ref()
        .is_some_and(|s| !s.unmatched_strata.is_empty())
    {
        ExitCode::CategoryMismatch
    } else {
        ExitCode::InputError
    }
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    let loaded = match &args.command {
        // Show reports what a run would use, CLI overrides included.
        ConfigCommands::Show => resolve_config(global).and_then(|(config, source)| {
            config.validate()?;
            let snapshot = ConfigSnapshot::new(&config, source)?;
            Ok((config, snapshot))
        }),
        // Validate checks the file exactly as written.
        ConfigCommands::Validate { path } => ResolvedConfig::load(&ConfigResolver::new(ConfigPaths {
            config_path: path.clone().or_else(|| global.config.clone()),
            config_dir: None,
        }))
        .map(|resolved| (resolved.config, resolved.snapshot)),
    };
    let (config, snapshot) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => return output_error(global, &e),
    };

    let printed = match (&args.command, global.format) {
        (ConfigCommands::Show, OutputFormat::Json) => print_json(&serde_json::json!({
            "schema_version": CONFIG_SCHEMA_VERSION,
            "source": snapshot.to_json(),
            "config": config,
        })),
        (ConfigCommands::Show, _) => toml::to_string_pretty(&config)
            .map(|text| println!("{}", text))
            .map_err(|e| Error::Config(format!("failed to render config: {}", e))),
        (ConfigCommands::Validate { .. }, OutputFormat::Json) => print_json(&serde_json::json!({
            "status": "valid",
            "source": snapshot.to_json(),
        })),
        (ConfigCommands::Validate { .. }, _) => {
            println!(
                "config valid ({})",
                snapshot.source.path.as_deref().unwrap_or("built-in defaults")
            );
            Ok(())
        }
    };
    match printed {
        Ok(()) => ExitCode::Clean,
        Err(e) => output_error(global, &e),
    }
}

// ============================================================================
// bin-age, version
// ============================================================================

fn run_bin_age(global: &GlobalOpts, args: &BinAgeArgs) -> ExitCode {
    let binned: Result<Vec<(f64, AgeGroup)>> = args
        .ages
        .iter()
        .map(|&age| AgeGroup::from_age(age).map(|group| (age, group)))
        .collect();
    let binned = match binned {
        Ok(b) => b,
        Err(e) => return output_error(global, &e),
    };

    let printed = match global.format {
        OutputFormat::Json => print_json(
            &binned
                .iter()
                .map(|(age, group)| serde_json::json!({ "age": age, "age_group": group }))
                .collect::<Vec<_>>(),
        ),
        _ => {
            for (age, group) in &binned {
                println!("{}\t{}", age, group);
            }
            Ok(())
        }
    };
    match printed {
        Ok(()) => ExitCode::Clean,
        Err(e) => output_error(global, &e),
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let info = serde_json::json!({
                "mrp_version": env!("CARGO_PKG_VERSION"),
                "config_schema_version": CONFIG_SCHEMA_VERSION,
            });
            if let Err(e) = print_json(&info) {
                output_error(global, &e);
            }
        }
        _ => {
            println!("mrp {}", env!("CARGO_PKG_VERSION"));
            println!("config schema version: {}", CONFIG_SCHEMA_VERSION);
        }
    }
}
