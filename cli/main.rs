#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use dreval::config::EvaluationConfig;
use dreval::data::load_observations;
use dreval::evaluate::normalized_metric_name;
use dreval::{
    CorrelationMethod, GroupingDimension, Metric, MetricDirection, WarningCategory,
    WarningRegistry,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum MethodCli {
    Pearson,
    Spearman,
}

impl From<MethodCli> for CorrelationMethod {
    fn from(method: MethodCli) -> Self {
        match method {
            MethodCli::Pearson => CorrelationMethod::Pearson,
            MethodCli::Spearman => CorrelationMethod::Spearman,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NormalizeCli {
    Drug,
    CellLine,
}

impl From<NormalizeCli> for GroupingDimension {
    fn from(dimension: NormalizeCli) -> Self {
        match dimension {
            NormalizeCli::Drug => GroupingDimension::Drug,
            NormalizeCli::CellLine => GroupingDimension::CellLine,
        }
    }
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to TSV file with prediction,response,cell_line_id,drug_id columns
    #[arg(value_name = "PREDICTIONS_TSV")]
    pub predictions: PathBuf,

    /// Metric to compute; repeat for several. Defaults to every registered metric
    #[arg(long = "metric", value_name = "NAME")]
    pub metrics: Vec<String>,

    /// TOML evaluation config; command-line flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Correlation used between partial-correlation residuals
    #[arg(long, value_enum)]
    pub method: Option<MethodCli>,

    /// Seed for the noise added to near-constant predictions
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Also report metrics after subtracting per-group mean responses
    #[arg(long, value_enum)]
    pub normalize: Vec<NormalizeCli>,

    /// Score metrics in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Output TSV path (stdout if omitted)
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "dreval",
    about = "Evaluation metrics for drug response prediction benchmarks",
    long_about = "Scores drug response predictions with error metrics, rank and linear \
                  correlations, and a partial correlation that controls for cell line \
                  and drug identity."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a prediction table
    #[command(about = "Evaluate predictions (outputs: metric,value,direction TSV)")]
    Evaluate(EvaluateArgs),

    /// List registered metrics and their optimization direction
    #[command(about = "List registered metrics")]
    Metrics,

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Evaluate(args)) => evaluate(args),
        Some(Commands::Metrics) => print_metrics(),
        Some(Commands::Version) => {
            println!("dreval {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Resolves the effective configuration: file (or defaults) overridden by flags.
fn resolve_config(args: &EvaluateArgs) -> Result<EvaluationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Reading evaluation config from '{}'", path.display());
            EvaluationConfig::load(path)?
        }
        None => EvaluationConfig::default(),
    };

    if !args.metrics.is_empty() {
        config.metrics = args.metrics.clone();
    }
    if let Some(method) = args.method {
        config.partial_correlation.method = method.into();
    }
    if let Some(seed) = args.seed {
        config.partial_correlation.seed = Some(seed);
    }
    if !args.normalize.is_empty() {
        config.normalize = args.normalize.iter().map(|&d| d.into()).collect();
    }
    if args.parallel {
        config.parallel = true;
    }
    config.validate()?;
    Ok(config)
}

fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let metrics = config.resolved_metrics()?;
    let observations = load_observations(&args.predictions)?;

    let warnings = WarningRegistry::global();
    let evaluator = config.evaluator(warnings);

    let scores = evaluator.evaluate(&observations, config.metrics.clone())?;
    let mut rows: Vec<(String, f64, MetricDirection)> = metrics
        .iter()
        .map(|&metric| {
            let name = metric.name().to_string();
            let value = scores.get(&name).copied().unwrap_or(f64::NAN);
            (name, value, metric.direction())
        })
        .collect();

    for &dimension in &config.normalize {
        log::info!("Scoring predictions normalized by {dimension}");
        let normalized =
            evaluator.evaluate_normalized(&observations, config.metrics.clone(), dimension)?;
        for &metric in metrics.iter().filter(|m| !m.is_shift_invariant()) {
            let name = normalized_metric_name(metric, dimension);
            let value = normalized.get(&name).copied().unwrap_or(f64::NAN);
            rows.push((name, value, metric.direction()));
        }
    }

    for category in WarningCategory::ALL {
        let suppressed = warnings.suppressed(category);
        if suppressed > 0 {
            log::debug!("{category:?}: {suppressed} repeated warning(s) suppressed");
        }
    }

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    write_scores(sink, &rows)?;

    if let Some(path) = &args.output {
        log::info!("Wrote {} scores to '{}'", rows.len(), path.display());
    }
    Ok(())
}

fn write_scores<W: Write>(
    sink: W,
    rows: &[(String, f64, MetricDirection)],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(sink);
    writer.write_record(["metric", "value", "direction"])?;
    for (name, value, direction) in rows {
        let value = if value.is_nan() {
            "NaN".to_string()
        } else {
            value.to_string()
        };
        writer.write_record([name.as_str(), value.as_str(), direction.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_metrics() -> Result<(), Box<dyn std::error::Error>> {
    for metric in Metric::ALL {
        println!("{}\t{}", metric.name(), metric.direction());
    }
    Ok(())
}
