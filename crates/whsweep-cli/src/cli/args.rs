use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use whsweep_core::config::DEFAULT_CONFIG_FILE;
use whsweep_core::{ComputeType, ConfigurationError, SweepFile, WarehouseSize};

#[derive(Parser)]
#[command(
    name = "whsweep",
    version,
    about = "Benchmark sweeps over warehouse size, compute tier and thread count"
)]
pub struct Cli {
    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision, run, record and clean up every configuration of the sweep
    Run(RunArgs),
    /// Print the expanded configurations without touching any API
    Plan(PlanArgs),
    /// Drop a leftover experiment's schemas and delete its warehouse
    Cleanup(CleanupArgs),
    Version,
}

/// Sweep file plus command-line overrides of its values.
#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Warehouse sizes, e.g. `Small,X-Large`
    #[arg(long, value_delimiter = ',')]
    pub sizes: Vec<WarehouseSize>,

    /// Compute types: SERVERLESS, PRO, CLASSIC
    #[arg(long, value_delimiter = ',')]
    pub compute_types: Vec<ComputeType>,

    #[arg(long, value_delimiter = ',')]
    pub threads: Vec<u32>,

    #[arg(long)]
    pub iterations: Option<u32>,

    /// Experiments run concurrently (1 = sequential)
    #[arg(long)]
    pub parallelism: Option<usize>,

    #[arg(long)]
    pub scaling_factor: Option<u32>,

    #[arg(long)]
    pub catalog: Option<String>,
}

impl SweepArgs {
    /// Reads the sweep file, applies overrides and validates the result.
    pub fn load(&self) -> Result<SweepFile, ConfigurationError> {
        let mut file = SweepFile::from_file(&self.config)?;
        if !self.sizes.is_empty() {
            file.sweep.sizes = self.sizes.clone();
        }
        if !self.compute_types.is_empty() {
            file.sweep.compute_types = self.compute_types.clone();
        }
        if !self.threads.is_empty() {
            file.sweep.threads = self.threads.clone();
        }
        if let Some(iterations) = self.iterations {
            file.sweep.iterations = iterations;
        }
        if let Some(parallelism) = self.parallelism {
            file.settings.parallelism = parallelism;
        }
        if let Some(scaling_factor) = self.scaling_factor {
            file.sweep.scaling_factor = scaling_factor;
        }
        if let Some(catalog) = &self.catalog {
            file.catalog = catalog.clone();
        }
        file.validate()?;
        Ok(file)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Also write the sweep report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Reuse a batch id instead of generating one
    #[arg(long)]
    pub batch_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(long)]
    pub warehouse_id: String,

    /// Base schema of the experiment; defaults to `{schema_prefix}_{warehouse_id}`
    #[arg(long)]
    pub schema: Option<String>,

    /// Skip dropping schemas and only delete the warehouse
    #[arg(long, conflicts_with = "schema")]
    pub keep_schemas: bool,

    #[arg(long)]
    pub catalog: Option<String>,
}
