use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use generator::profile::{generate_all, GeneratorConfig};
use scancore::{EnvelopeMethod, FilterSpec};
use std::path::PathBuf;
use workflow::config::{Mode, WorkflowConfig};
use workflow::runner::Runner;

mod generator;
mod report;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline data generator and workflow driver for scancore")]
struct Cli {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write synthetic single-point, B-scan and wavefield datasets
    Generate {
        #[arg(long, default_value = "data")]
        output: PathBuf,
        #[arg(long, default_value_t = 20)]
        positions: usize,
        #[arg(long, default_value_t = 50)]
        nx: usize,
        #[arg(long, default_value_t = 50)]
        ny: usize,
        #[arg(long, default_value_t = 100)]
        time_steps: usize,
        #[arg(long, default_value_t = 0.05)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Process one trace (.txt or .mat)
    Single(RunArgs),
    /// Process a folder of traces or a scan container
    Scan(RunArgs),
    /// Process a wavefield container
    Wavefield(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    input: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Sample rate for text traces that do not encode one
    #[arg(long)]
    fs: Option<f64>,
    /// Band-pass cutoffs in Hz
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    bandpass: Option<Vec<f64>>,
    #[arg(long)]
    lowpass: Option<f64>,
    #[arg(long)]
    highpass: Option<f64>,
    #[arg(long, default_value_t = scancore::prelude::DEFAULT_ORDER)]
    order: usize,
    #[arg(long)]
    median: Option<usize>,
    /// Savitzky-Golay window length and polynomial order
    #[arg(long, num_args = 2, value_names = ["WINDOW", "POLYORDER"])]
    savgol: Option<Vec<usize>>,
    #[arg(long, default_value_t = false)]
    normalize: bool,
    #[arg(long, default_value = "hilbert")]
    envelope: EnvelopeMethod,
    /// File-name pattern for scan folders
    #[arg(long)]
    pattern: Option<String>,
    /// Variable holding the wavefield volume
    #[arg(long, default_value = scancore::processing::WAVE_DATA_KEY)]
    data_key: String,
    #[arg(long, default_value_t = scancore::processing::DEFAULT_ARRIVAL_THRESHOLD)]
    threshold: f64,
}

impl RunArgs {
    /// Filters run in a fixed order: band-pass, low-pass, high-pass, median,
    /// Savitzky-Golay.
    fn into_config(self, mode: Mode) -> WorkflowConfig {
        let mut filters = Vec::new();
        if let Some([lowcut, highcut]) = self.bandpass.as_deref() {
            filters.push(FilterSpec::BandPass {
                lowcut: *lowcut,
                highcut: *highcut,
                order: self.order,
            });
        }
        if let Some(cutoff) = self.lowpass {
            filters.push(FilterSpec::LowPass {
                cutoff,
                order: self.order,
            });
        }
        if let Some(cutoff) = self.highpass {
            filters.push(FilterSpec::HighPass {
                cutoff,
                order: self.order,
            });
        }
        if let Some(kernel_size) = self.median {
            filters.push(FilterSpec::Median { kernel_size });
        }
        if let Some([window_length, polyorder]) = self.savgol.as_deref() {
            filters.push(FilterSpec::SavitzkyGolay {
                window_length: *window_length,
                polyorder: *polyorder,
            });
        }

        let mut config = WorkflowConfig::new(mode, self.input);
        config.output = self.output;
        config.sample_rate = self.fs;
        config.filters = filters;
        config.normalize = self.normalize;
        config.envelope = self.envelope;
        config.matrix.envelope_method = self.envelope;
        config.pattern = self.pattern;
        config.data_key = self.data_key;
        config.arrival_threshold = self.threshold;
        config
    }
}

fn run(config: WorkflowConfig) -> anyhow::Result<()> {
    let report = Runner::new(config).execute()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing workflow report")?
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(path) = cli.workflow {
        return run(WorkflowConfig::load(path)?);
    }

    match cli.command {
        Some(Command::Generate {
            output,
            positions,
            nx,
            ny,
            time_steps,
            noise,
            seed,
        }) => {
            let config = GeneratorConfig {
                positions,
                nx,
                ny,
                time_steps,
                noise,
                seed,
                ..Default::default()
            };
            let files = generate_all(&config, &output)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&files).context("serializing file list")?
            );
            Ok(())
        }
        Some(Command::Single(run_args)) => run(run_args.into_config(Mode::Single)),
        Some(Command::Scan(run_args)) => run(run_args.into_config(Mode::Scan)),
        Some(Command::Wavefield(run_args)) => run(run_args.into_config(Mode::Wavefield)),
        None => anyhow::bail!("nothing to do: pass --workflow <file> or a subcommand"),
    }
}
