use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use stage_dwell_rs::io::{read_csv_file, read_json_input, write_tables, ColumnSelector};
use stage_dwell_rs::{Modality, ProcessorConfig, RawInput, RunReport, StageProcessor};

#[derive(Parser, Debug)]
#[command(name = "stage_dwell")]
#[command(about = "Extract stillstand windows from a stage position recording", long_about = None)]
struct Args {
    /// Recording: CSV (with --column) or JSON array, optionally gzipped
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// CSV column holding the position (header name or zero-based index)
    #[arg(long)]
    column: Option<ColumnSelector>,

    /// Processor configuration (JSON; missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Noise threshold seed
    #[arg(long)]
    v_th: Option<f64>,

    /// Settle-in margin before each move (s)
    #[arg(long)]
    t_start: Option<f64>,

    /// Settle-out margin after each move (s)
    #[arg(long)]
    t_stop: Option<f64>,

    /// Decimation factor (1 = off)
    #[arg(long)]
    downsample: Option<usize>,

    /// Sampling rate of the recording (Hz)
    #[arg(long)]
    sampling_rate: Option<f64>,

    /// linear or rotational
    #[arg(long)]
    modality: Option<Modality>,

    /// Write the JSON report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also write series/peaks/stillstands CSV tables into this directory
    #[arg(long)]
    tables_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn processor_config(&self) -> Result<ProcessorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => ProcessorConfig::default(),
        };

        if let Some(v) = self.v_th {
            config.v_th_seed = v;
        }
        if let Some(v) = self.t_start {
            config.t_start = v;
        }
        if let Some(v) = self.t_stop {
            config.t_stop = v;
        }
        if let Some(v) = self.downsample {
            config.downsample_factor = v;
        }
        if let Some(v) = self.sampling_rate {
            config.sampling_rate_hz = v;
        }
        if let Some(v) = self.modality {
            config.modality = v;
        }
        Ok(config)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// File name without `.csv`, `.json` or `.json.gz`.
fn table_stem(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("run");
    ["json.gz", "json", "csv"]
        .iter()
        .find_map(|ext| name.strip_suffix(&format!(".{ext}")))
        .unwrap_or(name)
        .to_string()
}

fn load_input(args: &Args) -> Result<RawInput> {
    let name = file_name(&args.input);
    if name.ends_with(".csv") {
        let Some(column) = args.column.as_ref() else {
            bail!("CSV input needs --column");
        };
        let values = read_csv_file(&args.input, column).with_context(|| format!("reading {}", args.input.display()))?;
        Ok(RawInput::Numeric(values))
    } else if name.ends_with(".json") || name.ends_with(".json.gz") {
        Ok(read_json_input(&args.input).with_context(|| format!("reading {}", args.input.display()))?)
    } else {
        bail!("Unsupported input {} (expected .csv, .json or .json.gz)", args.input.display());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = args.processor_config()?;
    let processor = StageProcessor::new(config.clone())?;

    let input = load_input(&args)?;
    log::info!("Loaded {} samples from {}", input.len(), args.input.display());

    let output = processor.process(input)?;

    if let Some(dir) = args.tables_dir.as_ref() {
        write_tables(dir, &table_stem(&args.input), &output)?;
    }

    let report = RunReport::new(args.input.display().to_string(), config, output);
    log::info!(
        "{} stillstands, {} references, {} repetitions",
        report.counts.stillstands,
        report.counts.references,
        report.counts.repetitions
    );

    match args.output.as_ref() {
        Some(path) => {
            report.save(path).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Report saved to {}", path.display());
        }
        None => println!("{}", report.to_json()?),
    }
    Ok(())
}
