use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use effort_render::bench::{run_benchmark, write_report, BenchConfig};
use effort_render::{
    interval_session_with, parse_series, write_composite, write_series_csv, EffortModel,
    RenderConfig, RenderSession, StreamPoint,
};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Effort-gradient chart renderer and benchmark harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one or more CSV/JSON series to PNG + SVG + HTML composites
    Render(RenderArgs),
    /// Run the latency/alignment harness and write a JSON report
    Bench(BenchArgs),
    /// Write the synthetic interval session used by the harness
    Synth(SynthArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// CSV/JSON series files
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory receiving `<stem>.png`, `<stem>.svg` and `<stem>.html`
    #[arg(short, long, default_value = "charts", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Container content width in logical pixels
    #[arg(long, default_value_t = 1200.0)]
    width: f64,

    /// Container content height in logical pixels
    #[arg(long, default_value_t = 320.0)]
    height: f64,

    /// Device pixel ratio of the target display
    #[arg(long)]
    dpr: Option<f64>,

    /// Overlay downsample target
    #[arg(long)]
    downsample: Option<usize>,

    /// Gradient band alpha
    #[arg(long)]
    alpha: Option<f64>,

    /// JSON config with `render` and/or `bench` sections
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Container-relative pointer x; draws the tooltip for that position
    #[arg(long)]
    pointer_x: Option<f64>,

    /// Resting heart rate used when a series has no effort column
    #[arg(long)]
    resting_hr: Option<f64>,

    /// Threshold heart rate used when a series has no effort column
    #[arg(long)]
    threshold_hr: Option<f64>,

    /// Enable verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct BenchArgs {
    /// Series to benchmark (defaults to the synthetic interval session)
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Comma separated container widths
    #[arg(long)]
    widths: Option<String>,

    /// Comma separated device pixel ratios
    #[arg(long)]
    dprs: Option<String>,

    /// Container height in logical pixels
    #[arg(long)]
    height: Option<f64>,

    /// Pointer moves per scenario
    #[arg(long)]
    pointer_samples: Option<usize>,

    /// Resize transitions per scenario
    #[arg(long)]
    resize_samples: Option<usize>,

    /// Report path (`-` for stdout only)
    #[arg(short, long, default_value = "bench_report.json", value_hint = ValueHint::FilePath)]
    report: PathBuf,

    /// JSON config with `render` and/or `bench` sections
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SeriesFormat {
    Csv,
    Json,
}

#[derive(Parser, Debug)]
struct SynthArgs {
    /// Output path (`-` for stdout)
    #[arg(short, long, default_value = "interval_session.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output format; inferred from the extension when omitted
    #[arg(long, value_enum)]
    format: Option<SeriesFormat>,

    /// Also write segment metadata as JSON next to the output
    #[arg(long, action = ArgAction::SetTrue)]
    segments: bool,

    #[arg(long)]
    resting_hr: Option<f64>,

    #[arg(long)]
    threshold_hr: Option<f64>,

    /// Enable verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    render: RenderConfig,
    bench: BenchConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Render(args) => args.verbose,
        Command::Bench(args) => args.verbose,
        Command::Synth(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Render(args) => handle_render(args),
        Command::Bench(args) => handle_bench(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ConfigFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid config", path.display()))?;
    Ok(config)
}

fn effort_model(base: EffortModel, resting: Option<f64>, threshold: Option<f64>) -> EffortModel {
    EffortModel {
        resting_hr: resting.unwrap_or(base.resting_hr),
        threshold_hr: threshold.unwrap_or(base.threshold_hr),
    }
}

fn load_series(path: &Path, model: &EffortModel) -> Result<Vec<StreamPoint>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    let points = parse_series(&data, hint, model)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(points)
}

fn handle_render(args: RenderArgs) -> Result<()> {
    if args.inputs.is_empty() {
        return Err(anyhow!("no input files supplied"));
    }

    let mut config = load_config(args.config.as_deref())?.render;
    if let Some(target) = args.downsample {
        config.downsample_target = target;
    }
    if let Some(alpha) = args.alpha {
        config.gradient_alpha = alpha;
    }
    config.effort_model = effort_model(config.effort_model, args.resting_hr, args.threshold_hr);
    config.validate()?;

    let t_parse = Instant::now();
    let series: Vec<(PathBuf, Vec<StreamPoint>)> = args
        .inputs
        .par_iter()
        .map(|path| -> Result<(PathBuf, Vec<StreamPoint>)> {
            Ok((path.clone(), load_series(path, &config.effort_model)?))
        })
        .collect::<Result<Vec<_>>>()?;
    if args.profile || args.verbose {
        info!(
            "Parse stage: {:.1} ms ({} files)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            series.len()
        );
    }

    let t_render = Instant::now();
    let written = series
        .into_par_iter()
        .map(|(path, points)| -> Result<PathBuf> {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("chart")
                .to_string();
            if points.len() < 2 {
                warn!("{}: fewer than two samples, chart will be empty", path.display());
            }
            let mut session =
                RenderSession::new(points, config.clone(), args.width, args.height, args.dpr)
                    .with_context(|| format!("failed to render {}", path.display()))?;
            if let Some(x) = args.pointer_x {
                if let Some(hover) = session.pointer_move(x)? {
                    info!("{}: tooltip {}", stem, hover.tooltip_lines().join(" | "));
                }
            }
            let check = session.sync_check();
            for failure in check.failures() {
                warn!("{}: {}", stem, failure);
            }
            let files = write_composite(&session, &args.out_dir, &stem)
                .with_context(|| format!("failed to write composite for {}", path.display()))?;
            let (pw, ph) = session.raster().physical_size();
            info!(
                "{}: {} samples -> {} overlay points, raster {}x{}",
                stem,
                session.series().len(),
                session.display_series().len(),
                pw,
                ph
            );
            Ok(files.html)
        })
        .collect::<Result<Vec<_>>>()?;
    if args.profile || args.verbose {
        info!(
            "Render stage: {:.1} ms",
            t_render.elapsed().as_secs_f64() * 1000.0
        );
    }

    for html in written {
        println!("{}", html.display());
    }
    Ok(())
}

fn parse_list<T: std::str::FromStr>(text: &str, what: &str) -> Result<Vec<T>> {
    let values = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| anyhow!("invalid {} '{}'", what, s))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.is_empty() {
        return Err(anyhow!("--{} list was empty", what));
    }
    Ok(values)
}

fn handle_bench(args: BenchArgs) -> Result<()> {
    let file = load_config(args.config.as_deref())?;
    let render = file.render;
    let mut bench = file.bench;
    if let Some(widths) = args.widths.as_deref() {
        bench.widths = parse_list(widths, "widths")?;
    }
    if let Some(dprs) = args.dprs.as_deref() {
        bench.device_pixel_ratios = parse_list(dprs, "dprs")?;
    }
    if let Some(height) = args.height {
        bench.container_height = height;
    }
    if let Some(samples) = args.pointer_samples {
        bench.pointer_samples = samples;
    }
    if let Some(samples) = args.resize_samples {
        bench.resize_samples = samples;
    }

    let series = match args.input.as_deref() {
        Some(path) => load_series(path, &render.effort_model)?,
        None => interval_session_with(&render.effort_model).points,
    };
    info!(
        "Benchmarking {} samples over {} widths x {} ratios",
        series.len(),
        bench.widths.len(),
        bench.device_pixel_ratios.len()
    );

    let report = run_benchmark(&series, &render, &bench)?;
    if args.report.as_os_str() == "-" {
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{json}");
    } else {
        write_report(&report, &args.report)
            .with_context(|| format!("failed to write {}", args.report.display()))?;
        info!("Report written to {}", args.report.display());
    }

    if !report.passed {
        let failures: Vec<String> = report
            .failures()
            .map(|(scenario, failure)| format!("{scenario}: {failure}"))
            .collect();
        return Err(anyhow!(
            "benchmark failed ({} issues):\n{}",
            failures.len(),
            failures.join("\n")
        ));
    }
    Ok(())
}

/// Stdout for `-`, otherwise a buffered file with its parent directories created.
fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdout().lock()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn handle_synth(args: SynthArgs) -> Result<()> {
    let model = effort_model(EffortModel::default(), args.resting_hr, args.threshold_hr);
    model.validate()?;
    let session = interval_session_with(&model);

    let format = args.format.unwrap_or_else(|| {
        match args.output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SeriesFormat::Json,
            _ => SeriesFormat::Csv,
        }
    });

    let writer = open_output(&args.output)?;
    match format {
        SeriesFormat::Csv => write_series_csv(&session.points, writer)?,
        SeriesFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, &session.points)
                .context("failed to encode series")?;
            writer.flush()?;
        }
    }

    if args.segments && args.output.as_os_str() != "-" {
        let path = args.output.with_extension("segments.json");
        let json = serde_json::to_string_pretty(&session.segments)
            .context("failed to encode segments")?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Segments written to {}", path.display());
    }
    info!(
        "Synthetic session: {} samples, {} segments",
        session.points.len(),
        session.segments.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_lists() {
        let widths: Vec<u32> = parse_list("375, 768,1200", "widths").unwrap();
        assert_eq!(widths, vec![375, 768, 1200]);
        assert!(parse_list::<f64>("1.0,abc", "dprs").is_err());
        assert!(parse_list::<f64>(" , ", "dprs").is_err());
    }

    #[test]
    fn config_sections_are_optional() {
        let config: ConfigFile =
            serde_json::from_str(r#"{"render":{"gradient_alpha":0.5}}"#).unwrap();
        assert_eq!(config.render.gradient_alpha, 0.5);
        assert_eq!(config.render.downsample_target, 500);
        assert_eq!(config.bench.widths.len(), 5);
    }

    #[test]
    fn output_directory_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let err = match open_output(&blocker.join("nested").join("session.csv")) {
            Ok(_) => panic!("expected directory creation to fail"),
            Err(err) => err,
        };
        assert!(format!("{err:#}").contains("failed to create directory"));

        let ok = dir.path().join("deep").join("session.csv");
        open_output(&ok).unwrap();
        assert!(ok.exists());
    }

    #[test]
    fn flags_override_effort_model() {
        let model = effort_model(EffortModel::default(), Some(50.0), None);
        assert_eq!(model.resting_hr, 50.0);
        assert_eq!(model.threshold_hr, 175.0);
    }

    #[test]
    fn cli_parses_render_flags() {
        let cli = Cli::try_parse_from([
            "effort-render",
            "render",
            "a.csv",
            "b.json",
            "--dpr",
            "2",
            "--pointer-x",
            "300",
        ])
        .unwrap();
        match cli.command {
            Command::Render(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.dpr, Some(2.0));
                assert_eq!(args.pointer_x, Some(300.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
