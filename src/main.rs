use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use pagerip::panic_handler::initialize_panic_handler;
use pagerip::pdf::{
    CancellationFlag, ExtractionEngine, ExtractionRequest, ImageCrateWriter, MupdfLoader,
    OutputFormat, RunReport, SelectionMode, SelectionSpec, SharedProgress,
};
use pagerip::settings::{self, Settings};

const EXIT_CANCELLED: u8 = 130;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// One page, given with --pages N
    Single,
    /// Inclusive range, given with --pages START-END
    Range,
    /// Every page, all documents into --output
    Whole,
    /// Every page, one subdirectory per document
    Batch,
}

impl From<ModeArg> for SelectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => SelectionMode::SinglePage,
            ModeArg::Range => SelectionMode::Range,
            ModeArg::Whole => SelectionMode::Whole,
            ModeArg::Batch => SelectionMode::BatchWhole,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
        }
    }
}

/// Render PDF pages to image files
#[derive(Parser, Debug)]
#[command(name = "pagerip", version, about)]
struct Cli {
    /// PDF documents to extract from
    #[arg(required = true)]
    documents: Vec<PathBuf>,

    /// Directory receiving the images
    #[arg(short, long)]
    output: PathBuf,

    #[arg(short, long, value_enum, default_value_t = ModeArg::Whole)]
    mode: ModeArg,

    /// Page number (single) or START-END (range), 1-based
    #[arg(short, long)]
    pages: Option<String>,

    #[arg(short, long, value_enum, default_value_t = FormatArg::Png)]
    format: FormatArg,

    /// Request the accelerated pixel path
    #[arg(long)]
    gpu: bool,

    /// Cap on concurrent workers per document
    #[arg(long)]
    workers: Option<usize>,

    /// Render resolution, at least 300
    #[arg(long)]
    dpi: Option<u32>,

    /// Settings file instead of the per-user one
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "pagerip.log")]
    log_file: PathBuf,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {:?}", cli.log_file))?,
    )?;
    initialize_panic_handler();

    info!("Starting pagerip {}", env!("CARGO_PKG_VERSION"));

    let mut settings = settings::load_settings(cli.config.as_deref());
    apply_overrides(&mut settings, &cli);

    let selection = match SelectionSpec::parse(cli.mode.into(), cli.pages.as_deref()) {
        Ok(selection) => selection,
        Err(e) => {
            error!("Invalid selection: {e}");
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let request = ExtractionRequest {
        documents: cli.documents.clone(),
        output_dir: cli.output.clone(),
        selection,
        format: cli.format.into(),
        accelerate: cli.gpu,
    };

    let engine = ExtractionEngine::new(
        MupdfLoader,
        ImageCrateWriter::new(settings.jpeg_quality()),
        settings.engine_config(),
    );

    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!("Could not install Ctrl+C handler: {e}");
    }

    let progress = SharedProgress::new();
    let outcome = std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("pagerip-run".to_string())
            .spawn_scoped(scope, || engine.run(&request, &cancel, &progress))
            .context("Failed to start extraction thread")?;

        watch_progress(&progress, &worker, settings.progress_interval());

        worker
            .join()
            .map_err(|_| anyhow!("Extraction thread panicked"))
    })?;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!("Configuration error: {e}");
            eprintln!("Error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    print_summary(&report);
    info!("Shutting down pagerip");

    Ok(if report.is_cancelled() {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::SUCCESS
    })
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(dpi) = cli.dpi {
        settings.dpi = dpi;
    }
    if let Some(workers) = cli.workers {
        settings.max_workers = Some(workers);
    }
}

/// Poll the shared snapshot until the run thread exits
fn watch_progress<T>(
    progress: &SharedProgress,
    worker: &std::thread::ScopedJoinHandle<'_, T>,
    interval: Duration,
) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    loop {
        let finished = worker.is_finished();
        let snapshot = progress.snapshot();
        bar.set_length(snapshot.total as u64);
        bar.set_position(snapshot.completed as u64);
        bar.set_message(format!(
            "Processed {}/{} pages",
            snapshot.completed, snapshot.total
        ));
        if finished {
            break;
        }
        std::thread::sleep(interval);
    }
    bar.finish();
}

fn print_summary(report: &RunReport) {
    if report.is_cancelled() {
        println!("Extraction cancelled.");
    } else {
        println!("Extraction completed!");
    }
    println!(
        "Processed {}/{} pages, {} files written",
        report.progress.completed,
        report.progress.total,
        report.written.len()
    );

    for failure in &report.document_failures {
        println!(
            "  could not open {}: {}",
            failure.document.display(),
            failure.cause
        );
    }
    for failure in &report.page_failures {
        println!(
            "  page {} of {} failed: {}",
            failure.page,
            failure.document.display(),
            failure.cause
        );
    }
}
