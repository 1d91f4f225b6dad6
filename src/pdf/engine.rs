//! Extraction engine - pre-scans documents, then drives one worker pool per document

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flume::Receiver;
use log::{debug, error, info, warn};

use super::accel::{self, PixelTransform};
use super::budget::{DEFAULT_WORKER_ALLOWANCE, HostMetrics};
use super::filename::unique_dir_names;
use super::progress::{CancellationFlag, ProgressSink};
use super::render::{DocumentLoader, PageSource};
use super::request::{
    ConfigError, DocumentFailure, ExtractionJob, ExtractionOutcome, ExtractionRequest,
    JobCompletion, JobFault, PageFailure,
};
use super::types::{ProgressState, RunPhase};
use super::worker::{WorkerContext, extraction_worker};
use super::writer::{ImageWriter, page_file_name};
use super::{DEFAULT_DPI, MIN_DPI};

/// Tunables that stay fixed across runs
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Render resolution, never below [`MIN_DPI`]
    pub dpi: f32,
    /// Memory set aside per concurrent worker, in bytes
    pub per_worker_allowance: u64,
    /// Optional hard cap on workers per document
    pub max_workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            per_worker_allowance: DEFAULT_WORKER_ALLOWANCE,
            max_workers: None,
        }
    }
}

/// What a run did
#[derive(Debug, Default)]
pub struct RunReport {
    /// `Completed` or `Cancelled` once the run returns
    pub phase: RunPhase,
    pub progress: ProgressState,
    /// Files written, in completion order. Includes pages that were in
    /// flight when the run was cancelled, which `progress` does not count.
    pub written: Vec<PathBuf>,
    pub page_failures: Vec<PageFailure>,
    pub document_failures: Vec<DocumentFailure>,
}

impl RunReport {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.phase == RunPhase::Cancelled
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid run transition {:?} -> {next:?}",
            self.phase
        );
        info!("Run phase {:?} -> {next:?}", self.phase);
        self.phase = next;
    }
}

/// Selected page counts per document; `None` for documents that did not open
struct ScanPlan {
    pages: Vec<Option<usize>>,
}

impl ScanPlan {
    fn total(&self) -> usize {
        self.pages.iter().flatten().sum()
    }
}

enum DocumentStatus {
    Finished,
    Cancelled,
}

/// Extracts selected pages of PDF documents to image files
pub struct ExtractionEngine<L> {
    loader: L,
    writer: Box<dyn ImageWriter>,
    accelerator: Option<Arc<dyn PixelTransform>>,
    config: EngineConfig,
}

impl<L: DocumentLoader> ExtractionEngine<L> {
    /// Create an engine using this process's acceleration path, if any
    #[must_use]
    pub fn new(loader: L, writer: impl ImageWriter + 'static, mut config: EngineConfig) -> Self {
        config.dpi = config.dpi.max(MIN_DPI);
        Self {
            loader,
            writer: Box::new(writer),
            accelerator: accel::probe(),
            config,
        }
    }

    /// Replace the acceleration path; `None` forces the plain path
    #[must_use]
    pub fn with_accelerator(mut self, accelerator: Option<Arc<dyn PixelTransform>>) -> Self {
        self.accelerator = accelerator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Run one extraction to completion or cancellation.
    ///
    /// Only configuration problems are errors. Pages that fail to render or
    /// encode, and documents that fail to open, are logged and listed in the
    /// report while the run carries on.
    pub fn run(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationFlag,
        progress: &dyn ProgressSink,
    ) -> Result<RunReport, ConfigError> {
        request.validate()?;
        fs::create_dir_all(&request.output_dir).map_err(|source| ConfigError::OutputDir {
            path: request.output_dir.clone(),
            source,
        })?;

        let mut report = RunReport::default();
        report.advance(RunPhase::PreScanning);

        let Some(plan) = self.pre_scan(request, cancel, &mut report) else {
            report.advance(RunPhase::Cancelled);
            return Ok(report);
        };
        report.progress = ProgressState::new(plan.total(), 0);
        progress.publish(report.progress);

        report.advance(RunPhase::Executing);
        let inputs = RunInputs {
            request,
            accelerate: self.acceleration_for(request),
            cancel,
            progress,
        };
        let dir_names = batch_dir_names(request);

        for ((document, planned), dir_name) in
            request.documents.iter().zip(&plan.pages).zip(&dir_names)
        {
            if cancel.is_cancelled() {
                info!("Cancellation observed before {}", document.display());
                report.advance(RunPhase::Cancelled);
                return Ok(report);
            }

            let Some(planned) = *planned else {
                debug!("Skipping {}: unreadable during pre-scan", document.display());
                continue;
            };

            let status =
                self.extract_document(document, dir_name.as_deref(), planned, &inputs, &mut report);
            if let DocumentStatus::Cancelled = status {
                report.advance(RunPhase::Cancelled);
                return Ok(report);
            }
        }

        report.advance(RunPhase::Completed);
        info!(
            "Extraction finished: {}/{} pages, {} page failures, {} unreadable documents",
            report.progress.completed,
            report.progress.total,
            report.page_failures.len(),
            report.document_failures.len()
        );
        Ok(report)
    }

    /// Count selected pages per document. `None` if cancelled.
    fn pre_scan(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationFlag,
        report: &mut RunReport,
    ) -> Option<ScanPlan> {
        let mut pages = Vec::with_capacity(request.documents.len());

        for document in &request.documents {
            if cancel.is_cancelled() {
                info!("Cancellation observed during pre-scan");
                return None;
            }

            match self.loader.open(document) {
                Ok(doc) => {
                    let selected = request.selection.resolve(doc.page_count()).len();
                    debug!(
                        "Pre-scan {}: {selected} of {} pages selected",
                        document.display(),
                        doc.page_count()
                    );
                    pages.push(Some(selected));
                }
                Err(cause) => {
                    warn!("Skipping {}: {cause}", document.display());
                    report.document_failures.push(DocumentFailure {
                        document: document.clone(),
                        cause,
                    });
                    pages.push(None);
                }
            }
        }

        Some(ScanPlan { pages })
    }

    fn acceleration_for(&self, request: &ExtractionRequest) -> bool {
        if !request.accelerate {
            return false;
        }
        match &self.accelerator {
            Some(transform) => {
                info!("Using acceleration path: {}", transform.name());
                true
            }
            None => {
                info!("Acceleration unavailable, using the plain path");
                false
            }
        }
    }

    fn worker_count(&self, pages: usize) -> usize {
        let mut workers = HostMetrics::probe().worker_budget(self.config.per_worker_allowance);
        if let Some(cap) = self.config.max_workers {
            workers = workers.min(cap.max(1));
        }
        workers.min(pages).max(1)
    }

    fn extract_document(
        &self,
        document: &Path,
        dir_name: Option<&str>,
        planned: usize,
        inputs: &RunInputs<'_>,
        report: &mut RunReport,
    ) -> DocumentStatus {
        let request = inputs.request;
        let doc = match self.loader.open(document) {
            Ok(doc) => doc,
            Err(cause) => {
                warn!("Skipping {}: {cause}", document.display());
                report.document_failures.push(DocumentFailure {
                    document: document.to_path_buf(),
                    cause,
                });
                return DocumentStatus::Finished;
            }
        };

        let output_dir = match document_output_dir(&request.output_dir, dir_name) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Skipping {}: {e}", document.display());
                report.document_failures.push(DocumentFailure {
                    document: document.to_path_buf(),
                    cause: JobFault::Io(e),
                });
                return DocumentStatus::Finished;
            }
        };

        let mut pages = request.selection.resolve(doc.page_count());
        if pages.len() > planned {
            warn!(
                "{} changed since pre-scan, extracting only the first {planned} selected pages",
                document.display()
            );
            pages.truncate(planned);
        }
        if pages.is_empty() {
            info!("No selected pages in {}", document.display());
            return DocumentStatus::Finished;
        }

        let workers = self.worker_count(pages.len());
        info!(
            "Extracting {} pages from {} with {workers} workers",
            pages.len(),
            document.display()
        );

        let (job_tx, job_rx) = flume::unbounded();
        let (done_tx, done_rx) = flume::unbounded();

        for &page_index in &pages {
            let job = ExtractionJob {
                page_index,
                output_path: output_dir.join(page_file_name(page_index, request.format)),
                format: request.format,
                accelerate: inputs.accelerate,
            };
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let ctx = WorkerContext {
            loader: &self.loader,
            document,
            writer: self.writer.as_ref(),
            accelerator: self.accelerator.as_deref(),
            dpi: self.config.dpi,
            cancel: inputs.cancel,
        };

        let status = std::thread::scope(|scope| {
            let mut spawned = 0usize;
            for worker_id in 0..workers {
                let jobs = job_rx.clone();
                let completions = done_tx.clone();
                let ctx = &ctx;
                let spawn = std::thread::Builder::new()
                    .name(format!("pagerip-worker-{worker_id}"))
                    .spawn_scoped(scope, move || extraction_worker(ctx, jobs, completions));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        error!("Failed to spawn extraction worker: {e}");
                        break;
                    }
                }
            }

            if spawned == 0 {
                warn!("No worker threads, extracting on the driver thread");
                extraction_worker(&ctx, job_rx.clone(), done_tx.clone());
            }
            drop(done_tx);

            drain_completions(document, &done_rx, &job_rx, inputs, report)
        });

        // Workers are joined. Pages that finished after cancellation are
        // on disk, so list them without counting them as progress.
        if let DocumentStatus::Cancelled = status {
            let late = done_rx
                .try_iter()
                .map(|completion| record_completion(document, completion, report))
                .count();
            if late > 0 {
                debug!(
                    "{late} pages of {} finished after cancellation",
                    document.display()
                );
            }
        }

        drop(doc);
        status
    }
}

/// Per-run inputs shared by every document
struct RunInputs<'a> {
    request: &'a ExtractionRequest,
    accelerate: bool,
    cancel: &'a CancellationFlag,
    progress: &'a dyn ProgressSink,
}

/// Count each completion, first finished first reported. On cancellation
/// the pages still queued are dropped; in-flight pages finish and are listed
/// in the report but not counted.
fn drain_completions(
    document: &Path,
    completions: &Receiver<JobCompletion>,
    pending: &Receiver<ExtractionJob>,
    inputs: &RunInputs<'_>,
    report: &mut RunReport,
) -> DocumentStatus {
    for completion in completions.iter() {
        if inputs.cancel.is_cancelled() {
            record_completion(document, completion, report);
            return abandon(document, pending);
        }

        record_completion(document, completion, report);
        report.progress.completed += 1;
        inputs.progress.publish(report.progress);
    }

    // Every worker has exited. Jobs still queued had no worker able to
    // open the document, or were left behind by cancellation.
    if pending.is_empty() {
        return DocumentStatus::Finished;
    }
    if inputs.cancel.is_cancelled() {
        return abandon(document, pending);
    }

    let orphaned: Vec<ExtractionJob> = pending.drain().collect();
    warn!(
        "No worker could open {}, failing {} pages",
        document.display(),
        orphaned.len()
    );
    for job in orphaned {
        let completion = JobCompletion {
            page_index: job.page_index,
            outcome: ExtractionOutcome::Failure(JobFault::generic(
                "document unavailable to every worker",
            )),
        };
        record_completion(document, completion, report);
        report.progress.completed += 1;
        inputs.progress.publish(report.progress);
    }

    DocumentStatus::Finished
}

fn abandon(document: &Path, pending: &Receiver<ExtractionJob>) -> DocumentStatus {
    let abandoned = pending.drain().count();
    info!(
        "Cancellation observed in {}: abandoning {abandoned} pending pages",
        document.display()
    );
    DocumentStatus::Cancelled
}

fn record_completion(document: &Path, completion: JobCompletion, report: &mut RunReport) {
    let page = completion.page_index + 1;
    match completion.outcome {
        ExtractionOutcome::Success(path) => report.written.push(path),
        ExtractionOutcome::Failure(cause) => {
            warn!("Page {page} of {} failed: {cause}", document.display());
            report.page_failures.push(PageFailure {
                document: document.to_path_buf(),
                page,
                cause,
            });
        }
    }
}

/// Subdirectory name per document in batch mode, `None` otherwise
fn batch_dir_names(request: &ExtractionRequest) -> Vec<Option<String>> {
    if request.selection.is_batch() {
        unique_dir_names(&request.documents)
            .into_iter()
            .map(Some)
            .collect()
    } else {
        vec![None; request.documents.len()]
    }
}

/// Batch mode gets a subdirectory per document, other modes share the root
fn document_output_dir(root: &Path, dir_name: Option<&str>) -> io::Result<PathBuf> {
    let Some(name) = dir_name else {
        return Ok(root.to_path_buf());
    };
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
