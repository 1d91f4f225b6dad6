//! Extraction worker - runs in a document's scoped thread pool

use std::path::{Path, PathBuf};

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::accel::PixelTransform;
use super::progress::CancellationFlag;
use super::render::{DocumentLoader, PageSource};
use super::request::{ExtractionJob, ExtractionOutcome, JobCompletion, JobFault};
use super::writer::ImageWriter;

/// What every worker of one document shares
pub(crate) struct WorkerContext<'a, L: DocumentLoader> {
    pub loader: &'a L,
    pub document: &'a Path,
    pub writer: &'a dyn ImageWriter,
    pub accelerator: Option<&'a dyn PixelTransform>,
    pub dpi: f32,
    pub cancel: &'a CancellationFlag,
}

/// Main worker function - pulls jobs from the shared queue until it is empty,
/// the run is cancelled, or the driver stops listening.
///
/// Opens its own handle on the document. A worker that cannot open it exits
/// without taking any job, leaving the queue to workers that can.
pub(crate) fn extraction_worker<L: DocumentLoader>(
    ctx: &WorkerContext<'_, L>,
    jobs: Receiver<ExtractionJob>,
    completions: Sender<JobCompletion>,
) {
    let doc = match ctx.loader.open(ctx.document) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Worker failed to open {}: {e}", ctx.document.display());
            return;
        }
    };

    loop {
        // Checked before taking a job so queued pages stay queued
        if ctx.cancel.is_cancelled() {
            debug!("Cancellation observed, worker exiting");
            break;
        }
        let Ok(job) = jobs.recv() else {
            break;
        };

        let outcome = match extract_page(&doc, &job, ctx) {
            Ok(path) => ExtractionOutcome::Success(path),
            Err(fault) => ExtractionOutcome::Failure(fault),
        };

        let completion = JobCompletion {
            page_index: job.page_index,
            outcome,
        };
        if completions.send(completion).is_err() {
            debug!("Driver stopped listening, worker exiting");
            break;
        }
    }
}

/// Render, optionally accelerate, encode
fn extract_page<D: PageSource, L: DocumentLoader>(
    doc: &D,
    job: &ExtractionJob,
    ctx: &WorkerContext<'_, L>,
) -> Result<PathBuf, JobFault> {
    let mut raster = doc.render_page(job.page_index, ctx.dpi)?;

    if job.accelerate {
        if let Some(transform) = ctx.accelerator {
            transform.apply(&mut raster);
        }
    }

    ctx.writer.write(&raster, job.format, &job.output_path)?;
    debug!(
        "Wrote page {} ({}x{}) to {}",
        job.page_index + 1,
        raster.width_px,
        raster.height_px,
        job.output_path.display()
    );
    Ok(job.output_path.clone())
}
