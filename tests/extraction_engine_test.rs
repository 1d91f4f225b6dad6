use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pagerip::pdf::accel::SimdRoundTrip;
use pagerip::pdf::{
    CancellationFlag, ConfigError, EngineConfig, ExtractionEngine, ExtractionRequest,
    ImageCrateWriter, ImageWriter, JobFault, NullProgress, OutputFormat, ProgressState,
    RasterPage, RunPhase, SelectionSpec,
};
use pagerip::test_utils::test_helpers::{
    FAKE_PAGE_HEIGHT, FAKE_PAGE_WIDTH, FakeDocumentSpec, FakeLoader, RecordingSink, fake_raster,
    list_files,
};
use tempfile::TempDir;

fn engine(loader: FakeLoader) -> ExtractionEngine<FakeLoader> {
    ExtractionEngine::new(loader, ImageCrateWriter::default(), EngineConfig::default())
        .with_accelerator(None)
}

fn request(documents: &[&str], output_dir: &Path, selection: SelectionSpec) -> ExtractionRequest {
    ExtractionRequest {
        documents: documents.iter().map(PathBuf::from).collect(),
        output_dir: output_dir.to_path_buf(),
        selection,
        format: OutputFormat::Png,
        accelerate: false,
    }
}

fn page(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

#[test]
fn batch_of_two_documents_lands_in_subdirectories() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("alpha.pdf", FakeDocumentSpec::pages(3))
            .with_document("beta.pdf", FakeDocumentSpec::pages(2)),
    );
    let sink = RecordingSink::new();

    let report = engine
        .run(
            &request(&["alpha.pdf", "beta.pdf"], temp_dir.path(), SelectionSpec::BatchWhole),
            &CancellationFlag::new(),
            &sink,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(5, 5));
    assert_eq!(
        list_files(&temp_dir.path().join("alpha")),
        vec!["page_1.png", "page_2.png", "page_3.png"]
    );
    assert_eq!(
        list_files(&temp_dir.path().join("beta")),
        vec!["page_1.png", "page_2.png"]
    );
    assert_eq!(sink.updates().last(), Some(&ProgressState::new(5, 5)));
}

#[test]
fn progress_is_monotonic_and_reaches_total() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("a.pdf", FakeDocumentSpec::pages(4))
            .with_document("b.pdf", FakeDocumentSpec::pages(7)),
    );
    let (tx, rx) = flume::unbounded();

    let report = engine
        .run(
            &request(&["a.pdf", "b.pdf"], temp_dir.path(), SelectionSpec::BatchWhole),
            &CancellationFlag::new(),
            &tx,
        )
        .unwrap();
    drop(tx);

    let updates: Vec<ProgressState> = rx.iter().collect();
    assert_eq!(updates.first(), Some(&ProgressState::new(11, 0)));
    assert!(updates.iter().all(|p| p.total == 11));
    assert!(updates.windows(2).all(|w| w[1].completed == w[0].completed + 1));
    assert_eq!(updates.last(), Some(&ProgressState::new(11, 11)));
    assert_eq!(report.written.len(), 11);
}

#[test]
fn failing_page_does_not_stop_its_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(5).failing(2)));

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(5, 5));
    assert_eq!(
        list_files(temp_dir.path()),
        vec!["page_1.png", "page_2.png", "page_4.png", "page_5.png"]
    );
    assert_eq!(report.page_failures.len(), 1);
    assert_eq!(report.page_failures[0].page, 3);
    assert_eq!(report.page_failures[0].document, PathBuf::from("doc.pdf"));
}

#[test]
fn cancelling_after_first_document_skips_the_rest() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("one.pdf", FakeDocumentSpec::pages(2))
            .with_document("two.pdf", FakeDocumentSpec::pages(2))
            .with_document("three.pdf", FakeDocumentSpec::pages(2)),
    );
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let sink = RecordingSink::with_hook(move |progress| {
        if progress.completed == 2 {
            trigger.cancel();
        }
    });

    let report = engine
        .run(
            &request(
                &["one.pdf", "two.pdf", "three.pdf"],
                temp_dir.path(),
                SelectionSpec::BatchWhole,
            ),
            &cancel,
            &sink,
        )
        .unwrap();

    assert!(report.is_cancelled());
    assert_eq!(report.progress, ProgressState::new(6, 2));
    assert_eq!(list_files(&temp_dir.path().join("one")), vec!["page_1.png", "page_2.png"]);
    assert!(!temp_dir.path().join("two").exists());
    assert!(!temp_dir.path().join("three").exists());
}

#[test]
fn cancelled_before_start_publishes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(3)));
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let sink = RecordingSink::new();

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &cancel,
            &sink,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Cancelled);
    assert!(sink.updates().is_empty());
    assert!(list_files(temp_dir.path()).is_empty());
}

#[test]
fn unreadable_document_is_skipped_and_recorded() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("broken.pdf", FakeDocumentSpec::unreadable())
            .with_document("good.pdf", FakeDocumentSpec::pages(2)),
    );

    let report = engine
        .run(
            &request(&["broken.pdf", "good.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(2, 2));
    assert_eq!(report.document_failures.len(), 1);
    assert_eq!(report.document_failures[0].document, PathBuf::from("broken.pdf"));
    assert_eq!(list_files(temp_dir.path()), vec!["page_1.png", "page_2.png"]);
}

#[test]
fn document_failing_after_pre_scan_leaves_progress_short() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("flaky.pdf", FakeDocumentSpec::pages(3).open_budget(1))
            .with_document("good.pdf", FakeDocumentSpec::pages(1)),
    );

    let report = engine
        .run(
            &request(&["flaky.pdf", "good.pdf"], temp_dir.path(), SelectionSpec::BatchWhole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(4, 1));
    assert_eq!(report.document_failures.len(), 1);
    assert!(!report.progress.is_complete());
}

#[test]
fn spare_worker_failing_to_open_loses_no_pages() {
    let temp_dir = TempDir::new().unwrap();
    // pre-scan, driver and one worker open; any further worker fails
    let loader =
        FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(40).open_budget(3));
    let config = EngineConfig {
        max_workers: Some(2),
        ..EngineConfig::default()
    };
    let engine = ExtractionEngine::new(loader, ImageCrateWriter::default(), config)
        .with_accelerator(None);

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.progress, ProgressState::new(40, 40));
    assert!(report.page_failures.is_empty());
    assert_eq!(list_files(temp_dir.path()).len(), 40);
}

#[test]
fn document_unavailable_to_every_worker_fails_its_pages() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(3).open_budget(2)));

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(3, 3));
    assert_eq!(report.page_failures.len(), 3);
    assert!(report.written.is_empty());
}

/// Cancels the run once it has written `after` pages
struct CancelAfterWrites {
    inner: ImageCrateWriter,
    cancel: CancellationFlag,
    after: usize,
    writes: AtomicUsize,
}

impl ImageWriter for CancelAfterWrites {
    fn write(&self, page: &RasterPage, format: OutputFormat, path: &Path) -> Result<(), JobFault> {
        self.inner.write(page, format, path)?;
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancel.cancel();
        }
        Ok(())
    }
}

#[test]
fn cancelling_mid_document_starts_no_further_pages() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationFlag::new();
    let writer = CancelAfterWrites {
        inner: ImageCrateWriter::default(),
        cancel: cancel.clone(),
        after: 1,
        writes: AtomicUsize::new(0),
    };
    let config = EngineConfig {
        max_workers: Some(1),
        ..EngineConfig::default()
    };
    let engine = ExtractionEngine::new(
        FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(200)),
        writer,
        config,
    )
    .with_accelerator(None);

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &cancel,
            &NullProgress,
        )
        .unwrap();

    assert!(report.is_cancelled());
    // The in-flight page finished after cancellation: on disk, not counted
    assert_eq!(report.progress, ProgressState::new(200, 0));
    assert_eq!(list_files(temp_dir.path()), vec!["page_1.png"]);
    assert_eq!(report.written, vec![temp_dir.path().join("page_1.png")]);
}

#[test]
fn report_lists_every_file_left_by_a_cancelled_run() {
    let temp_dir = TempDir::new().unwrap();
    let engine = ExtractionEngine::new(
        FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(200)),
        ImageCrateWriter::default(),
        EngineConfig {
            max_workers: Some(1),
            ..EngineConfig::default()
        },
    )
    .with_accelerator(None);
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    let sink = RecordingSink::with_hook(move |progress| {
        if progress.completed == 1 {
            trigger.cancel();
        }
    });

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &cancel,
            &sink,
        )
        .unwrap();

    assert!(report.is_cancelled());
    assert_eq!(report.progress, ProgressState::new(200, 1));
    assert_eq!(report.written.len(), list_files(temp_dir.path()).len());
}

#[test]
fn batch_documents_sharing_a_name_get_separate_directories() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(
        FakeLoader::new()
            .with_document("2023/report.pdf", FakeDocumentSpec::pages(2))
            .with_document("2024/report.pdf", FakeDocumentSpec::pages(1)),
    );

    let report = engine
        .run(
            &request(
                &["2023/report.pdf", "2024/report.pdf"],
                temp_dir.path(),
                SelectionSpec::BatchWhole,
            ),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.progress, ProgressState::new(3, 3));
    assert_eq!(
        list_files(&temp_dir.path().join("report")),
        vec!["page_1.png", "page_2.png"]
    );
    assert_eq!(list_files(&temp_dir.path().join("report_2")), vec!["page_1.png"]);
}

#[test]
fn missing_documents_rejected_before_any_open() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new());

    let err = engine
        .run(
            &request(&[], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap_err();

    assert!(matches!(err, ConfigError::NoDocuments));
    assert_eq!(engine.loader().open_count(), 0);
}

#[test]
fn inverted_range_is_a_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(10)));
    let selection = SelectionSpec::Range {
        start: page(5),
        end: page(2),
    };

    let err = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), selection),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidRange(_)));
    assert_eq!(engine.loader().open_count(), 0);
}

#[test]
fn range_is_clipped_to_the_document() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(6)));
    let selection = SelectionSpec::Range {
        start: page(5),
        end: page(20),
    };

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), selection),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.progress, ProgressState::new(2, 2));
    assert_eq!(list_files(temp_dir.path()), vec!["page_5.png", "page_6.png"]);
}

#[test]
fn page_past_the_end_completes_with_nothing_to_do() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(3)));
    let sink = RecordingSink::new();

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::SinglePage(page(9))),
            &CancellationFlag::new(),
            &sink,
        )
        .unwrap();

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.progress, ProgressState::new(0, 0));
    assert_eq!(sink.updates(), vec![ProgressState::new(0, 0)]);
    assert!(list_files(temp_dir.path()).is_empty());
}

#[test]
fn jpeg_output_keeps_rendered_dimensions() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(2)));
    let mut request = request(&["doc.pdf"], temp_dir.path(), SelectionSpec::SinglePage(page(2)));
    request.format = OutputFormat::Jpeg;

    let report = engine
        .run(&request, &CancellationFlag::new(), &NullProgress)
        .unwrap();

    assert_eq!(report.written, vec![temp_dir.path().join("page_2.jpeg")]);
    let decoded = image::open(&report.written[0]).unwrap();
    assert_eq!(decoded.width(), FAKE_PAGE_WIDTH);
    assert_eq!(decoded.height(), FAKE_PAGE_HEIGHT);
}

#[test]
fn accelerated_and_plain_paths_write_identical_pixels() {
    let loader = || FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(2));
    let plain_dir = TempDir::new().unwrap();
    let fast_dir = TempDir::new().unwrap();

    engine(loader())
        .run(
            &request(&["doc.pdf"], plain_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    let mut accelerated = request(&["doc.pdf"], fast_dir.path(), SelectionSpec::Whole);
    accelerated.accelerate = true;
    engine(loader())
        .with_accelerator(Some(Arc::new(SimdRoundTrip)))
        .run(&accelerated, &CancellationFlag::new(), &NullProgress)
        .unwrap();

    for (index, name) in ["page_1.png", "page_2.png"].iter().enumerate() {
        let plain = image::open(plain_dir.path().join(name)).unwrap().to_rgb8();
        let fast = image::open(fast_dir.path().join(name)).unwrap().to_rgb8();
        assert_eq!(plain.as_raw(), fast.as_raw());
        assert_eq!(plain.as_raw(), &fake_raster(index).pixels);
    }
}

#[test]
fn single_worker_cap_still_extracts_everything() {
    let temp_dir = TempDir::new().unwrap();
    let config = EngineConfig {
        max_workers: Some(1),
        ..EngineConfig::default()
    };
    let engine = ExtractionEngine::new(
        FakeLoader::new().with_document("doc.pdf", FakeDocumentSpec::pages(6)),
        ImageCrateWriter::default(),
        config,
    );

    let report = engine
        .run(
            &request(&["doc.pdf"], temp_dir.path(), SelectionSpec::Whole),
            &CancellationFlag::new(),
            &NullProgress,
        )
        .unwrap();

    assert_eq!(report.progress, ProgressState::new(6, 6));
    assert_eq!(list_files(temp_dir.path()).len(), 6);
}
