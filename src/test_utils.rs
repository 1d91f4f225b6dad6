pub mod test_helpers {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use crate::pdf::{
        DocumentLoader, JobFault, PageSource, ProgressSink, ProgressState, RasterPage,
    };

    pub const FAKE_PAGE_WIDTH: u32 = 5;
    pub const FAKE_PAGE_HEIGHT: u32 = 4;

    /// Shape of a simulated document
    #[derive(Clone, Debug, Default)]
    pub struct FakeDocumentSpec {
        pub page_count: usize,
        /// 0-based pages whose render fails
        pub failing_pages: Vec<usize>,
        /// Every open fails
        pub unreadable: bool,
        /// Opens that succeed before every later open fails
        pub open_budget: Option<usize>,
    }

    impl FakeDocumentSpec {
        pub fn pages(page_count: usize) -> Self {
            Self {
                page_count,
                ..Self::default()
            }
        }

        pub fn failing(mut self, page_index: usize) -> Self {
            self.failing_pages.push(page_index);
            self
        }

        pub fn unreadable() -> Self {
            Self {
                unreadable: true,
                ..Self::default()
            }
        }

        pub fn open_budget(mut self, opens: usize) -> Self {
            self.open_budget = Some(opens);
            self
        }
    }

    /// In-memory stand-in for a PDF backend
    #[derive(Default)]
    pub struct FakeLoader {
        documents: HashMap<PathBuf, FakeDocumentSpec>,
        opens: Mutex<HashMap<PathBuf, usize>>,
        total_opens: AtomicUsize,
    }

    impl FakeLoader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_document(mut self, path: impl Into<PathBuf>, spec: FakeDocumentSpec) -> Self {
            self.documents.insert(path.into(), spec);
            self
        }

        /// Open attempts across all documents, failed ones included
        pub fn open_count(&self) -> usize {
            self.total_opens.load(Ordering::SeqCst)
        }
    }

    impl DocumentLoader for FakeLoader {
        type Document = FakeDocument;

        fn open(&self, path: &Path) -> Result<FakeDocument, JobFault> {
            self.total_opens.fetch_add(1, Ordering::SeqCst);

            let spec = self
                .documents
                .get(path)
                .ok_or_else(|| JobFault::generic(format!("no such document: {}", path.display())))?;
            if spec.unreadable {
                return Err(JobFault::generic("simulated corrupt document"));
            }

            let mut opens = self.opens.lock().unwrap_or_else(PoisonError::into_inner);
            let count = opens.entry(path.to_path_buf()).or_default();
            *count += 1;
            if spec.open_budget.is_some_and(|budget| *count > budget) {
                return Err(JobFault::generic("simulated open failure"));
            }

            Ok(FakeDocument { spec: spec.clone() })
        }
    }

    pub struct FakeDocument {
        spec: FakeDocumentSpec,
    }

    impl PageSource for FakeDocument {
        fn page_count(&self) -> usize {
            self.spec.page_count
        }

        fn render_page(&self, page_index: usize, _dpi: f32) -> Result<RasterPage, JobFault> {
            if self.spec.failing_pages.contains(&page_index) {
                return Err(JobFault::generic("simulated render failure"));
            }
            if page_index >= self.spec.page_count {
                return Err(JobFault::generic(format!("page {page_index} out of range")));
            }
            Ok(fake_raster(page_index))
        }
    }

    /// Deterministic RGB pattern for a page
    pub fn fake_raster(page_index: usize) -> RasterPage {
        let mut pixels =
            Vec::with_capacity((FAKE_PAGE_WIDTH * FAKE_PAGE_HEIGHT * 3) as usize);
        for y in 0..FAKE_PAGE_HEIGHT as usize {
            for x in 0..FAKE_PAGE_WIDTH as usize {
                let base = (x * 31 + y * 17 + page_index * 7) as u8;
                pixels.extend_from_slice(&[base, base.wrapping_add(85), base.wrapping_add(170)]);
            }
        }
        RasterPage {
            pixels,
            width_px: FAKE_PAGE_WIDTH,
            height_px: FAKE_PAGE_HEIGHT,
        }
    }

    type Hook = Box<dyn Fn(ProgressState) + Send + Sync>;

    /// Keeps every published update, optionally reacting to each
    #[derive(Default)]
    pub struct RecordingSink {
        seen: Mutex<Vec<ProgressState>>,
        hook: Option<Hook>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_hook(hook: impl Fn(ProgressState) + Send + Sync + 'static) -> Self {
            Self {
                seen: Mutex::default(),
                hook: Some(Box::new(hook)),
            }
        }

        pub fn updates(&self) -> Vec<ProgressState> {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn publish(&self, progress: ProgressState) {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(progress);
            if let Some(hook) = &self.hook {
                hook(progress);
            }
        }
    }

    /// File names directly inside `dir`, sorted
    pub fn list_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|entry| entry.path().is_file())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
