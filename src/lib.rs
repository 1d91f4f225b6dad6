// Export modules for use in tests
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{
    CancellationFlag, ExtractionEngine, ExtractionRequest, OutputFormat, ProgressState,
    RunReport, SelectionSpec,
};
pub use settings::Settings;
