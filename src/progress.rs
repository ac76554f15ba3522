//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and renders diagrams.
//!
//! Callbacks are the least-invasive integration point: a host can forward
//! events to a channel, a log, or a terminal progress bar without the library
//! knowing how it communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_diagram_rendered(&self, index: usize, total: usize) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("diagram {index}/{total}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { rendered: AtomicUsize::new(0) });
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in pipeline order from a single task.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the input has been read.
    ///
    /// # Arguments
    /// * `total_diagrams`: Mermaid blocks that will be rendered
    fn on_conversion_start(&self, total_diagrams: usize) {
        let _ = total_diagrams;
    }

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each diagram renders.
    ///
    /// # Arguments
    /// * `index`: 1-based position of the diagram
    /// * `total`: number of diagrams in the document
    fn on_diagram_rendered(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once when the PDF is in place.
    fn on_conversion_complete(&self, pdf_path: &Path) {
        let _ = pdf_path;
    }

    /// Called once when the run stops with an error.
    fn on_conversion_failed(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_conversion_start(&self, total_diagrams: usize) {
            self.events.lock().unwrap().push(format!("start {total_diagrams}"));
        }

        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("begin {stage}"));
        }

        fn on_diagram_rendered(&self, index: usize, total: usize) {
            self.events.lock().unwrap().push(format!("diagram {index}/{total}"));
        }

        fn on_conversion_failed(&self, stage: Stage, _error: &str) {
            self.events.lock().unwrap().push(format!("failed {stage}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(2);
        cb.on_stage_start(Stage::Diagrams);
        cb.on_diagram_rendered(1, 2);
        cb.on_stage_complete(Stage::Diagrams, 10);
        cb.on_conversion_complete(Path::new("out.pdf"));
        cb.on_conversion_failed(Stage::Pdf, "boom");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_conversion_start(1);
        rec.on_stage_start(Stage::Diagrams);
        rec.on_diagram_rendered(1, 1);
        rec.on_stage_complete(Stage::Diagrams, 5);
        rec.on_conversion_failed(Stage::Html, "pandoc");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start 1", "begin diagrams", "diagram 1/1", "failed html"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Input);
    }
}
