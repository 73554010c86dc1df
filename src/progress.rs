//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders each diagram and produces the PDF.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ConversionProgressCallback, ConversionConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_diagram_complete(&self, ordinal: usize, total: usize, _image: &Path) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("diagram {ordinal}/{total} rendered");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     rendered: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::PdfBackend;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it moves through its stages.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// diagram events may arrive from several renders at once. All methods have
/// default no-op implementations so callers only override what they need.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after extraction.
    ///
    /// # Arguments
    /// * `total_diagrams` — diagram blocks found in the document (may be 0)
    fn on_conversion_start(&self, total_diagrams: usize) {
        let _ = total_diagrams;
    }

    /// Called just before the diagram renderer is spawned for a block.
    fn on_diagram_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called when a block's image exists on disk.
    fn on_diagram_complete(&self, ordinal: usize, total: usize, image_path: &Path) {
        let _ = (ordinal, total, image_path);
    }

    /// Called when a block fails to render. The conversion aborts afterwards.
    fn on_diagram_error(&self, ordinal: usize, total: usize, error: &str) {
        let _ = (ordinal, total, error);
    }

    /// Called before a PDF backend is invoked.
    fn on_pdf_start(&self, backend: PdfBackend) {
        let _ = backend;
    }

    /// Called when a PDF backend fails.
    fn on_pdf_error(&self, backend: PdfBackend, error: &str) {
        let _ = (backend, error);
    }

    /// Called once the PDF is at its final path.
    fn on_conversion_complete(&self, output_path: &Path, backend: PdfBackend) {
        let _ = (output_path, backend);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
