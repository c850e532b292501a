//! Progress-callback trait for per-cell rendering events.
//!
//! Pass an [`Arc<dyn RenderProgressCallback>`] to [`crate::batch::run_batch`]
//! to receive events as the batch works through each column.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least invasive integration point: a caller can drive a
//! terminal progress bar, forward events to a channel, or count outcomes,
//! without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use cell2png::RenderProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl RenderProgressCallback for CountingCallback {
//!     fn on_cell_complete(&self, sheet: &str, column: &str, row: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{sheet}_{column}/{row}.png ({n} so far)");
//!     }
//! }
//!
//! let cb: Arc<dyn RenderProgressCallback> = Arc::new(CountingCallback {
//!     done: AtomicUsize::new(0),
//! });
//! cb.on_cell_complete("Que_L", "B", 2);
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as it renders each cell.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `column` is the spreadsheet label (`"B"`, `"AA"`),
/// `row` is 1-based.
pub trait RenderProgressCallback: Send + Sync {
    /// Called once, after every sheet has been read, with the number of
    /// non-blank cells that will be rendered.
    fn on_batch_start(&self, total_cells: usize) {
        let _ = total_cells;
    }

    /// Called when a column folder has been prepared.
    fn on_column_start(&self, sheet: &str, column: &str, cells: usize) {
        let _ = (sheet, column, cells);
    }

    /// Called just before a cell is rendered.
    fn on_cell_start(&self, sheet: &str, column: &str, row: usize) {
        let _ = (sheet, column, row);
    }

    /// Called when a cell's PNG has been written.
    fn on_cell_complete(&self, sheet: &str, column: &str, row: usize) {
        let _ = (sheet, column, row);
    }

    /// Called when a cell fails. `error` is human-readable.
    fn on_cell_error(&self, sheet: &str, column: &str, row: usize, error: &str) {
        let _ = (sheet, column, row, error);
    }

    /// Called after every cell of a column has been attempted.
    fn on_column_complete(&self, sheet: &str, column: &str, attempted: usize, succeeded: usize) {
        let _ = (sheet, column, attempted, succeeded);
    }

    /// Called once after all sets have been processed.
    fn on_batch_complete(&self, attempted: usize, succeeded: usize) {
        let _ = (attempted, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type accepted by [`crate::batch::run_batch`].
pub type ProgressCallback = Arc<dyn RenderProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<(String, usize)>>,
    }

    impl RenderProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_cells: usize) {
            self.total.store(total_cells, Ordering::SeqCst);
        }

        fn on_cell_complete(&self, _sheet: &str, _column: &str, _row: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cell_error(&self, sheet: &str, column: &str, row: usize, _error: &str) {
            self.errors
                .lock()
                .unwrap()
                .push((format!("{sheet}_{column}"), row));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(5);
        cb.on_column_start("Ans", "D", 5);
        cb.on_cell_start("Ans", "D", 2);
        cb.on_cell_complete("Ans", "D", 2);
        cb.on_cell_error("Ans", "D", 3, "xelatex: exited with 1");
        cb.on_column_complete("Ans", "D", 5, 4);
        cb.on_batch_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        tracker.on_cell_complete("Que_L", "B", 1);
        tracker.on_cell_complete("Que_L", "B", 2);
        tracker.on_cell_error("Que_L", "B", 3, "compile failed");

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(
            *tracker.errors.lock().unwrap(),
            vec![("Que_L_B".to_string(), 3)]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_cell_complete("Ans", "I", 1);
    }
}
