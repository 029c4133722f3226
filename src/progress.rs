//! Observer trait for workflow stage transitions.
//!
//! Inject an [`Arc<dyn WorkflowObserver>`] via
//! [`crate::config::WorkflowConfigBuilder::observer`] to receive an event
//! whenever a request enters or leaves a stage.
//!
//! Callers can forward events to a channel, a WebSocket, a database row or a
//! terminal spinner without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because batch runs drive several
//! workflows concurrently through one observer.
//!
//! # Example
//!
//! ```rust
//! use edgequake_studykit::{WorkflowConfig, WorkflowObserver, WorkflowState};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     entered: AtomicUsize,
//! }
//!
//! impl WorkflowObserver for StageCounter {
//!     fn on_state_enter(&self, state: WorkflowState) {
//!         self.entered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("→ {state}");
//!     }
//! }
//!
//! let config = WorkflowConfig::builder()
//!     .observer(Arc::new(StageCounter { entered: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::WorkflowOutcome;
use crate::workflow::WorkflowState;
use std::sync::Arc;

/// Called by the workflow as a request moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait WorkflowObserver: Send + Sync {
    /// Called when a request enters a working stage
    /// (`Extracting`, `Validating`, `Generating`, `Parsing`).
    fn on_state_enter(&self, state: WorkflowState) {
        let _ = state;
    }

    /// Called when a working stage finishes, whatever its result.
    ///
    /// # Arguments
    /// * `state`      — the stage that just finished
    /// * `elapsed_ms` — wall-clock time spent in it
    fn on_stage_complete(&self, state: WorkflowState, elapsed_ms: u64) {
        let _ = (state, elapsed_ms);
    }

    /// Called once with the terminal outcome.
    fn on_workflow_complete(&self, outcome: &WorkflowOutcome) {
        let _ = outcome;
    }
}

/// A no-op observer.
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::WorkflowConfig`].
pub type WorkflowObserverHandle = Arc<dyn WorkflowObserver>;
