//! Cooperative cancellation
//!
//! Long mixes check the token between major steps (each loop iteration of a
//! category, each synthesis phase, each composition stage). A cancelled call
//! discards all partial buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SomniaError};

/// Shared flag a caller can flip to abort an in-flight mix
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone of this token observes it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Return `Cancelled` if cancellation was requested
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            log::info!("Mix cancelled during {}", stage);
            return Err(SomniaError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}
