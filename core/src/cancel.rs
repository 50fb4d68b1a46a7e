//! Cooperative cancellation.
//!
//! RULE: Cancellation is only observed between stages. A stage that has
//! started runs to completion, so every value already produced stays
//! internally consistent.

use crate::error::{AnalysisError, AnalysisResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle; all clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Err(Cancelled) naming the stage about to start, if cancelled.
    pub fn check(&self, stage: &str) -> AnalysisResult<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled { stage: stage.to_string() })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check("ingest").is_ok());
        other.cancel();
        assert!(matches!(token.check("detect"), Err(AnalysisError::Cancelled { stage }) if stage == "detect"));
    }
}
