//! Cooperative cancellation for the blocking parts of a generation run
//!
//! Loading metadata from a live schema and running `protoc` are the only
//! steps that wait on something outside the process. Both accept a [`Cancel`]
//! token and abort the whole run once it fires; there is no partial state to
//! resume from.

use crate::GeneratorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation token shared between a caller and a run
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    /// Create a token that has not fired yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the token has fired
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return [`GeneratorError::Cancelled`] once the token has fired
    pub fn check(&self) -> Result<(), GeneratorError> {
        if self.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        Ok(())
    }
}
