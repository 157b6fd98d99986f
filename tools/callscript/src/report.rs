use crate::errors::MockError;
use std::sync::{Arc, Mutex};

/// Hook that receives every failure before it is returned to the caller.
pub trait FailureReporter: Send + Sync {
    fn report(&self, error: &MockError);
}

pub struct StderrReporter;

impl FailureReporter for StderrReporter {
    fn report(&self, error: &MockError) {
        eprintln!("{error}");
    }
}

/// Keeps reported messages in memory; clones share the same buffer.
#[derive(Default, Clone)]
pub struct CollectingReporter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.messages.lock() {
            Ok(mut messages) => messages.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, error: &MockError) {
        let line = error.to_string();
        match self.messages.lock() {
            Ok(mut messages) => messages.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}
