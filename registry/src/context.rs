use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::RegistryError;

/// Structured record of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub event: String,
    pub details: BTreeMap<String, String>,
    pub message: String,
}

/// Where failures are reported to, next to being returned to the caller.
pub trait ErrorSink {
    fn report(&self, failure: &Failure);
}

/// Reports failures through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, failure: &Failure) {
        let details = failure
            .details
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        log::error!("{}: {} [{details}]", failure.event, failure.message);
    }
}

/// Keeps every reported failure in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    failures: RefCell<Vec<Failure>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn failures(&self) -> Vec<Failure> { self.failures.borrow().clone() }

    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.failures
            .borrow()
            .iter()
            .map(|failure| failure.event.clone())
            .collect()
    }
}

impl ErrorSink for MemorySink {
    fn report(&self, failure: &Failure) { self.failures.borrow_mut().push(failure.clone()); }
}

/// Execution context of one request: the height of the block being
/// processed and the sink failures are reported to.
///
/// The registry never reads a clock; this height is the only notion of
/// time it has.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    height: u64,
    sink: &'a dyn ErrorSink,
}

impl<'a> Context<'a> {
    pub fn new(height: u64, sink: &'a dyn ErrorSink) -> Self { Self { height, sink } }

    #[must_use]
    pub fn height(&self) -> u64 { self.height }

    /// Same sink, another block.
    #[must_use]
    pub fn at(&self, height: u64) -> Self {
        Self {
            height,
            sink: self.sink,
        }
    }

    /// Report `err` under `event` and hand it back for returning.
    pub fn fail(&self, event: &str, err: impl Into<RegistryError>) -> RegistryError {
        let err = err.into();
        self.sink.report(&Failure {
            event: event.to_string(),
            details: err.details(),
            message: err.to_string(),
        });
        err
    }
}
