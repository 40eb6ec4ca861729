//! Diagnostic sink that keeps records in memory.

use std::sync::Mutex;

use crate::dispatch::{CallOutcome, DiagnosticSink, SinkError};

/// Records every diagnostic and the concluding outcome written to it, or
/// refuses them all when disconnected.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<String>>,
    outcomes: Mutex<Vec<CallOutcome>>,
    disconnected: bool,
}

impl RecordingSink {
    /// Sink whose caller has already gone away.
    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::default()
        }
    }

    /// Snapshot of the records written so far.
    pub fn records(&self) -> Vec<String> {
        self.records.lock().expect("sink mutex poisoned").clone()
    }

    /// Outcomes concluded on this sink, in order.
    pub fn outcomes(&self) -> Vec<CallOutcome> {
        self.outcomes.lock().expect("sink mutex poisoned").clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn write_record(&self, record: String) -> Result<(), SinkError> {
        if self.disconnected {
            return Err(SinkError::Disconnected);
        }
        self.records
            .lock()
            .map_err(|_| SinkError::Disconnected)?
            .push(record);
        Ok(())
    }

    fn conclude(&self, outcome: &CallOutcome) -> Result<(), SinkError> {
        if self.disconnected {
            return Err(SinkError::Disconnected);
        }
        self.outcomes
            .lock()
            .map_err(|_| SinkError::Disconnected)?
            .push(outcome.clone());
        Ok(())
    }
}
