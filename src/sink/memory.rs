use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::record::LogRecord;

use super::{Error, LogSink, Result};

/// Records every indexed record in memory. Can be switched to fail all calls.
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub(crate) fn failing() -> Self {
        Self {
            records: Mutex::default(),
            failing: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.message().to_owned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl LogSink for MemorySink {
    async fn index_log(&self, record: &LogRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable);
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
