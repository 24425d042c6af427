//! Reporting sinks and the outcome aggregator that feeds them

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, TestError};
use crate::report::ReportRecord;
use crate::test_case::TestHandle;
use crate::types::Status;

/// Destination for finalized report records.
///
/// Emission is fire-and-forget: implementations handle (and log) their own
/// delivery failures.
pub trait ReportSink: Send + Sync {
    fn emit(&self, record: &ReportRecord);

    /// Called once after the last record of a run
    fn flush(&self) {}
}

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ReportRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ReportRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Find a record by test name
    pub fn by_name(&self, name: &str) -> Option<ReportRecord> {
        self.records.lock().iter().find(|r| r.name == name).cloned()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, record: &ReportRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Forwards every record to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for FanoutSink {
    fn emit(&self, record: &ReportRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Turns a finished test into one report record and hands it to the sink
#[derive(Clone)]
pub struct Aggregator {
    sink: Arc<dyn ReportSink>,
}

impl Aggregator {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    /// Test body returned (successfully or with an error)
    pub fn complete(
        &self,
        test: &TestHandle,
        result: std::result::Result<(), TestError>,
    ) -> Result<ReportRecord> {
        let record = test.finish(result)?;
        self.emit(&record);
        Ok(record)
    }

    /// Test was skipped before it started
    pub fn skip(&self, test: &TestHandle) -> Result<ReportRecord> {
        let record = test.finish_skipped()?;
        self.emit(&record);
        Ok(record)
    }

    /// Test was cut short (timeout, panic)
    pub fn abort(&self, test: &TestHandle, err: TestError) -> Result<ReportRecord> {
        let record = test.abort(err)?;
        self.emit(&record);
        Ok(record)
    }

    pub fn flush(&self) {
        self.sink.flush();
    }

    fn emit(&self, record: &ReportRecord) {
        if record.status != Status::Passed {
            info!(test = %record.name, status = %record.status, "emitting report");
        }
        self.sink.emit(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_case::TestCase;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());
        let agg = Aggregator::new(Arc::new(fanout));

        let t = TestHandle::new(TestCase::new("one"));
        t.start().unwrap();
        agg.complete(&t, Ok(())).unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a.records()[0].name, "one");
    }

    #[test]
    fn test_aggregator_emits_exactly_once() {
        let sink = Arc::new(MemorySink::new());
        let agg = Aggregator::new(sink.clone());

        let t = TestHandle::new(TestCase::new("once"));
        t.start().unwrap();
        agg.complete(&t, Ok(())).unwrap();
        assert!(agg.complete(&t, Ok(())).is_err());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_skip_is_emitted() {
        let sink = Arc::new(MemorySink::new());
        let agg = Aggregator::new(sink.clone());

        let t = TestHandle::new(TestCase::new("skip me"));
        t.request_skip("not ready").unwrap();
        agg.skip(&t).unwrap();

        let record = sink.by_name("skip me").unwrap();
        assert_eq!(record.status, Status::Skipped);
        assert_eq!(record.error.unwrap().message, "not ready");
    }
}
