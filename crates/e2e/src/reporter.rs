//! Terminal "list" reporter

use docsuite_common::{ReportRecord, ReportSink, Status};
use parking_lot::Mutex;
use std::io::Write;

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    passed: usize,
    failed: usize,
    broken: usize,
    skipped: usize,
}

/// Prints one line per finished test and a summary on flush
pub struct ListReporter {
    out: Mutex<Box<dyn Write + Send>>,
    counts: Mutex<Counts>,
}

impl Default for ListReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ListReporter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            counts: Mutex::new(Counts::default()),
        }
    }

    fn marker(status: Status) -> &'static str {
        match status {
            Status::Passed => "✓",
            Status::Failed => "✗",
            Status::Broken => "!",
            Status::Skipped => "-",
            Status::Pending | Status::Running => "?",
        }
    }

    /// One line for a record, e.g. `✓ [Google Chrome] › a.yaml::title (12 ms)`
    pub fn format_line(record: &ReportRecord) -> String {
        let mut line = format!("  {} ", Self::marker(record.status));
        if let Some(project) = &record.project {
            line.push_str(&format!("[{}] › ", project));
        }
        line.push_str(&record.full_name);
        if record.status != Status::Skipped {
            line.push_str(&format!(" ({} ms)", record.duration_ms));
        }
        if record.flaky {
            line.push_str(" [flaky]");
        }
        if let Some(err) = &record.error {
            if !record.status.is_ok() {
                line.push_str(&format!("\n      {}", err.message));
                if let (Some(expected), Some(actual)) = (&err.expected, &err.actual) {
                    line.push_str(&format!("\n      Expected: {}\n      Received: {}", expected, actual));
                }
            }
        }
        line
    }
}

impl ReportSink for ListReporter {
    fn emit(&self, record: &ReportRecord) {
        {
            let mut counts = self.counts.lock();
            match record.status {
                Status::Passed => counts.passed += 1,
                Status::Failed => counts.failed += 1,
                Status::Broken => counts.broken += 1,
                Status::Skipped => counts.skipped += 1,
                Status::Pending | Status::Running => {}
            }
        }
        let mut out = self.out.lock();
        let _ = writeln!(out, "{}", Self::format_line(record));
    }

    fn flush(&self) {
        let c = *self.counts.lock();
        let mut out = self.out.lock();
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  {} passed, {} failed, {} broken, {} skipped",
            c.passed, c.failed, c.broken, c.skipped
        );
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsuite_common::{Aggregator, TestCase, TestError, TestHandle};
    use std::sync::Arc;

    /// Writer that appends into a shared buffer
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    #[test]
    fn test_lines_and_summary() {
        let buf = Buffer::default();
        let reporter = Arc::new(ListReporter::with_writer(Box::new(buf.clone())));
        let agg = Aggregator::new(reporter.clone());

        let ok = TestHandle::new(TestCase::new("ok").with_full_name("a.yaml::ok").with_project("Google Chrome"));
        ok.start().unwrap();
        agg.complete(&ok, Ok(())).unwrap();

        let bad = TestHandle::new(TestCase::new("bad").with_full_name("a.yaml::bad"));
        bad.start().unwrap();
        agg.complete(&bad, Err(TestError::mismatch("page URL", "\"x\"", "y"))).unwrap();

        let skipped = TestHandle::new(TestCase::new("later").with_full_name("a.yaml::later"));
        skipped.request_skip("wip").unwrap();
        agg.skip(&skipped).unwrap();

        agg.flush();

        let out = buf.contents();
        assert!(out.contains("✓ [Google Chrome] › a.yaml::ok"));
        assert!(out.contains("✗ a.yaml::bad"));
        assert!(out.contains("Expected: \"x\""));
        assert!(out.contains("Received: y"));
        assert!(out.contains("- a.yaml::later\n"));
        assert!(out.contains("1 passed, 1 failed, 0 broken, 1 skipped"));
    }
}
