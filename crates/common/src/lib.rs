//! docsuite core library
//!
//! Step recording, test metadata and outcome aggregation for browser test
//! suites, plus the reporting sinks that consume finalized records.
//!
//! ```text
//! TestHandle ──begin_step/end_step──▶ StepRecorder (explicit stack + tree)
//!      │──set_description/set_label/add_tags──▶ Metadata
//!      └──finish / finish_skipped / abort──▶ ReportRecord
//!                                                │
//!                          Aggregator ──emit──▶ ReportSink (Allure, memory, ...)
//! ```

pub mod allure;
pub mod error;
pub mod metadata;
pub mod recorder;
pub mod report;
pub mod sink;
pub mod test_case;
pub mod types;

// Re-export commonly used types
pub use allure::AllureSink;
pub use error::{CoreError, Result, TestError};
pub use metadata::Metadata;
pub use recorder::{StepHandle, StepRecorder};
pub use report::{Labels, ReportRecord, StepRecord};
pub use sink::{Aggregator, FanoutSink, MemorySink, ReportSink};
pub use test_case::{TestCase, TestHandle};
pub use types::*;

/// docsuite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
