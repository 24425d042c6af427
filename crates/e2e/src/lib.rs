//! docsuite browser test runner
//!
//! This crate drives declarative YAML browser tests and records them with
//! `docsuite-common`:
//! - Parses YAML test specs with nested, named steps
//! - Controls Playwright through a persistent Node bridge process
//! - Polls assertions until they hold or time out
//! - Reports every test to the terminal, Allure results and JSON
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    docsuite runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── DriverLauncher::launch() -> Box<dyn BrowserDriver>   │
//! │    ├── Executor::run_steps(spec.steps) -> TestHandle        │
//! │    └── Aggregator ──▶ ListReporter | AllureSink             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (YAML)                                            │
//! │    ├── name, description, epic, feature, story, tags       │
//! │    ├── skip, flaky, timeout_ms                              │
//! │    └── steps: [ { step, steps } | action ]                  │
//! │          ├── navigate { url }                               │
//! │          ├── click { selector } / fill { selector, value }  │
//! │          ├── press { key }                                  │
//! │          ├── expect_title / expect_url / expect_text        │
//! │          ├── expect_visible { selector }                    │
//! │          └── screenshot { name } / log { message }          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod expect;
pub mod reporter;
pub mod runner;
pub mod spec;

pub use config::SuiteConfig;
pub use driver::{BrowserDriver, DriverLauncher, InMemoryLauncher, PlaywrightLauncher};
pub use error::{DriverError, E2eError, E2eResult};
pub use executor::Executor;
pub use expect::{Expect, Matcher};
pub use reporter::ListReporter;
pub use runner::{TestRunner, TestSuiteResult};
pub use spec::{Action, SpecStep, TestSpec};
