//! docsuite CLI - Main Entry Point
//!
//! Runs YAML browser test suites and reports them to the terminal, Allure
//! results and `test-results.json`.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docsuite_e2e::config::Browser;
use docsuite_e2e::{DriverLauncher, PlaywrightLauncher, SuiteConfig, TestRunner, TestSpec};

/// docsuite - step-annotated browser tests with Allure reporting
#[derive(Parser)]
#[command(name = "docsuite")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Suite configuration file
    #[arg(short, long, default_value = "docsuite.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests
    Run(RunArgs),

    /// List tests without running them
    List {
        /// Only tests with this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Directory of YAML specs (overrides config)
    #[arg(long)]
    specs: Option<PathBuf>,

    /// Only run tests with this tag
    #[arg(long, conflicts_with = "name")]
    tag: Option<String>,

    /// Only run the test with this name
    #[arg(long)]
    name: Option<String>,

    /// Only run this project
    #[arg(long)]
    project: Option<String>,

    /// Concurrent tests
    #[arg(short, long, env = "DOCSUITE_WORKERS")]
    workers: Option<usize>,

    /// Browser for every project
    #[arg(long)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Per-test timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut SuiteConfig) -> anyhow::Result<()> {
        if let Some(specs) = &self.specs {
            config.test_dir = specs.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if let Some(name) = &self.project {
            let project = config
                .project(name)
                .cloned()
                .with_context(|| format!("unknown project '{}'", name))?;
            config.projects = vec![project];
        }
        for project in &mut config.projects {
            if let Some(browser) = self.browser {
                project.browser = browser;
            }
            if self.headed {
                project.headless = false;
            }
        }
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    // 0: all good, 1: failed or broken tests, 2: could not run
    let code = match execute(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            2
        }
    };
    std::process::exit(code);
}

/// Returns whether the command succeeded
async fn execute(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run(args) => {
            let mut config = SuiteConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            args.apply(&mut config)?;

            let launcher: Arc<dyn DriverLauncher> = Arc::new(PlaywrightLauncher::new(
                config.artifacts.clone(),
                config.expect_timeout(),
            )?);
            let runner = TestRunner::from_config(config, launcher, Vec::new())?;

            let result = match (&args.tag, &args.name) {
                (Some(tag), _) => runner.run_tagged(tag).await?,
                (None, Some(name)) => runner.run_test(name).await?,
                (None, None) => runner.run_all().await?,
            };
            runner.write_results(&result)?;
            Ok(result.success())
        }
        Commands::List { tag } => {
            let config = SuiteConfig::load(&cli.config)?;
            let specs = TestSpec::load_all(&config.test_dir)?;
            let selected = match &tag {
                Some(tag) => TestSpec::filter_by_tag(&specs, tag),
                None => specs.iter().collect(),
            };
            for spec in &selected {
                let mut line = spec.full_name();
                if !spec.tags.is_empty() {
                    line.push_str(&format!(" [{}]", spec.tags.join(", ")));
                }
                if spec.skip.reason().is_some() {
                    line.push_str(" (skipped)");
                }
                println!("{}", line);
            }
            println!();
            println!("{} test(s) in {}", selected.len(), config.test_dir.display());
            Ok(true)
        }
        Commands::Init { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", cli.config.display());
            }
            SuiteConfig::default().save(&cli.config)?;
            println!("✅ Wrote {}", cli.config.display());
            Ok(true)
        }
        Commands::Version => {
            println!("docsuite v{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
    }
}
