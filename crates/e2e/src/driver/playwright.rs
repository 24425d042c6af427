//! Playwright browser automation
//!
//! A generated Node script owns the browser session and answers one JSON
//! request per line on stdin with one JSON response per line on stdout.

use async_trait::async_trait;
use docsuite_common::Attachment;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, warn};

use super::{BrowserDriver, DriverLauncher, DriverResult, ElementHandle};
use crate::config::{ArtifactConfig, Project};
use crate::error::DriverError;

/// Content type Allure uses for Playwright traces
pub const TRACE_CONTENT_TYPE: &str = "application/vnd.allure.playwright-trace";
pub const VIDEO_CONTENT_TYPE: &str = "video/webm";

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CloseValue {
    video: Option<PathBuf>,
    trace: Option<PathBuf>,
}

/// Settings baked into the bridge script
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub project: Project,
    pub artifacts_dir: PathBuf,
    pub record_video: bool,
    pub record_trace: bool,
    /// Auto-wait for elements and actions inside the browser
    pub action_timeout: Duration,
}

/// Build the Node bridge script
pub fn build_script(options: &BridgeOptions) -> String {
    let video_dir = options.artifacts_dir.join("video");
    let trace_path = options.artifacts_dir.join("trace.zip");
    let record_video = if options.record_video {
        format!(
            "recordVideo: {{ dir: {} }},",
            json!(video_dir.to_string_lossy())
        )
    } else {
        String::new()
    };

    format!(
        r#"
const {{ chromium, firefox, webkit }} = require('playwright');
const readline = require('readline');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }},
    {record_video}
  }});
  const recordTrace = {record_trace};
  if (recordTrace) {{
    await context.tracing.start({{ screenshots: true, snapshots: true }});
  }}
  const page = await context.newPage();
  const timeout = {timeout};
  const elements = new Map();
  let nextId = 1;

  const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  const element = (id) => {{
    const el = elements.get(id);
    if (!el) {{
      const err = new Error('unknown element ' + id);
      err.name = 'NotFound';
      throw err;
    }}
    return el;
  }};

  const handle = async (req) => {{
    switch (req.op) {{
      case 'navigate':
        elements.clear();
        await page.goto(req.url);
        return null;
      case 'locate': {{
        const loc = page.locator(req.selector).first();
        await loc.waitFor({{ state: 'attached', timeout }});
        const id = nextId++;
        elements.set(id, loc);
        return id;
      }}
      case 'click':
        await element(req.element).click({{ timeout }});
        return null;
      case 'fill':
        await element(req.element).fill(req.text, {{ timeout }});
        return null;
      case 'key':
        await page.keyboard.press(req.key);
        return null;
      case 'title':
        return await page.title();
      case 'url':
        return page.url();
      case 'text':
        return await element(req.element).innerText({{ timeout }});
      case 'visible':
        return await element(req.element).isVisible();
      case 'screenshot':
        await page.screenshot({{ path: req.path }});
        return null;
      case 'close': {{
        let trace = null;
        if (recordTrace) {{
          trace = {trace_path};
          await context.tracing.stop({{ path: trace }});
        }}
        const video = page.video();
        await context.close();
        const videoPath = video ? await video.path() : null;
        await browser.close();
        return {{ video: videoPath, trace }};
      }}
      default:
        throw new Error('unknown op ' + req.op);
    }}
  }};

  send({{ id: 0, ok: true, value: 'ready' }});

  const rl = readline.createInterface({{ input: process.stdin }});
  for await (const line of rl) {{
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {{
      send({{ id: req.id, ok: true, value: await handle(req) }});
    }} catch (error) {{
      let kind = 'error';
      if (error.name === 'NotFound') kind = 'not_found';
      else if (error.name === 'TimeoutError') kind = req.op === 'locate' ? 'not_found' : 'timeout';
      send({{ id: req.id, ok: false, kind, error: error.message }});
    }}
    if (req.op === 'close') break;
  }}
  process.exit(0);
}})().catch((error) => {{
  process.stdout.write(JSON.stringify({{ id: 0, ok: false, kind: 'launch', error: error.message }}) + '\n');
  process.exit(1);
}});
"#,
        browser = options.project.browser.as_str(),
        headless = options.project.headless,
        width = options.project.viewport.width,
        height = options.project.viewport.height,
        record_video = record_video,
        record_trace = options.record_trace,
        timeout = options.action_timeout.as_millis(),
        trace_path = json!(trace_path.to_string_lossy()),
    )
}

/// Check if Playwright is installed
pub fn check_playwright_installed() -> DriverResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(DriverError::PlaywrightNotFound),
    }
}

/// Playwright browser session
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    /// Upper bound on a single round trip; the bridge has its own auto-wait
    response_timeout: Duration,
    closed: bool,
}

impl PlaywrightDriver {
    /// Write the bridge script into the artifacts dir and start it.
    ///
    /// The script lives under the suite's working tree so `require` finds
    /// the project's `node_modules`.
    pub async fn launch(options: BridgeOptions) -> DriverResult<Self> {
        std::fs::create_dir_all(&options.artifacts_dir)?;
        let script_path = options.artifacts_dir.join("bridge.js");
        std::fs::write(&script_path, build_script(&options))?;

        debug!("Launching Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Launch(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Launch("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Launch("bridge stdout unavailable".into()))?;

        let mut driver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            response_timeout: options.action_timeout + Duration::from_secs(30),
            closed: false,
        };

        // Browser startup is slow on cold caches.
        let ready = tokio::time::timeout(Duration::from_secs(60), driver.read_response(0))
            .await
            .map_err(|_| DriverError::Launch("browser did not start within 60s".into()))?;
        match ready {
            Ok(_) => Ok(driver),
            Err(DriverError::Protocol(msg)) => Err(DriverError::Launch(msg)),
            Err(e) => Err(e),
        }
    }

    async fn read_response(&mut self, id: u64) -> DriverResult<Value> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(DriverError::Closed)?;
            let resp: Response = match serde_json::from_str(&line) {
                Ok(resp) => resp,
                Err(_) => {
                    // Page console output and other noise.
                    debug!("[bridge] {}", line);
                    continue;
                }
            };
            if resp.id != id {
                warn!("Discarding out-of-band bridge response {}", resp.id);
                continue;
            }
            if resp.ok {
                return Ok(resp.value);
            }
            let message = resp.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(match resp.kind.as_deref() {
                // Callers fill in the selector they asked about.
                Some("not_found") => DriverError::NotFound { selector: message },
                Some("timeout") => DriverError::Timeout(message),
                _ => DriverError::Protocol(message),
            });
        }
    }

    async fn request(&mut self, mut req: Value) -> DriverResult<Value> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let id = self.next_id;
        self.next_id += 1;
        req["id"] = json!(id);

        let mut line = serde_json::to_string(&req)
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        match tokio::time::timeout(self.response_timeout, self.read_response(id)).await {
            Ok(result) => result,
            Err(_) => {
                self.closed = true;
                let _ = self.child.start_kill();
                Err(DriverError::Timeout(format!(
                    "no response to '{}' within {:?}",
                    req["op"], self.response_timeout
                )))
            }
        }
    }

    /// Request that may report a missing element
    async fn element_request(&mut self, req: Value, selector: &str) -> DriverResult<Value> {
        match self.request(req).await {
            Err(DriverError::NotFound { selector: reason }) => {
                debug!("Element lookup failed: {}", reason);
                Err(DriverError::NotFound {
                    selector: selector.to_string(),
                })
            }
            other => other,
        }
    }
}

fn as_string(value: Value) -> DriverResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(DriverError::Protocol(format!("expected string, got {}", other))),
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        match self.request(json!({ "op": "navigate", "url": url })).await {
            Ok(_) => Ok(()),
            Err(DriverError::Protocol(reason)) => Err(DriverError::Navigation {
                url: url.to_string(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    async fn locate(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        let req = json!({ "op": "locate", "selector": selector });
        let value = self.element_request(req, selector).await?;
        let id = value
            .as_u64()
            .ok_or_else(|| DriverError::Protocol(format!("bad element id: {}", value)))?;
        Ok(ElementHandle {
            id,
            selector: selector.to_string(),
        })
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let req = json!({ "op": "click", "element": element.id });
        self.element_request(req, &element.selector).await?;
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let req = json!({ "op": "fill", "element": element.id, "text": text });
        self.element_request(req, &element.selector).await?;
        Ok(())
    }

    async fn send_key(&mut self, key: &str) -> DriverResult<()> {
        self.request(json!({ "op": "key", "key": key })).await?;
        Ok(())
    }

    async fn title(&mut self) -> DriverResult<String> {
        as_string(self.request(json!({ "op": "title" })).await?)
    }

    async fn url(&mut self) -> DriverResult<String> {
        as_string(self.request(json!({ "op": "url" })).await?)
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let req = json!({ "op": "text", "element": element.id });
        as_string(self.element_request(req, &element.selector).await?)
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        let req = json!({ "op": "visible", "element": element.id });
        let value = self.element_request(req, &element.selector).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let req = json!({ "op": "screenshot", "path": path.to_string_lossy() });
        self.request(req).await?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<Vec<Attachment>> {
        if self.closed {
            return Ok(Vec::new());
        }
        let value = self.request(json!({ "op": "close" })).await;
        self.closed = true;
        let _ = self.child.wait().await;

        let paths: CloseValue = serde_json::from_value(value?).unwrap_or_default();
        let mut artifacts = Vec::new();
        if let Some(video) = paths.video {
            artifacts.push(Attachment::new("video", video, VIDEO_CONTENT_TYPE));
        }
        if let Some(trace) = paths.trace {
            artifacts.push(Attachment::new("trace", trace, TRACE_CONTENT_TYPE));
        }
        Ok(artifacts)
    }
}

/// Launches one Playwright session per test
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    artifacts: ArtifactConfig,
    action_timeout: Duration,
}

impl PlaywrightLauncher {
    /// Fails early when Playwright is not installed
    pub fn new(artifacts: ArtifactConfig, action_timeout: Duration) -> DriverResult<Self> {
        check_playwright_installed()?;
        Ok(Self {
            artifacts,
            action_timeout,
        })
    }
}

#[async_trait]
impl DriverLauncher for PlaywrightLauncher {
    async fn launch(
        &self,
        project: &Project,
        artifacts_dir: &Path,
    ) -> DriverResult<Box<dyn BrowserDriver>> {
        let driver = PlaywrightDriver::launch(BridgeOptions {
            project: project.clone(),
            artifacts_dir: artifacts_dir.to_path_buf(),
            record_video: self.artifacts.video.enabled(),
            record_trace: self.artifacts.trace.enabled(),
            action_timeout: self.action_timeout,
        })
        .await?;
        Ok(Box::new(driver))
    }
}
