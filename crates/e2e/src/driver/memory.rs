//! In-memory browser driver backed by a scripted site
//!
//! Pages are declared up front with their title and elements. Used by the
//! crate's own tests and for validating specs without a real browser.

use async_trait::async_trait;
use docsuite_common::Attachment;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{BrowserDriver, DriverLauncher, DriverResult, ElementHandle};
use crate::config::Project;
use crate::error::DriverError;

/// PNG signature; enough for a placeholder capture
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone)]
pub struct Element {
    pub selector: String,
    pub text: String,
    pub visible: bool,
    /// Clicking navigates here
    pub href: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub elements: Vec<Element>,
    /// Key presses that navigate, e.g. a search shortcut
    pub key_bindings: HashMap<String, String>,
}

impl Page {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            elements: Vec::new(),
            key_bindings: HashMap::new(),
        }
    }

    pub fn element(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.push(Element {
            selector: selector.into(),
            text: text.into(),
            visible: true,
            href: None,
        });
        self
    }

    pub fn hidden(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.push(Element {
            selector: selector.into(),
            text: text.into(),
            visible: false,
            href: None,
        });
        self
    }

    pub fn link(
        mut self,
        selector: impl Into<String>,
        text: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        self.elements.push(Element {
            selector: selector.into(),
            text: text.into(),
            visible: true,
            href: Some(href.into()),
        });
        self
    }

    pub fn on_key(mut self, key: impl Into<String>, href: impl Into<String>) -> Self {
        self.key_bindings.insert(key.into(), href.into());
        self
    }

    /// Resolve a selector: exact selector match, or `text=` matching the
    /// element text
    fn find(&self, selector: &str) -> Option<usize> {
        if let Some(i) = self.elements.iter().position(|e| e.selector == selector) {
            return Some(i);
        }
        let needle = selector.strip_prefix("text=")?;
        let needle = needle.trim_matches('"');
        self.elements
            .iter()
            .position(|e| e.text == needle)
            .or_else(|| self.elements.iter().position(|e| e.text.contains(needle)))
    }
}

/// A set of pages keyed by URL
#[derive(Debug, Clone, Default)]
pub struct Site {
    pages: HashMap<String, Page>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: Page) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    fn get(&self, url: &str) -> Option<&Page> {
        self.pages.get(url)
    }

    /// Resolve `href` against `base` the way a browser would for the simple
    /// cases the fixtures use: absolute URLs, root-relative and relative paths.
    fn resolve(base: &str, href: &str) -> String {
        if href.contains("://") {
            return href.to_string();
        }
        let origin_end = base
            .find("://")
            .and_then(|i| base[i + 3..].find('/').map(|j| i + 3 + j))
            .unwrap_or(base.len());
        if let Some(path) = href.strip_prefix('/') {
            return format!("{}/{}", &base[..origin_end], path);
        }
        match base.rfind('/') {
            Some(i) if i >= origin_end => format!("{}{}", &base[..=i], href),
            _ => format!("{}/{}", base, href),
        }
    }
}

/// Driver over a [`Site`]
pub struct InMemoryDriver {
    site: Arc<Site>,
    current: Option<String>,
    handles: HashMap<u64, (String, usize)>,
    filled: HashMap<(String, usize), String>,
    next_id: u64,
    latency: Duration,
    pressed: Vec<String>,
}

impl InMemoryDriver {
    pub fn new(site: Arc<Site>) -> Self {
        Self {
            site,
            current: None,
            handles: HashMap::new(),
            filled: HashMap::new(),
            next_id: 1,
            latency: Duration::ZERO,
            pressed: Vec::new(),
        }
    }

    /// Delay every operation, simulating a slow browser
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Keys pressed so far
    pub fn pressed(&self) -> &[String] {
        &self.pressed
    }

    async fn tick(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn page(&self) -> DriverResult<&Page> {
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| DriverError::Navigation {
                url: "about:blank".to_string(),
                reason: "no page loaded".to_string(),
            })?;
        self.site.get(url).ok_or_else(|| DriverError::Navigation {
            url: url.to_string(),
            reason: "page not found".to_string(),
        })
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<(&Page, usize)> {
        let page = self.page()?;
        match self.handles.get(&handle.id) {
            Some((url, index)) if *url == page.url => Ok((page, *index)),
            _ => Err(DriverError::NotFound {
                selector: handle.selector.clone(),
            }),
        }
    }

    fn go(&mut self, url: &str) -> DriverResult<()> {
        if self.site.get(url).is_none() {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for InMemoryDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.tick().await;
        self.go(url)
    }

    async fn locate(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        self.tick().await;
        let page = self.page()?;
        let index = page.find(selector).ok_or_else(|| DriverError::NotFound {
            selector: selector.to_string(),
        })?;
        let url = page.url.clone();
        let id = self.next_id;
        self.next_id += 1;
        self.handles.insert(id, (url, index));
        Ok(ElementHandle {
            id,
            selector: selector.to_string(),
        })
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.tick().await;
        let (page, index) = self.element(element)?;
        let target = page.elements[index]
            .href
            .as_ref()
            .map(|href| Site::resolve(&page.url, href));
        match target {
            Some(url) => self.go(&url),
            None => Ok(()),
        }
    }

    async fn fill(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.tick().await;
        let (page, index) = self.element(element)?;
        let key = (page.url.clone(), index);
        self.filled.insert(key, text.to_string());
        Ok(())
    }

    async fn send_key(&mut self, key: &str) -> DriverResult<()> {
        self.tick().await;
        self.pressed.push(key.to_string());
        let target = self
            .page()
            .ok()
            .and_then(|p| p.key_bindings.get(key).map(|href| Site::resolve(&p.url, href)));
        match target {
            Some(url) => self.go(&url),
            None => Ok(()),
        }
    }

    async fn title(&mut self) -> DriverResult<String> {
        self.tick().await;
        Ok(self.page()?.title.clone())
    }

    async fn url(&mut self) -> DriverResult<String> {
        self.tick().await;
        Ok(self
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.tick().await;
        let (page, index) = self.element(element)?;
        if let Some(value) = self.filled.get(&(page.url.clone(), index)) {
            return Ok(value.clone());
        }
        Ok(page.elements[index].text.clone())
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.tick().await;
        let (page, index) = self.element(element)?;
        Ok(page.elements[index].visible)
    }

    async fn screenshot(&mut self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, PNG_MAGIC)?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<Vec<Attachment>> {
        self.current = None;
        self.handles.clear();
        Ok(Vec::new())
    }
}

/// Hands out [`InMemoryDriver`]s over a shared site
#[derive(Clone)]
pub struct InMemoryLauncher {
    site: Arc<Site>,
    latency: Duration,
}

impl InMemoryLauncher {
    pub fn new(site: Site) -> Self {
        Self {
            site: Arc::new(site),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl DriverLauncher for InMemoryLauncher {
    async fn launch(
        &self,
        _project: &Project,
        _artifacts_dir: &Path,
    ) -> DriverResult<Box<dyn BrowserDriver>> {
        Ok(Box::new(
            InMemoryDriver::new(self.site.clone()).with_latency(self.latency),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn site() -> Arc<Site> {
        Arc::new(
            Site::new()
                .page(
                    Page::new("https://docs.example.com/guide/", "Guide | Example")
                        .element("h1", "Example Guide")
                        .link("nav a.faq", "FAQ", "faq/")
                        .link("nav a.home", "Home", "/")
                        .hidden("div.modal", "Search")
                        .on_key("Control+KeyK", "search/"),
                )
                .page(
                    Page::new("https://docs.example.com/guide/faq/", "FAQ | Example")
                        .element("h1", "Frequently Asked Questions"),
                )
                .page(Page::new("https://docs.example.com/", "Example")),
        )
    }

    #[test_case("https://a.com/x/", "y/" => "https://a.com/x/y/")]
    #[test_case("https://a.com/x/", "/z" => "https://a.com/z")]
    #[test_case("https://a.com/x/", "https://b.com/" => "https://b.com/")]
    #[test_case("https://a.com", "p" => "https://a.com/p")]
    fn test_resolve(base: &str, href: &str) -> String {
        Site::resolve(base, href)
    }

    #[tokio::test]
    async fn test_navigate_and_query() {
        let mut driver = InMemoryDriver::new(site());
        driver.navigate("https://docs.example.com/guide/").await.unwrap();
        assert_eq!(driver.title().await.unwrap(), "Guide | Example");

        let h1 = driver.locate("h1").await.unwrap();
        assert_eq!(driver.text(&h1).await.unwrap(), "Example Guide");
        assert!(driver.is_visible(&h1).await.unwrap());

        let modal = driver.locate("div.modal").await.unwrap();
        assert!(!driver.is_visible(&modal).await.unwrap());
    }

    #[tokio::test]
    async fn test_click_link_by_text() {
        let mut driver = InMemoryDriver::new(site());
        driver.navigate("https://docs.example.com/guide/").await.unwrap();
        let link = driver.locate("text=FAQ").await.unwrap();
        driver.click(&link).await.unwrap();
        assert_eq!(
            driver.url().await.unwrap(),
            "https://docs.example.com/guide/faq/"
        );

        // Handles from the previous page are stale.
        assert!(matches!(
            driver.click(&link).await,
            Err(DriverError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_element_is_not_found() {
        let mut driver = InMemoryDriver::new(site());
        driver.navigate("https://docs.example.com/guide/").await.unwrap();
        let err = driver.locate("text=Nonexistent").await.unwrap_err();
        assert!(matches!(err, DriverError::NotFound { selector } if selector == "text=Nonexistent"));
    }

    #[tokio::test]
    async fn test_unknown_page_fails_navigation() {
        let mut driver = InMemoryDriver::new(site());
        let err = driver.navigate("https://nowhere.invalid/").await.unwrap_err();
        assert!(matches!(err, DriverError::Navigation { .. }));
        assert_eq!(driver.url().await.unwrap(), "about:blank");
    }

    #[tokio::test]
    async fn test_unbound_key_is_recorded() {
        let mut driver = InMemoryDriver::new(site());
        driver.navigate("https://docs.example.com/guide/").await.unwrap();
        driver.send_key("Enter").await.unwrap();
        assert_eq!(driver.pressed(), &["Enter".to_string()]);
        assert_eq!(
            driver.url().await.unwrap(),
            "https://docs.example.com/guide/"
        );
    }

    #[tokio::test]
    async fn test_fill_changes_text() {
        let mut driver = InMemoryDriver::new(site());
        driver.navigate("https://docs.example.com/guide/").await.unwrap();
        let h1 = driver.locate("h1").await.unwrap();
        driver.fill(&h1, "typed").await.unwrap();
        assert_eq!(driver.text(&h1).await.unwrap(), "typed");
    }

    #[tokio::test]
    async fn test_screenshot_writes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut driver = InMemoryDriver::new(site());
        let path = tmp.path().join("shots").join("a.png");
        driver.screenshot(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), PNG_MAGIC);
    }
}
