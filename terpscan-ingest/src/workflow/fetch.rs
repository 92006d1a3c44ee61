//! Menu source fetching
//!
//! Reads or downloads the menu payload and decides whether it follows the
//! image path or the HTML path.

use crate::error::{PipelineError, PipelineResult};
use crate::extractors::html_menu::looks_like_html;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::PathBuf;
use tracing::debug;

/// Where a menu comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuSource {
    /// Encoded image already in memory
    ImageBytes(Vec<u8>),
    /// Image or saved HTML page on disk
    File(PathBuf),
    /// Raw HTML text
    Html(String),
    /// http(s) URL serving an image or an HTML page
    Url(String),
}

impl MenuSource {
    /// Interpret a CLI argument: http(s) URLs are fetched, anything else is a path
    pub fn from_input(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            MenuSource::Url(input.to_string())
        } else {
            MenuSource::File(PathBuf::from(input))
        }
    }

    /// Short description for logs and `ResultMenu::source`
    pub fn describe(&self) -> String {
        match self {
            MenuSource::ImageBytes(bytes) => format!("image ({} bytes)", bytes.len()),
            MenuSource::File(path) => path.display().to_string(),
            MenuSource::Html(html) => format!("html ({} chars)", html.chars().count()),
            MenuSource::Url(url) => url.clone(),
        }
    }
}

/// Fetched payload, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedMenu {
    Image(Vec<u8>),
    Html(String),
}

impl FetchedMenu {
    /// Payload size in bytes
    pub fn size(&self) -> usize {
        match self {
            FetchedMenu::Image(bytes) => bytes.len(),
            FetchedMenu::Html(text) => text.len(),
        }
    }

    /// Classify raw bytes: known image formats win, then HTML sniffing
    fn classify(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        let declared_image = content_type.map_or(false, |ct| ct.trim().starts_with("image/"));
        if declared_image || infer::is_image(&bytes) {
            return FetchedMenu::Image(bytes);
        }
        FetchedMenu::Html(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Read or download `source`
pub async fn fetch(source: &MenuSource, client: &Client) -> PipelineResult<FetchedMenu> {
    match source {
        MenuSource::ImageBytes(bytes) => Ok(FetchedMenu::Image(bytes.clone())),
        MenuSource::Html(html) => Ok(FetchedMenu::Html(html.clone())),
        MenuSource::File(path) => {
            let bytes = tokio::fs::read(path).await?;
            debug!(path = %path.display(), bytes = bytes.len(), "Read menu file");

            let is_html_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
            if is_html_ext || (!infer::is_image(&bytes) && looks_like_html(&bytes)) {
                return Ok(FetchedMenu::Html(String::from_utf8_lossy(&bytes).into_owned()));
            }
            Ok(FetchedMenu::Image(bytes))
        }
        MenuSource::Url(url) => {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::Network(format!(
                    "Menu download failed: HTTP {} from {}",
                    status, url
                )));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?.to_vec();
            debug!(
                url = %url,
                bytes = bytes.len(),
                content_type = content_type.as_deref().unwrap_or("-"),
                "Downloaded menu"
            );
            Ok(FetchedMenu::classify(bytes, content_type.as_deref()))
        }
    }
}
