//! Prioritized model sources with first-success-wins loading.

use crate::error::ArError;
use crate::image::RgbaImage;
use crate::occlusion::{ObjectDetector, Segmenter};
use std::future::Future;

/// Fetches and decodes the assets a session needs.
#[allow(async_fn_in_trait)]
pub trait AssetLoader {
    async fn load_image(&self, url: &str) -> Result<RgbaImage, ArError>;

    async fn load_segmenter(&self, url: &str) -> Result<Box<dyn Segmenter>, ArError>;

    async fn load_detector(&self, url: &str) -> Result<Box<dyn ObjectDetector>, ArError>;
}

/// Which models the occlusion pipeline is waiting for.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub segmenter: Vec<String>,
    pub detector: Option<Vec<String>>,
}

pub struct ModelBundle {
    pub segmenter: Box<dyn Segmenter>,
    pub detector: Option<Box<dyn ObjectDetector>>,
}

/// Trim whitespace and any trailing slashes. Returns `None` for blanks.
pub fn normalize_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a list of URLs, dropping blanks and duplicates while keeping order.
pub fn normalize_sources(urls: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls.iter().filter_map(|u| normalize_url(u)) {
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// Try each URL in order and return the first asset that loads.
///
/// Every attempt is awaited before the next starts. When all fail the last
/// error is folded into [`ArError::ModelLoad`].
pub async fn first_success<T, F, Fut>(urls: &[String], mut load: F) -> Result<T, ArError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ArError>>,
{
    let mut last = String::from("no sources configured");
    for url in urls {
        match load(url.clone()).await {
            Ok(asset) => {
                log::info!("[assets] loaded {}", url);
                return Ok(asset);
            }
            Err(e) => {
                log::warn!("[assets] {} failed: {}", url, e);
                last = format!("{url}: {e}");
            }
        }
    }
    Err(ArError::ModelLoad(last))
}

/// Load the segmenter, then the detector when requested. A detector that
/// fails to load is dropped; a segmenter failure fails the whole bundle.
pub async fn load_models<L: AssetLoader>(loader: &L, request: &ModelRequest) -> Result<ModelBundle, ArError> {
    let segmenter = first_success(&request.segmenter, |url| async move {
        loader.load_segmenter(&url).await
    })
    .await?;
    let detector = match &request.detector {
        Some(urls) => match first_success(urls, |url| async move { loader.load_detector(&url).await }).await {
            Ok(d) => Some(d),
            Err(e) => {
                log::warn!("[assets] continuing without detector: {}", e);
                None
            }
        },
        None => None,
    };
    Ok(ModelBundle {
        segmenter,
        detector,
    })
}
