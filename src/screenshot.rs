//! Dashboard map screenshots.
//!
//! A headless Chromium, with geolocation granted and pinned to a fixed
//! point, renders the dashboard at a fixed viewport. The PNG is cropped to
//! the map area and written back to the same file. Any failure
//! means "no image" and the report goes out as text only.

use crate::config::ScreenshotConfig;
use async_trait::async_trait;
use chrono::Local;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::emulation::SetGeolocationOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extra time allowed for the browser beyond the settle budget.
const BROWSER_GRACE: Duration = Duration::from_secs(60);

/// Screenshot error types.
#[derive(Debug)]
pub enum ScreenshotError {
    Io(String),
    Browser(String),
    Image(String),
}

impl std::fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScreenshotError::Io(e) => write!(f, "Screenshot IO error: {e}"),
            ScreenshotError::Browser(e) => write!(f, "Browser error: {e}"),
            ScreenshotError::Image(e) => write!(f, "Image error: {e}"),
        }
    }
}

impl std::error::Error for ScreenshotError {}

/// Source of the map image attached to posts.
#[async_trait]
pub trait ScreenshotCollector: Send + Sync {
    /// Path of a fresh image, or `None` when none could be produced.
    async fn capture(&self) -> Option<PathBuf>;
}

/// Collector used when screenshots are disabled.
pub struct NoScreenshot;

#[async_trait]
impl ScreenshotCollector for NoScreenshot {
    async fn capture(&self) -> Option<PathBuf> {
        None
    }
}

/// Crop the PNG at `path` to `(left, top, right, bottom)` in place.
pub fn crop_in_place(path: &Path, crop: (u32, u32, u32, u32)) -> Result<(), ScreenshotError> {
    let (left, top, right, bottom) = crop;
    if right <= left || bottom <= top {
        return Err(ScreenshotError::Image(format!("empty crop rectangle {crop:?}")));
    }

    let image = image::open(path).map_err(|e| ScreenshotError::Image(e.to_string()))?;
    if right > image.width() || bottom > image.height() {
        return Err(ScreenshotError::Image(format!(
            "crop {crop:?} outside {}x{} image",
            image.width(),
            image.height()
        )));
    }

    image
        .crop_imm(left, top, right - left, bottom - top)
        .save(path)
        .map_err(|e| ScreenshotError::Image(e.to_string()))
}

/// Accuracy, in meters, reported with the synthetic location.
const GEOLOCATION_ACCURACY: f64 = 100.0;

/// Headless Chromium screenshot of the dashboard, driven over the DevTools
/// protocol.
pub struct ChromeScreenshot {
    config: ScreenshotConfig,
}

impl ChromeScreenshot {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }

    /// `screenshots/screen_Mar01-14.png`: one file per hour.
    pub fn output_path(&self) -> PathBuf {
        let stamp = Local::now().format("%b%d-%H");
        self.config.output_dir.join(format!("screen_{stamp}.png"))
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScreenshotError> {
        let (width, height) = self.config.viewport;
        BrowserConfig::builder()
            .chrome_executable(&self.config.browser)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-infobars")
            .arg("--disable-extensions")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .build()
            .map_err(ScreenshotError::Browser)
    }

    /// Permission for the dashboard origin to read the location.
    fn geolocation_grant(&self) -> Result<GrantPermissionsParams, ScreenshotError> {
        let origin = reqwest::Url::parse(&self.config.url)
            .map_err(|e| ScreenshotError::Browser(format!("{}: {e}", self.config.url)))?
            .origin()
            .ascii_serialization();

        let mut grant = GrantPermissionsParams::new(vec![PermissionType::Geolocation]);
        grant.origin = Some(origin);
        Ok(grant)
    }

    fn geolocation_override(&self) -> SetGeolocationOverrideParams {
        let mut location = SetGeolocationOverrideParams::default();
        location.latitude = Some(self.config.latitude);
        location.longitude = Some(self.config.longitude);
        location.accuracy = Some(GEOLOCATION_ACCURACY);
        location
    }

    async fn render(&self, browser: &Browser, output: &Path) -> Result<(), ScreenshotError> {
        let page = browser.new_page("about:blank").await.map_err(cdp_error)?;
        page.execute(self.geolocation_grant()?)
            .await
            .map_err(cdp_error)?;
        page.execute(self.geolocation_override())
            .await
            .map_err(cdp_error)?;

        page.goto(self.config.url.as_str()).await.map_err(cdp_error)?;
        tokio::time::sleep(self.config.settle).await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.save_screenshot(params, output)
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn try_capture(&self) -> Result<PathBuf, ScreenshotError> {
        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| ScreenshotError::Io(e.to_string()))?;
        let output = self.output_path();

        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(|e| ScreenshotError::Browser(format!("{}: {e}", self.config.browser)))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let rendered =
            tokio::time::timeout(self.config.settle + BROWSER_GRACE, self.render(&browser, &output))
                .await
                .map_err(|_| ScreenshotError::Browser("timed out".to_string()))
                .and_then(|r| r);

        match browser.close().await {
            Ok(_) => {
                let _ = events.await;
            }
            Err(e) => {
                tracing::debug!("Browser did not close cleanly: {e}");
                events.abort();
            }
        }
        rendered?;

        crop_in_place(&output, self.config.crop)?;
        Ok(output)
    }
}

fn cdp_error(e: CdpError) -> ScreenshotError {
    ScreenshotError::Browser(e.to_string())
}

#[async_trait]
impl ScreenshotCollector for ChromeScreenshot {
    async fn capture(&self) -> Option<PathBuf> {
        match self.try_capture().await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "captured dashboard screenshot");
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Screenshot failed, publishing text only: {e}");
                None
            }
        }
    }
}

/// Collector for the given configuration.
pub fn collector_from_config(config: &ScreenshotConfig) -> Box<dyn ScreenshotCollector> {
    if config.enabled {
        Box::new(ChromeScreenshot::new(config.clone()))
    } else {
        Box::new(NoScreenshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        image::RgbaImage::new(900, 900).save(&path).unwrap();

        crop_in_place(&path, (200, 170, 700, 550)).unwrap();

        let cropped = image::open(&path).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (500, 380));
    }

    #[test]
    fn test_crop_outside_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        image::RgbaImage::new(100, 100).save(&path).unwrap();

        assert!(matches!(
            crop_in_place(&path, (200, 170, 700, 550)),
            Err(ScreenshotError::Image(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_browser_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ChromeScreenshot::new(ScreenshotConfig {
            browser: "definitely-not-a-browser-binary".to_string(),
            output_dir: dir.path().to_path_buf(),
            ..ScreenshotConfig::default()
        });
        assert!(collector.capture().await.is_none());
    }

    #[test]
    fn test_geolocation_is_pinned() {
        let collector = ChromeScreenshot::new(ScreenshotConfig {
            latitude: -25.3,
            longitude: -57.6,
            ..ScreenshotConfig::default()
        });

        let location = collector.geolocation_override();
        assert_eq!(location.latitude, Some(-25.3));
        assert_eq!(location.longitude, Some(-57.6));
        assert_eq!(location.accuracy, Some(100.0));

        let grant = collector.geolocation_grant().unwrap();
        assert_eq!(grant.permissions, vec![PermissionType::Geolocation]);
        assert_eq!(grant.origin.as_deref(), Some("https://airelib.re"));
    }

    #[test]
    fn test_grant_needs_a_valid_url() {
        let collector = ChromeScreenshot::new(ScreenshotConfig {
            url: "not a url".to_string(),
            ..ScreenshotConfig::default()
        });
        assert!(matches!(
            collector.geolocation_grant(),
            Err(ScreenshotError::Browser(_))
        ));
    }

    #[test]
    fn test_default_geolocation() {
        let config = ScreenshotConfig::default();
        let location = ChromeScreenshot::new(config).geolocation_override();
        assert_eq!(location.latitude, Some(-25.250));
        assert_eq!(location.longitude, Some(-57.536));
    }
}
