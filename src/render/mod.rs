//! Rendering: chart description → SVG scene → image bytes.
//!
//! ```text
//!   ChartDescription ──svg::to_svg──▶ SVG ──┬──▶ Svg
//!                                           └──RenderBackend──▶ Png ──image──▶ Jpeg
//! ```
//!
//! A backend that reports its browser engine missing gets one install and one
//! retry; any other failure is returned as is.

pub mod backend;
mod scale;
pub mod svg;

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;

use crate::chart::model::ChartDescription;
use crate::config::RenderConfig;
use crate::error::{BackendError, RenderError};
use backend::{BrowserInstaller, CommandInstaller, HeadlessBrowser, RenderBackend};

const JPEG_QUALITY: u8 = 90;

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Svg => "image/svg+xml",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "svg" => Ok(ImageFormat::Svg),
            other => Err(format!("unsupported image format '{other}' (expected png, jpeg or svg)")),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    installer: Box<dyn BrowserInstaller>,
}

impl Renderer {
    pub fn new(backend: Box<dyn RenderBackend>, installer: Box<dyn BrowserInstaller>) -> Self {
        Renderer { backend, installer }
    }

    /// Headless browser backend with the command installer.
    pub fn from_config(config: &RenderConfig) -> Self {
        Renderer::new(
            Box::new(HeadlessBrowser::new(config)),
            Box::new(CommandInstaller::from_config(config)),
        )
    }

    pub fn render(&self, chart: &ChartDescription, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
        let svg = svg::to_svg(chart);
        match format {
            ImageFormat::Svg => Ok(svg.into_bytes()),
            ImageFormat::Png => self.rasterize(chart, &svg),
            ImageFormat::Jpeg => to_jpeg(&self.rasterize(chart, &svg)?),
        }
    }

    pub fn render_to_path(
        &self,
        chart: &ChartDescription,
        format: ImageFormat,
        path: &Path,
    ) -> Result<(), RenderError> {
        let bytes = self.render(chart, format)?;
        std::fs::write(path, bytes).map_err(RenderError::Io)
    }

    fn rasterize(&self, chart: &ChartDescription, svg: &str) -> Result<Vec<u8>, RenderError> {
        let size = chart.size();
        let original = match self.backend.screenshot(svg, size) {
            Ok(png) => return Ok(png),
            Err(BackendError::BrowserMissing(reason)) => BackendError::BrowserMissing(reason),
            Err(source) => {
                return Err(RenderError::Backend {
                    backend: self.backend.name().to_string(),
                    source,
                })
            }
        };

        log::warn!("{}: {original}", self.backend.name());
        if let Err(install) = self.installer.install() {
            return Err(RenderError::InstallFailed { original, install });
        }
        self.backend
            .screenshot(svg, size)
            .map_err(|retry| RenderError::RetryFailed { original, retry })
    }
}

/// Renders with the browser configured by the environment.
pub fn render(chart: &ChartDescription, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
    Renderer::from_config(&RenderConfig::from_env()).render(chart, format)
}

fn to_jpeg(png: &[u8]) -> Result<Vec<u8>, RenderError> {
    let encode = |source| RenderError::Encode {
        format: "jpeg",
        source,
    };
    let decoded = image::load_from_memory_with_format(png, image::ImageFormat::Png).map_err(encode)?;
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&decoded.to_rgb8())
        .map_err(encode)?;
    Ok(out.into_inner())
}
