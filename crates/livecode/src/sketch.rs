use crate::cache::{content_hash, RenderCache};
use crate::client::Executor;
use crate::raster::svg_to_png;
use crate::render::render_svg;
use anyhow::Context;
use protocol::RuntimeVariant;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SKETCH_NAME_PREFIX: &str = "SKETCH-";
const IMAGE_PATH_PREFIX: &str = "s/";
const PNG_EXTENSION: &str = ".png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    Square,
    Wide,
}

impl ImageMode {
    pub fn suffix(self) -> &'static str {
        match self {
            ImageMode::Square => "s",
            ImageMode::Wide => "w",
        }
    }

    /// Output (width, height) of the rasterized preview.
    pub fn size(self) -> (u32, u32) {
        match self {
            ImageMode::Square => (300, 300),
            ImageMode::Wide => (550, 300),
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "s" => Some(ImageMode::Square),
            "w" => Some(ImageMode::Wide),
            _ => None,
        }
    }
}

/// A preview image path: `/s/<id>-<hash>-<s|w>.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub sketch_id: String,
    pub hash: String,
    pub mode: ImageMode,
}

impl ImageRequest {
    pub fn parse(path: &str) -> Option<Self> {
        let stem = path
            .trim_start_matches('/')
            .strip_prefix(IMAGE_PATH_PREFIX)?
            .strip_suffix(PNG_EXTENSION)?;
        let mut parts = stem.splitn(3, '-');
        let sketch_id = parts.next()?;
        let hash = parts.next()?;
        let mode = ImageMode::from_suffix(parts.next()?)?;
        let is_id = !sketch_id.is_empty() && sketch_id.bytes().all(|b| b.is_ascii_digit());
        let is_hash = !hash.is_empty()
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !is_id || !is_hash {
            return None;
        }
        Some(Self {
            sketch_id: sketch_id.to_string(),
            hash: hash.to_string(),
            mode,
        })
    }

    pub fn sketch_name(&self) -> String {
        format!("{SKETCH_NAME_PREFIX}{}", self.sketch_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sketch {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub svg: Option<String>,
}

impl Sketch {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            runtime: String::new(),
            svg: None,
        }
    }

    /// Numeric part of the name: `SKETCH-123` -> `123`.
    pub fn sketch_id(&self) -> &str {
        self.name
            .strip_prefix(SKETCH_NAME_PREFIX)
            .unwrap_or(&self.name)
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.code)
    }

    pub fn variant(&self) -> RuntimeVariant {
        RuntimeVariant::from_label(&self.runtime)
    }

    /// Image URL keyed by the code hash, so it changes whenever the code does.
    pub fn image_url(&self, mode: ImageMode) -> String {
        format!(
            "/s/{}-{}-{}.png",
            self.sketch_id(),
            self.content_hash(),
            mode.suffix()
        )
    }

    /// Name of the cached preview file, `<id>-<hash>-<s|w>.png`.
    pub fn png_file_name(&self, mode: ImageMode) -> String {
        format!(
            "{}-{}-{}{PNG_EXTENSION}",
            self.sketch_id(),
            self.content_hash(),
            mode.suffix()
        )
    }

    /// The current image URL when `request` names an older version of the
    /// code, `None` when it is already current.
    pub fn stale_redirect(&self, request: &ImageRequest) -> Option<String> {
        (request.hash != self.content_hash()).then(|| self.image_url(request.mode))
    }

    fn stored_svg(&self) -> Option<&str> {
        self.svg.as_deref().filter(|svg| !svg.is_empty())
    }

    /// Stored SVG if present, otherwise the cached render path. `cache`
    /// should use the sketch key prefix.
    pub async fn to_svg(&self, cache: &RenderCache) -> String {
        if let Some(svg) = self.stored_svg() {
            return svg.to_string();
        }
        cache.render(&self.code, self.variant()).await
    }

    /// PNG preview at `mode.size()`, rasterized from [`Sketch::to_svg`] and kept
    /// under `cache_dir` as [`Sketch::png_file_name`]. The file name carries the
    /// code hash, so an existing file is always current.
    pub async fn to_png(
        &self,
        mode: ImageMode,
        cache: &RenderCache,
        cache_dir: &Path,
    ) -> anyhow::Result<Vec<u8>> {
        let path = cache_dir.join(self.png_file_name(mode));
        match tokio::fs::read(&path).await {
            Ok(png) if !png.is_empty() => {
                tracing::debug!(event = "sketch_png_cache_hit", path = %path.display());
                return Ok(png);
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("read cached png {}", path.display()));
            }
        }

        let svg = self.to_svg(cache).await;
        let (width, height) = mode.size();
        let png = tokio::task::spawn_blocking(move || svg_to_png(&svg, width, height))
            .await
            .context("raster task aborted")??;

        tokio::fs::create_dir_all(cache_dir)
            .await
            .with_context(|| format!("create png cache dir {}", cache_dir.display()))?;
        let staging = path.with_extension("png.tmp");
        tokio::fs::write(&staging, &png)
            .await
            .with_context(|| format!("write png {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("commit png {}", path.display()))?;
        tracing::info!(event = "sketch_png_rendered", sketch = %self.name, path = %path.display());
        Ok(png)
    }

    /// Save-time refresh of the stored SVG. Errors leave `svg` empty.
    pub async fn refresh_svg(&mut self, executor: &dyn Executor) {
        self.svg = match executor.execute(&self.code, self.variant()).await {
            Ok(result) if result.is_success() => Some(render_svg(&result.shapes)),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(event = "sketch_svg_failed", sketch = %self.name, error = %err);
                None
            }
        };
    }
}
