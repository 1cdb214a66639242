use anyhow::Context;
use std::sync::Arc;

/// Largest edge accepted for a preview raster.
const MAX_DIM: u32 = 4_096;

/// Rasterizes `svg` into a `width` x `height` PNG, stretching the document's
/// own size to fill the target.
pub fn svg_to_png(svg: &str, width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
        anyhow::bail!("invalid raster size {width}x{height} (max {MAX_DIM}x{MAX_DIM})");
    }

    let tree = usvg::Tree::from_str(svg.trim(), &svg_options()).context("parse svg tree")?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .context("failed to allocate svg pixmap")?;

    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);

    resvg::render(&tree, xform, &mut pixmap.as_mut());
    pixmap.encode_png().context("encode png")
}

fn svg_options() -> usvg::Options<'static> {
    let mut fontdb = usvg::fontdb::Database::new();
    fontdb.load_system_fonts();
    usvg::Options {
        fontdb: Arc::new(fontdb),
        ..Default::default()
    }
}
