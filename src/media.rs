//! Raster and vector image decoding

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use crate::error::{Error, Result};

/// Edge length of rasterized SVG previews
pub const SVG_RENDER_SIZE: u32 = 512;

/// Decode a png, jpg or bmp file into an RGBA bitmap
pub fn decode_image(data: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(data)?.to_rgba8())
}

/// Rasterize an SVG document onto a square canvas, scaled to fit and centered
pub fn rasterize_svg(data: &[u8]) -> Result<RgbaImage> {
    let tree = Tree::from_data(data, &Options::default())
        .map_err(|e| Error::decode("svg", e.to_string()))?;

    let size = SVG_RENDER_SIZE as f32;
    let mut pixmap = Pixmap::new(SVG_RENDER_SIZE, SVG_RENDER_SIZE)
        .ok_or_else(|| Error::decode("svg", "cannot allocate canvas"))?;

    let doc = tree.size();
    let scale = (size / doc.width()).min(size / doc.height());
    let dx = (size - doc.width() * scale) / 2.0;
    let dy = (size - doc.height() * scale) / 2.0;
    let transform = Transform::from_row(scale, 0.0, 0.0, scale, dx, dy);

    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect();

    RgbaImage::from_raw(SVG_RENDER_SIZE, SVG_RENDER_SIZE, rgba)
        .ok_or_else(|| Error::decode("svg", "pixel buffer size mismatch"))
}

/// Encode a bitmap as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}
