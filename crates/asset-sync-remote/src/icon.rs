//! Icon normalization: any supported vector or raster icon becomes a PNG
//! no larger than [`ICON_SIZE`] on either side.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use resvg::{tiny_skia, usvg};

/// Bounding box, in pixels, that normalized icons fit into.
pub const ICON_SIZE: u32 = 160;

/// Content type of every normalized icon.
pub const ICON_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("failed to parse SVG icon: {0}")]
    Svg(#[from] usvg::Error),

    #[error("SVG icon has unusable dimensions {width}x{height}")]
    SvgSize { width: u32, height: u32 },

    #[error("failed to decode icon: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode icon: {0}")]
    Encode(String),
}

/// A resized, re-encoded icon ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIcon {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode `data` according to `content_type`, fit it into the icon bounding
/// box and re-encode it as PNG.
pub fn normalize_icon(data: &[u8], content_type: &str) -> Result<NormalizedIcon, IconError> {
    let decoded = if is_svg(content_type) {
        DynamicImage::ImageRgba8(rasterize_svg(data)?)
    } else {
        image::load_from_memory(data)?
    };

    let fitted = fit(decoded, ICON_SIZE, ICON_SIZE);
    let (width, height) = fitted.dimensions();

    let mut encoded = Vec::new();
    fitted
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|e| IconError::Encode(e.to_string()))?;

    Ok(NormalizedIcon {
        data: encoded,
        content_type: ICON_CONTENT_TYPE,
        width,
        height,
    })
}

fn is_svg(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("image/svg")
}

/// Render an SVG document at its intrinsic size.
fn rasterize_svg(data: &[u8]) -> Result<RgbaImage, IconError> {
    let tree = usvg::Tree::from_data(data, &usvg::Options::default())?;
    let size = tree.size().to_int_size();
    let (width, height) = (size.width(), size.height());

    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(IconError::SvgSize { width, height })?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha; image expects straight alpha.
    let mut rgba = Vec::with_capacity(pixmap.pixels().len() * 4);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    RgbaImage::from_raw(width, height, rgba).ok_or(IconError::SvgSize { width, height })
}

/// Scale down to fit within `max_width` x `max_height`, keeping the aspect
/// ratio. Images that already fit are returned untouched.
fn fit(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }
    image.resize(max_width, max_height, FilterType::Lanczos3)
}
