/// Rasterizer: lowers a `VectorScene` to SVG and renders it with resvg

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use log::debug;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::fontdb::{Database, Family, Query};
use resvg::{tiny_skia, usvg};

use crate::rendering::svg::{to_svg, TextMode};
use crate::rendering::{PaintCommand, Screenshot, VectorScene};
use crate::{data_uri, Error, Result};

/// Largest bitmap edge we are willing to allocate
pub const MAX_RASTER_DIM: u32 = 8192;

/// Options controlling how a scene is turned into a bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Flatten onto an opaque white background instead of keeping alpha
    pub opaque: bool,
    /// Encoding quality in `0.0..=1.0`; PNG is lossless so this only selects
    /// the compression effort
    pub quality: f32,
    /// Pixels per page unit
    pub scale: f64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            opaque: false,
            quality: 1.0,
            scale: 1.0,
        }
    }
}

impl RasterOptions {
    /// Options for the platform identified by `user_agent`.
    ///
    /// Safari-family engines mis-render transparent bitmaps produced from
    /// vector content, so they get an opaque full-quality 1:1 encoding.
    pub fn for_user_agent(user_agent: &str) -> Self {
        Self {
            opaque: is_safari(user_agent),
            ..Self::default()
        }
    }
}

/// Matches agents that mention Safari but are not Chrome or Android.
pub fn is_safari(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    ua.contains("safari") && !ua.contains("chrome") && !ua.contains("android")
}

/// System fonts, loaded once per process.
pub fn font_database() -> &'static Arc<Database> {
    static FONTS: OnceLock<Arc<Database>> = OnceLock::new();
    FONTS.get_or_init(|| {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!("loaded {} font faces", db.len());
        Arc::new(db)
    })
}

/// Pick a family to draw text with, preferring the generic sans-serif one.
pub fn text_mode(db: &Database) -> TextMode {
    let sans = Query { families: &[Family::SansSerif], ..Query::default() };
    if db.query(&sans).is_some() {
        return TextMode::Font("sans-serif".into());
    }
    db.faces()
        .find_map(|face| face.families.first().map(|(name, _)| TextMode::Font(name.clone())))
        .unwrap_or(TextMode::Bitmap)
}

/// Rasterize a scene into a PNG screenshot.
pub fn rasterize(scene: &VectorScene, options: &RasterOptions) -> Result<Screenshot> {
    if options.scale <= 0.0 || !options.scale.is_finite() {
        return Err(Error::ConfigError(format!("invalid raster scale {}", options.scale)));
    }
    let width = pixel_extent(scene.width, options.scale)?;
    let height = pixel_extent(scene.height, options.scale)?;
    check_images(scene)?;

    let fonts = font_database();
    let svg = to_svg(scene, &text_mode(fonts));
    let mut usvg_options = usvg::Options::default();
    usvg_options.fontdb = fonts.clone();
    let tree = usvg::Tree::from_str(&svg, &usvg_options)
        .map_err(|e| Error::RenderUnavailable(format!("scene is not valid svg: {e}")))?;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| Error::RenderUnavailable(format!("cannot allocate {width}x{height} pixmap")))?;
    if options.opaque {
        pixmap.fill(tiny_skia::Color::WHITE);
    }
    let s = options.scale as f32;
    resvg::render(&tree, Transform::from_scale(s, s), &mut pixmap.as_mut());

    // tiny-skia keeps premultiplied alpha; PNG wants straight alpha
    let raw: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();

    let png_data = if options.opaque {
        let img = RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| Error::EncodeError("pixmap size mismatch".into()))?;
        let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
        encode_png(rgb.as_raw(), width, height, ExtendedColorType::Rgb8, options.quality)?
    } else {
        encode_png(&raw, width, height, ExtendedColorType::Rgba8, options.quality)?
    };

    Ok(Screenshot { width, height, png_data })
}

// resvg skips images it cannot decode; surface them as errors instead.
fn check_images(scene: &VectorScene) -> Result<()> {
    for cmd in &scene.commands {
        if let PaintCommand::Image { data_uri: uri, .. } = cmd {
            let (_, bytes) = data_uri::decode(uri)?;
            image::load_from_memory(&bytes)?;
        }
    }
    Ok(())
}

fn pixel_extent(units: f64, scale: f64) -> Result<u32> {
    let px = (units * scale).ceil();
    if !px.is_finite() || px > f64::from(MAX_RASTER_DIM) {
        return Err(Error::RenderUnavailable(format!(
            "scene is too large to rasterize ({px} px)"
        )));
    }
    Ok((px as u32).max(1))
}

fn encode_png(
    raw: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    quality: f32,
) -> Result<Vec<u8>> {
    let compression = if quality >= 1.0 {
        CompressionType::Best
    } else {
        CompressionType::Fast
    };
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new_with_quality(&mut out, compression, PngFilter::Adaptive)
        .write_image(raw, width, height, color)?;
    Ok(out.into_inner())
}
