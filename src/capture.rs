//! Selection capture: the selected shapes flattened into one PNG.

use log::debug;
use sha2::{Digest, Sha256};

use crate::canvas::{Canvas, Shape};
use crate::rendering::{rasterize, RasterOptions};
use crate::{data_uri, Error, Result};

/// PNG bytes of the selection plus their `data:` URI form.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    pub fn from_png(png: Vec<u8>, width: u32, height: u32) -> Self {
        let data_uri = data_uri::encode(data_uri::PNG_MIME, &png);
        Self { png, data_uri, width, height }
    }

    /// Short content fingerprint, for logs
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.png);
        hex::encode(&digest[..6])
    }
}

/// Render `selection` through the canvas and rasterize it.
///
/// Does not mutate the canvas.
pub async fn capture<C>(canvas: &C, selection: &[Shape], options: &RasterOptions) -> Result<CapturedImage>
where
    C: Canvas + ?Sized,
{
    if selection.is_empty() {
        return Err(Error::EmptySelection);
    }
    let scene = canvas
        .get_svg(selection)
        .await
        .ok_or_else(|| Error::RenderUnavailable("Could not get the SVG.".into()))?;
    if scene.is_empty() {
        return Err(Error::RenderUnavailable("selection rendered to an empty scene".into()));
    }

    let shot = rasterize(&scene, options).map_err(|e| match e {
        Error::RenderUnavailable(_) => e,
        other => Error::RenderUnavailable(other.to_string()),
    })?;
    let image = CapturedImage::from_png(shot.png_data, shot.width, shot.height);
    debug!(
        "captured {} shapes as {}x{} png ({} bytes, {})",
        selection.len(),
        image.width,
        image.height,
        image.png.len(),
        image.fingerprint()
    );
    Ok(image)
}
