//! Vector rendering of canvas content and its rasterization to PNG.
//!
//! A `VectorScene` is the resolution-independent rendering a canvas hands
//! back for a set of shapes. `svg::to_svg` lowers it to an SVG document and
//! `raster::rasterize` renders that with resvg.

pub mod paint;
pub mod raster;
pub mod svg;

use serde::{Deserialize, Serialize};

pub use paint::{Color, PaintCommand, Point};
pub use raster::{rasterize, RasterOptions};
pub use svg::{to_svg, TextMode};

/// A rasterized scene
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

/// Resolution-independent rendering of a group of shapes.
///
/// Command coordinates are relative to `origin`, which is the page-space
/// top-left corner of the union of the rendered shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorScene {
    pub origin: Point,
    pub width: f64,
    pub height: f64,
    pub commands: Vec<PaintCommand>,
}

impl VectorScene {
    pub fn new(origin: Point, width: f64, height: f64) -> Self {
        Self { origin, width, height, commands: Vec::new() }
    }

    pub fn push(&mut self, cmd: PaintCommand) {
        self.commands.push(cmd);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() || self.width <= 0.0 || self.height <= 0.0
    }
}
