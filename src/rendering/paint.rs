/// Paint command set produced by canvas renderers

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);
    pub const RED: Color = Color([224, 49, 49, 255]);
    pub const BLUE: Color = Color([66, 99, 235, 255]);
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PaintCommand {
    FillRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Color,
    },
    StrokeRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        width: f64,
        color: Color,
    },
    Polyline {
        points: Vec<Point>,
        width: f64,
        color: Color,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        size: f64,
        color: Color,
    },
    /// Embedded raster, stretched to its box
    Image {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        data_uri: String,
    },
}
