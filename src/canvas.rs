//! The drawing-canvas capability the pipeline consumes.
//!
//! The pipeline never holds shape objects across steps; it addresses shapes
//! by `ShapeId` and asks the canvas to create, update or delete them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rendering::{Color, Point, VectorScene};
use crate::Result;

/// Opaque shape identifier (`shape:<uuid>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    /// Mint a fresh identifier.
    pub fn new() -> Self {
        ShapeId(format!("shape:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        ShapeId(s.to_string())
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned page-space bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Lifecycle of a generated page shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PreviewState {
    /// Created before inference; shows the source image while waiting
    Pending { source_image: String },
    /// Populated with the generated document
    Committed { source_image: String, markup: String },
}

impl PreviewState {
    pub fn source_image(&self) -> &str {
        match self {
            PreviewState::Pending { source_image } => source_image,
            PreviewState::Committed { source_image, .. } => source_image,
        }
    }

    /// Generated markup, if the page has been committed
    pub fn markup(&self) -> Option<&str> {
        match self {
            PreviewState::Pending { .. } => None,
            PreviewState::Committed { markup, .. } => Some(markup),
        }
    }
}

/// Display size of a freshly created preview shape
pub const PREVIEW_WIDTH: f64 = 960.0;
pub const PREVIEW_HEIGHT: f64 = 540.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeProps {
    Geo {
        w: f64,
        h: f64,
        #[serde(default = "transparent")]
        fill: Color,
        #[serde(default)]
        stroke: Color,
    },
    /// Freehand stroke, points relative to the shape origin
    Draw {
        points: Vec<Point>,
        #[serde(default)]
        color: Color,
    },
    Arrow {
        start: Point,
        end: Point,
        #[serde(default)]
        color: Color,
    },
    Text {
        text: String,
        #[serde(default = "default_text_size")]
        size: f64,
        #[serde(default)]
        color: Color,
    },
    Image {
        w: f64,
        h: f64,
        data_uri: String,
    },
    /// A page previously generated by the pipeline
    Preview(PreviewState),
}

fn transparent() -> Color {
    Color::TRANSPARENT
}

fn default_text_size() -> f64 {
    24.0
}

impl ShapeProps {
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeProps::Geo { .. } => "geo",
            ShapeProps::Draw { .. } => "draw",
            ShapeProps::Arrow { .. } => "arrow",
            ShapeProps::Text { .. } => "text",
            ShapeProps::Image { .. } => "image",
            ShapeProps::Preview(_) => "preview",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    pub props: ShapeProps,
}

impl Shape {
    pub fn new(x: f64, y: f64, props: ShapeProps) -> Self {
        Self { id: ShapeId::new(), x, y, props }
    }

    /// The generated-page state, if this shape is a pipeline result
    pub fn preview(&self) -> Option<&PreviewState> {
        match &self.props {
            ShapeProps::Preview(state) => Some(state),
            _ => None,
        }
    }
}

/// Operations the pipeline needs from a drawing canvas.
#[async_trait]
pub trait Canvas: Send + Sync {
    /// Shapes currently selected by the user, in selection order
    async fn selected_shapes(&self) -> Vec<Shape>;

    /// Page-space bounds of a shape, if it has geometry
    async fn shape_page_bounds(&self, shape: &Shape) -> Option<Bounds>;

    /// Vector rendering of the union of `shapes`, or `None` if the canvas
    /// cannot render them
    async fn get_svg(&self, shapes: &[Shape]) -> Option<VectorScene>;

    async fn create_shape(&self, id: &ShapeId, x: f64, y: f64, props: ShapeProps) -> Result<()>;

    async fn update_shape(&self, id: &ShapeId, props: ShapeProps) -> Result<()>;

    async fn delete_shape(&self, id: &ShapeId) -> Result<()>;

    /// Number of shapes on the canvas
    async fn shape_count(&self) -> usize;
}
