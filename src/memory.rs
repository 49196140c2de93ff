//! In-process canvas backed by an insertion-ordered shape arena.
//!
//! `MemoryCanvas` is what the CLI loads scene files into, and what tests
//! drive the pipeline against.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::canvas::{Bounds, Canvas, Shape, ShapeId, ShapeProps, PREVIEW_HEIGHT, PREVIEW_WIDTH};
use crate::rendering::{Color, PaintCommand, Point, VectorScene};
use crate::{Error, Result};

const STROKE_WIDTH: f64 = 3.0;

#[derive(Debug, Default)]
struct Store {
    shapes: IndexMap<ShapeId, Shape>,
    selection: Vec<ShapeId>,
}

/// Serialized form of a canvas: its shapes and the current selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    pub shapes: Vec<Shape>,
    #[serde(default)]
    pub selection: Vec<ShapeId>,
}

#[derive(Debug, Default)]
pub struct MemoryCanvas {
    store: Mutex<Store>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scene(scene: Scene) -> Self {
        let canvas = Self::new();
        {
            let mut store = canvas.lock();
            for shape in scene.shapes {
                store.shapes.insert(shape.id.clone(), shape);
            }
            let selection = scene
                .selection
                .into_iter()
                .filter(|id| store.shapes.contains_key(id))
                .collect();
            store.selection = selection;
        }
        canvas
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read scene {}: {e}", path.display())))?;
        let scene: Scene = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("invalid scene {}: {e}", path.display())))?;
        Ok(Self::from_scene(scene))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.scene())
            .map_err(|e| Error::EncodeError(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| Error::ConfigError(format!("cannot write scene {}: {e}", path.display())))
    }

    pub fn scene(&self) -> Scene {
        let store = self.lock();
        Scene {
            shapes: store.shapes.values().cloned().collect(),
            selection: store.selection.clone(),
        }
    }

    /// Add a shape and return its id.
    pub fn insert(&self, shape: Shape) -> ShapeId {
        let id = shape.id.clone();
        self.lock().shapes.insert(id.clone(), shape);
        id
    }

    pub fn get(&self, id: &ShapeId) -> Option<Shape> {
        self.lock().shapes.get(id).cloned()
    }

    /// Replace the selection; unknown ids are ignored.
    pub fn select(&self, ids: &[ShapeId]) {
        let mut store = self.lock();
        let selection = ids
            .iter()
            .filter(|id| store.shapes.contains_key(*id))
            .cloned()
            .collect();
        store.selection = selection;
    }

    pub fn select_all(&self) {
        let mut store = self.lock();
        let all = store.shapes.keys().cloned().collect();
        store.selection = all;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // every mutation is a single map operation, so poisoning leaves it consistent
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Page bounds of a shape computed from its own geometry.
pub fn page_bounds(shape: &Shape) -> Option<Bounds> {
    let (x, y) = (shape.x, shape.y);
    match &shape.props {
        ShapeProps::Geo { w, h, .. } | ShapeProps::Image { w, h, .. } => {
            Some(Bounds::new(x, y, x + w, y + h))
        }
        ShapeProps::Draw { points, .. } => {
            let first = points.first()?;
            let seed = Bounds::new(first.x, first.y, first.x, first.y);
            let b = points.iter().fold(seed, |acc, p| acc.union(&Bounds::new(p.x, p.y, p.x, p.y)));
            Some(Bounds::new(x + b.min_x, y + b.min_y, x + b.max_x, y + b.max_y))
        }
        ShapeProps::Arrow { start, end, .. } => Some(Bounds::new(
            x + start.x.min(end.x),
            y + start.y.min(end.y),
            x + start.x.max(end.x),
            y + start.y.max(end.y),
        )),
        ShapeProps::Text { text, size, .. } => {
            let cols = text.lines().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
            let rows = text.lines().count().max(1) as f64;
            Some(Bounds::new(x, y, x + cols * size * 0.6, y + rows * size * 1.2))
        }
        ShapeProps::Preview(_) => Some(Bounds::new(x, y, x + PREVIEW_WIDTH, y + PREVIEW_HEIGHT)),
    }
}

fn paint_shape(shape: &Shape, origin: Point, scene: &mut VectorScene) {
    let ox = shape.x - origin.x;
    let oy = shape.y - origin.y;
    let offset = |p: &Point| Point::new(ox + p.x, oy + p.y);
    match &shape.props {
        ShapeProps::Geo { w, h, fill, stroke } => {
            scene.push(PaintCommand::FillRect { x: ox, y: oy, w: *w, h: *h, color: *fill });
            scene.push(PaintCommand::StrokeRect {
                x: ox,
                y: oy,
                w: *w,
                h: *h,
                width: STROKE_WIDTH,
                color: *stroke,
            });
        }
        ShapeProps::Draw { points, color } => scene.push(PaintCommand::Polyline {
            points: points.iter().map(offset).collect(),
            width: STROKE_WIDTH,
            color: *color,
        }),
        ShapeProps::Arrow { start, end, color } => {
            let (a, b) = (offset(start), offset(end));
            scene.push(PaintCommand::Polyline { points: vec![a, b], width: STROKE_WIDTH, color: *color });
            for head in arrow_head(a, b) {
                scene.push(PaintCommand::Polyline { points: vec![b, head], width: STROKE_WIDTH, color: *color });
            }
        }
        ShapeProps::Text { text, size, color } => scene.push(PaintCommand::Text {
            x: ox,
            y: oy,
            text: text.clone(),
            size: *size,
            color: *color,
        }),
        ShapeProps::Image { w, h, data_uri } => scene.push(PaintCommand::Image {
            x: ox,
            y: oy,
            w: *w,
            h: *h,
            data_uri: data_uri.clone(),
        }),
        // A previous page shows up as a white rectangle in the wireframe.
        ShapeProps::Preview(_) => {
            scene.push(PaintCommand::FillRect {
                x: ox,
                y: oy,
                w: PREVIEW_WIDTH,
                h: PREVIEW_HEIGHT,
                color: Color::WHITE,
            });
            scene.push(PaintCommand::StrokeRect {
                x: ox,
                y: oy,
                w: PREVIEW_WIDTH,
                h: PREVIEW_HEIGHT,
                width: 1.0,
                color: Color([200, 200, 200, 255]),
            });
        }
    }
}

fn arrow_head(from: Point, tip: Point) -> [Point; 2] {
    let angle = (tip.y - from.y).atan2(tip.x - from.x);
    let len = 12.0;
    let spread = std::f64::consts::FRAC_PI_6;
    [angle + spread, angle - spread].map(|a| Point::new(tip.x - len * a.cos(), tip.y - len * a.sin()))
}

#[async_trait]
impl Canvas for MemoryCanvas {
    async fn selected_shapes(&self) -> Vec<Shape> {
        let store = self.lock();
        store
            .selection
            .iter()
            .filter_map(|id| store.shapes.get(id).cloned())
            .collect()
    }

    async fn shape_page_bounds(&self, shape: &Shape) -> Option<Bounds> {
        page_bounds(shape)
    }

    async fn get_svg(&self, shapes: &[Shape]) -> Option<VectorScene> {
        let bounds = shapes
            .iter()
            .filter_map(page_bounds)
            .reduce(|acc, b| acc.union(&b))?;
        let pad = STROKE_WIDTH;
        let origin = Point::new(bounds.min_x - pad, bounds.min_y - pad);
        let mut scene = VectorScene::new(origin, bounds.width() + pad * 2.0, bounds.height() + pad * 2.0);
        for shape in shapes {
            paint_shape(shape, origin, &mut scene);
        }
        Some(scene)
    }

    async fn create_shape(&self, id: &ShapeId, x: f64, y: f64, props: ShapeProps) -> Result<()> {
        let mut store = self.lock();
        if store.shapes.contains_key(id) {
            return Err(Error::CanvasError(format!("shape {id} already exists")));
        }
        store.shapes.insert(id.clone(), Shape { id: id.clone(), x, y, props });
        Ok(())
    }

    async fn update_shape(&self, id: &ShapeId, props: ShapeProps) -> Result<()> {
        let mut store = self.lock();
        let shape = store
            .shapes
            .get_mut(id)
            .ok_or_else(|| Error::CanvasError(format!("no shape {id}")))?;
        if shape.props.type_name() != props.type_name() {
            return Err(Error::CanvasError(format!(
                "cannot change {id} from {} to {}",
                shape.props.type_name(),
                props.type_name()
            )));
        }
        shape.props = props;
        Ok(())
    }

    async fn delete_shape(&self, id: &ShapeId) -> Result<()> {
        let mut store = self.lock();
        store
            .shapes
            .shift_remove(id)
            .ok_or_else(|| Error::CanvasError(format!("no shape {id}")))?;
        store.selection.retain(|s| s != id);
        Ok(())
    }

    async fn shape_count(&self) -> usize {
        self.lock().shapes.len()
    }
}
