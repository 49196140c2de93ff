//! The synthesis pipeline: selection in, committed page shape out.
//!
//! `Synthesizer::synthesize` runs these steps strictly in order:
//!
//! 1. reject an empty selection
//! 2. resolve prior art (at most one previous page)
//! 3. compute where the new page goes
//! 4. capture the selection as a PNG
//! 5. create the pending page shape showing the capture
//! 6. call the model and extract the document
//! 7. commit the markup, or delete the pending shape on any failure

use log::{debug, info, warn};
use std::sync::Arc;

use crate::canvas::{Bounds, Canvas, PreviewState, Shape, ShapeId, ShapeProps};
use crate::capture::{capture, CapturedImage};
use crate::extract::extract;
use crate::inference::{Inference, SynthesisRequest};
use crate::prior_art::{self, PriorArt};
use crate::rendering::RasterOptions;
use crate::{Error, Result, SynthConfig};

/// Where a synthesis call is; logged on each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CapturingInput,
    PlaceholderCreated,
    AwaitingInference,
    Committed,
    RolledBack,
}

/// Top-left corner for a new page shape placed beside `bounds`.
///
/// x is the rightmost right edge plus `gap`, y the topmost top edge.
/// Returns `(gap, 0.0)` when no bounds are given.
pub fn placement<I>(bounds: I, gap: f64) -> (f64, f64)
where
    I: IntoIterator<Item = Bounds>,
{
    let (right, top) = bounds
        .into_iter()
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(right, top), b| {
            (right.max(b.max_x), top.min(b.min_y))
        });
    if right.is_finite() && top.is_finite() {
        (right + gap, top)
    } else {
        (gap, 0.0)
    }
}

/// A pending page shape that must be either committed or rolled back.
#[must_use = "a pending page has to be committed or rolled back"]
struct PendingPage<'a, C: Canvas + ?Sized> {
    canvas: &'a C,
    id: ShapeId,
    source_image: String,
}

impl<'a, C: Canvas + ?Sized> PendingPage<'a, C> {
    async fn create(canvas: &'a C, x: f64, y: f64, image: &CapturedImage) -> Result<Self> {
        let id = ShapeId::new();
        let props = ShapeProps::Preview(PreviewState::Pending {
            source_image: image.data_uri.clone(),
        });
        canvas.create_shape(&id, x, y, props).await?;
        Ok(Self {
            canvas,
            id,
            source_image: image.data_uri.clone(),
        })
    }

    async fn commit(self, markup: String) -> Result<ShapeId> {
        let props = ShapeProps::Preview(PreviewState::Committed {
            source_image: self.source_image.clone(),
            markup,
        });
        match self.canvas.update_shape(&self.id, props).await {
            Ok(()) => Ok(self.id),
            Err(err) => Err(self.rollback(err).await),
        }
    }

    /// Delete the pending shape and hand back the error that caused it.
    async fn rollback(self, cause: Error) -> Error {
        warn!("rolling back page {}: {cause}", self.id);
        if let Err(err) = self.canvas.delete_shape(&self.id).await {
            warn!("failed to delete pending page {}: {err}", self.id);
        }
        cause
    }
}

/// Coordinates one synthesis call per `synthesize` invocation.
///
/// Holds no per-call state, so concurrent calls on one `Synthesizer` are
/// independent apart from the shared canvas.
pub struct Synthesizer<C: Canvas + ?Sized> {
    canvas: Arc<C>,
    inference: Arc<dyn Inference>,
    config: SynthConfig,
    raster: RasterOptions,
}

impl<C: Canvas + ?Sized> Synthesizer<C> {
    pub fn new(canvas: Arc<C>, inference: Arc<dyn Inference>, config: SynthConfig) -> Self {
        Self {
            canvas,
            inference,
            config,
            raster: RasterOptions::default(),
        }
    }

    /// Use platform-specific raster options (see `RasterOptions::for_user_agent`).
    pub fn with_raster_options(mut self, raster: RasterOptions) -> Self {
        self.raster = raster;
        self
    }

    pub fn canvas(&self) -> &Arc<C> {
        &self.canvas
    }

    /// Synthesize a page from whatever is currently selected on the canvas.
    pub async fn synthesize_selection(&self, api_key: Option<&str>) -> Result<ShapeId> {
        let selection = self.canvas.selected_shapes().await;
        self.synthesize(&selection, api_key).await
    }

    /// Turn `selection` into a committed page shape and return its id.
    ///
    /// `api_key` is the caller-supplied key; a process-level key configured
    /// on the inference side takes precedence over it.
    pub async fn synthesize(&self, selection: &[Shape], api_key: Option<&str>) -> Result<ShapeId> {
        let mut stage = Stage::Idle;
        debug!("synthesis {stage:?}: {} shapes selected", selection.len());

        if selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        let prior = prior_art::resolve(selection)?;

        stage = Stage::CapturingInput;
        debug!("synthesis {stage:?}");
        let mut bounds = Vec::with_capacity(selection.len());
        for shape in selection {
            if let Some(b) = self.canvas.shape_page_bounds(shape).await {
                bounds.push(b);
            }
        }
        let (x, y) = placement(bounds, self.config.preview_gap);
        let image = capture(self.canvas.as_ref(), selection, &self.raster).await?;

        let page = PendingPage::create(self.canvas.as_ref(), x, y, &image).await?;
        stage = Stage::PlaceholderCreated;
        debug!("synthesis {stage:?}: page {} at ({x}, {y})", page.id);

        stage = Stage::AwaitingInference;
        debug!("synthesis {stage:?}");
        match self.generate(&image, &prior, api_key).await {
            Ok(markup) => {
                let id = page.commit(markup).await?;
                stage = Stage::Committed;
                info!("synthesis {stage:?}: page {id}");
                Ok(id)
            }
            Err(err) => {
                let err = page.rollback(err).await;
                stage = Stage::RolledBack;
                debug!("synthesis {stage:?}");
                Err(err)
            }
        }
    }

    async fn generate(&self, image: &CapturedImage, prior: &PriorArt, api_key: Option<&str>) -> Result<String> {
        let request = SynthesisRequest {
            image: image.data_uri.clone(),
            prior_markup: prior.prompt_text().to_string(),
            api_key: api_key.map(str::to_string),
        };
        let payload = self.inference.infer(&request).await?;
        extract(&payload)
    }
}
