//! Carry-forward of a previously generated page found in the selection.

use crate::canvas::Shape;
use crate::{Error, Result};

/// Prompt text sent in place of markup when there is nothing to iterate on
pub const NO_PRIOR_ART: &str = "No previous design has been provided this time.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorArt {
    None,
    Markup(String),
}

impl PriorArt {
    /// Text for the user turn of the inference request
    pub fn prompt_text(&self) -> &str {
        match self {
            PriorArt::None => NO_PRIOR_ART,
            PriorArt::Markup(markup) => markup,
        }
    }
}

/// Find the single previous page in `selection`.
///
/// Every preview shape counts toward the limit of one, including one still
/// waiting on its own inference call; such a pending page has no markup and
/// resolves to `PriorArt::None`.
pub fn resolve(selection: &[Shape]) -> Result<PriorArt> {
    let mut previews = selection.iter().filter_map(Shape::preview);
    let first = previews.next();
    let rest = previews.count();
    if rest > 0 {
        return Err(Error::MultiplePriorArt { count: rest + 1 });
    }
    Ok(match first.and_then(|p| p.markup()) {
        Some(markup) if !markup.is_empty() => PriorArt::Markup(markup.to_string()),
        _ => PriorArt::None,
    })
}
