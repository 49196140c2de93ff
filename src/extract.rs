//! Pulls the HTML document out of a free-form chat completion.

use crate::inference::CompletionPayload;
use crate::{Error, Result};

pub const DOCUMENT_START: &str = "<!DOCTYPE html>";
pub const DOCUMENT_END: &str = "</html>";

/// Extract the document from the primary candidate of `payload`.
pub fn extract(payload: &CompletionPayload) -> Result<String> {
    let text = payload.primary_text().ok_or(Error::NoDocumentFound)?;
    extract_document(text)
        .map(str::to_string)
        .ok_or(Error::NoDocumentFound)
}

/// Slice from the first start marker through the first end marker.
///
/// Returns `None` when either marker is missing, or when the first end
/// marker precedes the first start marker.
pub fn extract_document(text: &str) -> Option<&str> {
    let start = text.find(DOCUMENT_START)?;
    let end = text.find(DOCUMENT_END)?;
    if end < start {
        return None;
    }
    Some(&text[start..end + DOCUMENT_END.len()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(content: &str) -> CompletionPayload {
        serde_json::from_value(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
        .unwrap()
    }

    #[test]
    fn extracts_exact_span() {
        let html = extract(&payload("...<!DOCTYPE html>BODY</html>...trailer")).unwrap();
        assert_eq!(html, "<!DOCTYPE html>BODY</html>");
    }

    #[test]
    fn ignores_surrounding_markdown_fence() {
        let text = "Here you go:\n```html\n<!DOCTYPE html>\n<html><body>x</body></html>\n```";
        assert_eq!(
            extract(&payload(text)).unwrap(),
            "<!DOCTYPE html>\n<html><body>x</body></html>"
        );
    }

    #[test]
    fn missing_start_marker_fails() {
        let err = extract(&payload("<html><body></body></html>")).unwrap_err();
        assert!(matches!(err, Error::NoDocumentFound));
    }

    #[test]
    fn missing_end_marker_fails() {
        assert!(extract_document("<!DOCTYPE html><html><body>truncated").is_none());
    }

    #[test]
    fn end_before_start_fails() {
        assert!(extract_document("</html> then <!DOCTYPE html><p>x</p></html>").is_none());
    }

    #[test]
    fn empty_choices_fail() {
        let payload: CompletionPayload = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(extract(&payload), Err(Error::NoDocumentFound)));
    }

    #[test]
    fn uses_first_candidate_only() {
        let payload: CompletionPayload = serde_json::from_value(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "no document" } },
                { "message": { "role": "assistant", "content": "<!DOCTYPE html></html>" } }
            ]
        }))
        .unwrap();
        assert!(matches!(extract(&payload), Err(Error::NoDocumentFound)));
    }
}
