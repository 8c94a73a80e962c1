//! Inline citation markers from grounding metadata.
//!
//! Offsets in a [`GroundingSpan`] point into the *original* answer text.
//! [`add_citations`] is single-pass: running it again over its own output
//! uses stale offsets and will misplace markers.

use serde::{Deserialize, Serialize};

/// A source the model grounded part of its answer on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    pub index: usize,
    pub uri: String,
}

/// A claim boundary in the answer, tied to one or more chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSpan {
    /// Byte offset into the original answer where the claim ends
    pub end_offset: usize,
    pub chunk_indices: Vec<usize>,
}

/// Grounding metadata attached to a final model response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grounding {
    pub spans: Vec<GroundingSpan>,
    pub chunks: Vec<GroundingChunk>,
}

impl Grounding {
    fn uri(&self, index: usize) -> Option<&str> {
        self.chunks
            .iter()
            .find(|c| c.index == index)
            .map(|c| c.uri.as_str())
    }

    /// Render `[n](uri), [m](uri)` for a span, or `None` when no index resolves
    fn marker(&self, span: &GroundingSpan) -> Option<String> {
        let links: Vec<String> = span
            .chunk_indices
            .iter()
            .filter_map(|&i| self.uri(i).map(|uri| format!("[{}]({})", i + 1, uri)))
            .collect();

        if links.is_empty() {
            None
        } else {
            Some(links.join(", "))
        }
    }
}

/// Insert citation markers after each grounded span.
///
/// Spans are applied from the highest end offset to the lowest, so every
/// insertion lands after all offsets still waiting to be processed. Spans
/// sharing an offset are applied last-first, which leaves their markers in
/// their original relative order.
pub fn add_citations(text: &str, grounding: Option<&Grounding>) -> String {
    let Some(grounding) = grounding else {
        return text.to_string();
    };

    let mut spans: Vec<(usize, &GroundingSpan)> = grounding.spans.iter().enumerate().collect();
    spans.sort_by(|(ia, a), (ib, b)| b.end_offset.cmp(&a.end_offset).then(ib.cmp(ia)));

    let mut result = text.to_string();
    for (_, span) in spans {
        let Some(marker) = grounding.marker(span) else {
            continue;
        };

        let at = char_boundary_at_or_after(text, span.end_offset);
        result.insert_str(at, &format!(" {}", marker));
    }

    result
}

/// Clamp an offset to the text and move it forward onto a char boundary
fn char_boundary_at_or_after(text: &str, offset: usize) -> usize {
    let mut at = offset.min(text.len());
    while !text.is_char_boundary(at) {
        at += 1;
    }
    at
}
