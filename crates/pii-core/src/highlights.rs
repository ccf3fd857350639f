//! Linking PDF highlight annotations with spans

use pii_types::{BlockAddress, Highlight, Origin, Quad, ReadDocument, SchemaError, Span};
use tracing::debug;

use crate::resolver::SpanResolver;

pub const MANUAL_ENTITY: &str = "MANUAL";

/// Record in each highlight's `pii` the ids of spans it covers
///
/// A highlight covers a span when one of its quads intersects one of the
/// span's character quads on the same page. Returns the number of new links.
pub fn link_highlights(
    highlights: &mut [Highlight],
    spans: &[Span],
    resolver: &SpanResolver<'_>,
) -> Result<usize, SchemaError> {
    let mut linked = 0;
    for span in spans {
        let quads = resolver.char_quads(span)?;
        for highlight in highlights
            .iter_mut()
            .filter(|h| h.page == span.start.page_num)
        {
            if highlight.pii.contains(&span.id) {
                continue;
            }
            let hit = highlight.quads.iter().any(|hq| {
                quads
                    .iter()
                    .filter(|q| !q.is_degenerate())
                    .any(|q| hq.intersects(q))
            });
            if hit {
                highlight.pii.push(span.id.clone());
                linked += 1;
            }
        }
    }
    Ok(linked)
}

fn manual_entity(highlight: &Highlight) -> String {
    match highlight.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() && !comment.contains(char::is_whitespace) => {
            comment.to_string()
        }
        _ => MANUAL_ENTITY.to_string(),
    }
}

fn selected(quad: &Quad, highlight: &Highlight) -> bool {
    if quad.is_degenerate() {
        return false;
    }
    let (x, y) = quad.center();
    highlight.quads.iter().any(|hq| hq.contains_point(x, y))
}

/// Manual spans for the characters a highlight covers
///
/// A character is covered when its quad centre lies inside a highlight quad.
/// Each maximal run of covered characters in one block becomes a span; a
/// line break between two covered characters does not end the run, and
/// whitespace at either end of a run is trimmed.
pub fn manual_spans(highlight: &Highlight, doc: &ReadDocument) -> Vec<Span> {
    let Some(forward) = doc.offset_to_coords.as_ref() else {
        return Vec::new();
    };
    let entity = manual_entity(highlight);
    let mut spans = Vec::new();

    for (block, quads) in forward.iter().filter(|(b, _)| b.page_num == highlight.page) {
        let Some(text) = doc.block_text(block) else {
            continue;
        };
        let chars: Vec<char> = text.chars().collect();
        let mut covered: Vec<bool> = quads.iter().map(|q| selected(q, highlight)).collect();
        for i in 1..covered.len().saturating_sub(1) {
            if chars.get(i) == Some(&'\n') && covered[i - 1] && covered[i + 1] {
                covered[i] = true;
            }
        }

        let mut i = 0;
        while i < covered.len() {
            if !covered[i] {
                i += 1;
                continue;
            }
            let run_start = i;
            while i < covered.len() && covered[i] {
                i += 1;
            }
            if let Some(span) = trimmed_span(block, &chars, run_start, i, &entity) {
                spans.push(span);
            }
        }
    }

    debug!(
        highlight = %highlight.id,
        spans = spans.len(),
        "manual spans from highlight"
    );
    spans
}

fn trimmed_span(
    block: BlockAddress,
    chars: &[char],
    mut start: usize,
    mut end: usize,
    entity: &str,
) -> Option<Span> {
    end = end.min(chars.len());
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start == end {
        return None;
    }
    let word: String = chars[start..end].iter().collect();
    Some(Span::new(block, start, end, entity, &word, Origin::Manual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{read_document, row};
    use pretty_assertions::assert_eq;

    fn highlight(quads: Vec<Quad>) -> Highlight {
        Highlight {
            id: "h1".into(),
            page: 0,
            quads,
            comment: None,
            pii: Vec::new(),
        }
    }

    #[test]
    fn test_link_by_intersection() {
        let doc = read_document(&[("abcdef", row(6, 0.0))], true);
        let resolver = SpanResolver::new(&doc).unwrap();
        let span = Span::new(BlockAddress::new(0, 0), 1, 3, "X", "bc", Origin::Model);
        let mut highlights = vec![
            highlight(vec![Quad::new(12.0, 2.0, 18.0, 8.0)]),
            highlight(vec![Quad::new(45.0, 2.0, 55.0, 8.0)]),
        ];
        let linked = link_highlights(&mut highlights, &[span.clone()], &resolver).unwrap();
        assert_eq!(linked, 1);
        assert_eq!(highlights[0].pii, vec![span.id]);
        assert!(highlights[1].pii.is_empty());
    }

    #[test]
    fn test_link_is_idempotent() {
        let doc = read_document(&[("abcdef", row(6, 0.0))], true);
        let resolver = SpanResolver::new(&doc).unwrap();
        let span = Span::new(BlockAddress::new(0, 0), 0, 2, "X", "ab", Origin::Model);
        let mut highlights = vec![highlight(vec![Quad::new(0.0, 0.0, 20.0, 12.0)])];
        link_highlights(&mut highlights, &[span.clone()], &resolver).unwrap();
        let again = link_highlights(&mut highlights, &[span], &resolver).unwrap();
        assert_eq!(again, 0);
        assert_eq!(highlights[0].pii.len(), 1);
    }

    #[test]
    fn test_manual_span_from_centres() {
        let doc = read_document(&[("ab cd", row(5, 0.0))], true);
        // Covers the centres of 'b', ' ', 'c'
        let h = highlight(vec![Quad::new(12.0, 0.0, 38.0, 12.0)]);
        let spans = manual_spans(&h, &doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].word, "b c");
        assert_eq!(spans[0].start.offset, 1);
        assert_eq!(spans[0].end.offset, 4);
        assert_eq!(spans[0].entity, MANUAL_ENTITY);
        assert_eq!(spans[0].origin, Origin::Manual);
    }

    #[test]
    fn test_manual_span_trims_whitespace_and_uses_comment() {
        let doc = read_document(&[("ab cd", row(5, 0.0))], true);
        let mut h = highlight(vec![Quad::new(22.0, 0.0, 50.0, 12.0)]);
        h.comment = Some("PERSON".into());
        let spans = manual_spans(&h, &doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].word, "cd");
        assert_eq!(spans[0].entity, "PERSON");

        h.comment = Some("please redact".into());
        assert_eq!(manual_spans(&h, &doc)[0].entity, MANUAL_ENTITY);
    }

    #[test]
    fn test_manual_span_bridges_line_break() {
        let mut quads = row(2, 20.0);
        quads.push(Quad::new(20.0, 20.0, 20.0, 32.0));
        quads.extend(row(2, 0.0));
        let doc = read_document(&[("ab\ncd", quads)], true);
        let h = highlight(vec![
            Quad::new(0.0, 20.0, 20.0, 32.0),
            Quad::new(0.0, 0.0, 20.0, 12.0),
        ]);
        let spans = manual_spans(&h, &doc);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].word, "ab\ncd");
    }

    #[test]
    fn test_manual_spans_need_map() {
        let doc = read_document(&[("ab", row(2, 0.0))], false);
        assert!(manual_spans(&highlight(vec![Quad::new(0.0, 0.0, 20.0, 12.0)]), &doc).is_empty());
    }
}
