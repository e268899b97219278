use crate::models::{Document, RawDocument, UNKNOWN_SOURCE};

/// Drop every loader-supplied field except the source path.
pub fn reduce_document(document: &RawDocument) -> Document {
    Document {
        text: document.text.clone(),
        source: document.source().unwrap_or(UNKNOWN_SOURCE).to_string(),
    }
}

pub fn reduce_metadata(documents: &[RawDocument]) -> Vec<Document> {
    documents.iter().map(reduce_document).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn raw(text: &str, pairs: &[(&str, &str)]) -> RawDocument {
        RawDocument {
            text: text.to_string(),
            metadata: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn keeps_only_source() {
        let document = raw(
            "page text",
            &[("source", "data/guide.pdf"), ("page", "3"), ("total_pages", "9")],
        );

        let reduced = reduce_document(&document);

        assert_eq!(
            reduced,
            Document {
                text: "page text".to_string(),
                source: "data/guide.pdf".to_string(),
            }
        );
    }

    #[test]
    fn missing_source_becomes_unknown() {
        let reduced = reduce_document(&raw("orphan", &[("page", "1")]));
        assert_eq!(reduced.source, "unknown");
    }

    #[test]
    fn reduction_is_idempotent() {
        let documents = vec![
            raw("one", &[("source", "a.pdf"), ("producer", "x")]),
            raw("two", &[]),
        ];

        let once = reduce_metadata(&documents);
        let twice = reduce_metadata(
            &once
                .iter()
                .cloned()
                .map(RawDocument::from)
                .collect::<Vec<_>>(),
        );

        assert_eq!(once, twice);
    }
}
