use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ContextError, ErrorKind};

/// The rich-text document as stored by the editor. Two historical root shapes are accepted:
/// an object carrying a `content` array (`{"type": "doc", "content": [...]}`) and a bare
/// array of block nodes. A `null` root deserializes into `Document::Null`, which renders as
/// a "no content" failure instead of an empty PDF.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Document {
    Wrapped { content: Vec<Node> },
    Bare(Vec<Node>),
    Null,
}

impl Document {
    pub fn from_path(document_path: &Path) -> Result<Document, ContextError> {
        let document_content = std::fs::read(document_path).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Io,
                format!("Unable to read the document {:?}", document_path),
                &error,
            )
        })?;

        Document::from_slice(&document_content)
            .map_err(|error| error.within(format!("Unable to load the document {:?}", document_path)))
    }

    /// Malformed JSON is an invalid document, while well-formed JSON whose root is neither an
    /// object with a `content` array, an array of blocks nor `null` has no content to render.
    pub fn from_slice(document_content: &[u8]) -> Result<Document, ContextError> {
        let value: Value = serde_json::from_slice(document_content).map_err(|error| {
            ContextError::with_error(
                ErrorKind::InvalidDocument,
                "The document is not valid JSON",
                &error,
            )
        })?;

        Document::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Document, ContextError> {
        let has_recognized_root = match &value {
            Value::Null | Value::Array(_) => true,
            Value::Object(root) => matches!(root.get("content"), Some(Value::Array(_))),
            _ => false,
        };
        if !has_recognized_root {
            return Err(ContextError::with_context(
                ErrorKind::NoContent,
                "The document root is neither an object with a `content` array nor an array of blocks",
            ));
        }

        // The root is recognized, so a failure here comes from one of the nodes
        serde_json::from_value(value).map_err(|error| {
            ContextError::with_error(
                ErrorKind::InvalidDocument,
                "The document contains a malformed node",
                &error,
            )
        })
    }

    /// The top-level nodes in document order, empty for a `null` root.
    pub fn blocks(&self) -> &[Node] {
        match self {
            Document::Wrapped { content } => content,
            Document::Bare(content) => content,
            Document::Null => &[],
        }
    }
}

/// A node of the document tree. Blocks, containers and text leaves share this shape.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Node {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<Mark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
}

impl Node {
    pub fn children(&self) -> &[Node] {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn marks(&self) -> &[Mark] {
        self.marks.as_deref().unwrap_or_default()
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attrs.as_ref().and_then(|attrs| attrs.get(name))
    }

    /// The level of a heading, clamped to `1..=6`. Missing or malformed levels count as 1.
    pub fn heading_level(&self) -> u8 {
        let level = match self.attribute("level") {
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(string)) => string.trim().parse::<u64>().ok(),
            _ => None,
        };
        level.unwrap_or(1).clamp(1, 6) as u8
    }
}

/// A formatting mark attached to a text leaf, such as `bold` or `textStyle`.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Mark {
    #[serde(rename = "type", default)]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
}

impl Mark {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attrs.as_ref().and_then(|attrs| attrs.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_root_is_accepted() {
        let document = Document::from_value(json!({
            "type": "doc",
            "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "Hi" }] }]
        }))
        .unwrap();

        assert!(matches!(document, Document::Wrapped { .. }));
        assert_eq!(document.blocks().len(), 1);
        assert_eq!(document.blocks()[0].children()[0].text.as_deref(), Some("Hi"));
    }

    #[test]
    fn bare_array_root_is_accepted() {
        let document = Document::from_slice(br#"[{"type": "heading", "attrs": {"level": 2}}]"#).unwrap();

        assert!(matches!(document, Document::Bare(_)));
        assert_eq!(document.blocks()[0].heading_level(), 2);
    }

    #[test]
    fn null_root_has_no_blocks() {
        let document = Document::from_slice(b"null").unwrap();

        assert_eq!(document, Document::Null);
        assert!(document.blocks().is_empty());
    }

    #[test]
    fn unrecognized_root_has_no_content() {
        for value in [
            json!({ "type": "doc" }),
            json!({}),
            json!({ "content": "text" }),
            json!(42),
            json!("text"),
        ] {
            let error = Document::from_value(value.clone()).unwrap_err();
            assert_eq!(error.kind, ErrorKind::NoContent, "for {value}");
        }
    }

    #[test]
    fn malformed_json_is_an_invalid_document() {
        let error = Document::from_slice(br#"{"content": ["#).unwrap_err();

        assert_eq!(error.kind, ErrorKind::InvalidDocument);
    }

    #[test]
    fn malformed_node_is_an_invalid_document() {
        let error = Document::from_value(json!({ "content": [42] })).unwrap_err();

        assert_eq!(error.kind, ErrorKind::InvalidDocument);
    }

    #[test]
    fn null_marks_and_attributes_are_tolerated() {
        let document = Document::from_value(json!([{
            "type": "paragraph",
            "attrs": null,
            "content": [{ "type": "text", "text": "x", "marks": null }]
        }]))
        .unwrap();

        let paragraph = &document.blocks()[0];
        assert!(paragraph.children()[0].marks().is_empty());
        assert_eq!(paragraph.heading_level(), 1);
    }

    #[test]
    fn heading_level_is_clamped() {
        let heading: Node = serde_json::from_value(json!({
            "type": "heading",
            "attrs": { "level": "9" }
        }))
        .unwrap();

        assert_eq!(heading.heading_level(), 6);
    }
}
