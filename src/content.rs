//! Flattens the document tree into the ordered blocks the layout engine consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Mark, Node};

/// Font size of a run which carries no size of its own, in points.
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

/// A contiguous run of text sharing one resolved style.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub font_size: f32,
    pub color: [f32; 3],
}

impl TextSegment {
    pub fn plain<S: Into<String>>(text: S) -> Self {
        TextSegment {
            text: text.into(),
            bold: false,
            italic: false,
            font_size: DEFAULT_FONT_SIZE,
            color: [0.0, 0.0, 0.0],
        }
    }
}

/// One paragraph or heading of the document, ready to be laid out.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormattedBlock {
    pub segments: Vec<TextSegment>,
    /// Forces a line break once the block has been laid out.
    pub is_new_line: bool,
    pub is_heading: bool,
    pub heading_level: Option<u8>,
}

impl FormattedBlock {
    /// The size a segment of this block is drawn at. Headings never go below the size
    /// implied by their level.
    pub fn effective_font_size(&self, segment: &TextSegment) -> f32 {
        match self.heading_level {
            Some(level) if self.is_heading => {
                let heading_size = 14.0 + f32::from(6 - level.min(6)) * 2.0;
                segment.font_size.max(heading_size)
            }
            _ => segment.font_size,
        }
    }

    /// Headings are always drawn in bold.
    pub fn effective_bold(&self, segment: &TextSegment) -> bool {
        segment.bold || self.is_heading
    }
}

/// Collects the paragraphs and headings of the document in rendering order. Nodes of other
/// types are not rendered themselves, but their children are still visited so that text
/// nested in lists, tables or quotes is not lost.
///
/// A `null` document yields no blocks; the renderer treats that as a failure.
pub fn extract_content(document: &Document) -> Vec<FormattedBlock> {
    let mut blocks = Vec::new();
    for node in document.blocks() {
        collect_blocks(node, &mut blocks);
    }

    log::debug!("Extracted {} blocks from the document", blocks.len());
    blocks
}

fn collect_blocks(node: &Node, blocks: &mut Vec<FormattedBlock>) {
    match node.node_type.as_str() {
        "paragraph" => blocks.push(build_block(node, None)),
        "heading" => blocks.push(build_block(node, Some(node.heading_level()))),
        "text" => log::debug!("Skipping a text node found outside of any paragraph or heading"),
        other => {
            if node.content.is_some() {
                log::trace!("Descending into the children of the {:?} node", other);
                for child in node.children() {
                    collect_blocks(child, blocks);
                }
            }
        }
    }
}

fn build_block(node: &Node, heading_level: Option<u8>) -> FormattedBlock {
    let mut segments = Vec::new();
    collect_segments(node, &mut segments);
    if segments.is_empty() {
        // Empty blocks still take up one line in the editor
        segments.push(TextSegment::plain(""));
    }

    FormattedBlock {
        segments,
        is_new_line: true,
        is_heading: heading_level.is_some(),
        heading_level,
    }
}

fn collect_segments(node: &Node, segments: &mut Vec<TextSegment>) {
    for child in node.children() {
        if child.node_type == "text" {
            let text = child.text.as_deref().unwrap_or_default();
            segments.push(resolve_segment(text, child.marks()));
        } else {
            collect_segments(child, segments);
        }
    }
}

/// Applies the marks in the order they appear. Marks of one kind overwrite each other,
/// marks of different kinds never interfere.
fn resolve_segment(text: &str, marks: &[Mark]) -> TextSegment {
    let text = text
        .chars()
        .map(|character| if character.is_control() { ' ' } else { character })
        .collect::<String>();
    let mut segment = TextSegment::plain(text);

    for mark in marks {
        match mark.mark_type.as_str() {
            "bold" | "strong" => segment.bold = true,
            "italic" | "em" => segment.italic = true,
            "textStyle" => {
                if let Some(font_size) = mark.attribute("fontSize").and_then(parse_font_size) {
                    segment.font_size = font_size;
                }
                if let Some(color) = mark.attribute("color").and_then(parse_color) {
                    segment.color = color;
                }
            }
            _ => (),
        }
    }

    segment
}

/// Reads sizes such as `16`, `"16px"`, `"16pt"` or `"1.5em"`.
fn parse_font_size(value: &Value) -> Option<f32> {
    let size = match value {
        Value::Number(number) => number.as_f64().map(|size| size as f32),
        Value::String(string) => {
            let string = string.trim();
            let (number, multiplier) = if let Some(number) = string.strip_suffix("rem") {
                (number, DEFAULT_FONT_SIZE)
            } else if let Some(number) = string.strip_suffix("em") {
                (number, DEFAULT_FONT_SIZE)
            } else {
                let number = string
                    .strip_suffix("px")
                    .or_else(|| string.strip_suffix("pt"))
                    .unwrap_or(string);
                (number, 1.0)
            };
            number
                .trim()
                .parse::<f32>()
                .ok()
                .map(|size| size * multiplier)
        }
        _ => None,
    };

    let size = size.filter(|size| size.is_finite() && *size > 0.0);
    if size.is_none() {
        log::debug!("Ignoring the unreadable font size {}", value);
    }
    size
}

/// Reads colors such as `"#1a2b3c"`, `"#abc"` or `"rgb(10, 20, 30)"` into RGB fractions.
fn parse_color(value: &Value) -> Option<[f32; 3]> {
    let string = value.as_str()?.trim();

    let channels = if let Some(hexadecimal) = string.strip_prefix('#') {
        let digits: String = match hexadecimal.len() {
            3 => hexadecimal.chars().flat_map(|digit| [digit, digit]).collect(),
            6 => hexadecimal.to_string(),
            _ => return None,
        };
        let mut channels = [0u8; 3];
        for (index, channel) in channels.iter_mut().enumerate() {
            *channel = u8::from_str_radix(digits.get(index * 2..index * 2 + 2)?, 16).ok()?;
        }
        channels
    } else {
        let arguments = string
            .strip_prefix("rgba(")
            .or_else(|| string.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        let mut channels = [0u8; 3];
        let mut arguments = arguments.split(',');
        for channel in channels.iter_mut() {
            let component = arguments.next()?.trim().parse::<f32>().ok()?;
            *channel = component.clamp(0.0, 255.0).round() as u8;
        }
        channels
    };

    Some(channels.map(|channel| f32::from(channel) / 255.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(value: Value) -> Vec<FormattedBlock> {
        extract_content(&Document::from_value(value).unwrap())
    }

    #[test]
    fn paragraphs_and_headings_keep_document_order() {
        let blocks = extract(json!({
            "type": "doc",
            "content": [
                { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Title" }] },
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "Hello " },
                    { "type": "text", "text": "world", "marks": [{ "type": "bold" }] }
                ]}
            ]
        }));

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_heading);
        assert_eq!(blocks[0].heading_level, Some(2));
        assert!(!blocks[1].is_heading);
        assert!(blocks.iter().all(|block| block.is_new_line));
        assert_eq!(blocks[1].segments.len(), 2);
        assert!(!blocks[1].segments[0].bold);
        assert!(blocks[1].segments[1].bold);
    }

    #[test]
    fn empty_paragraph_yields_one_empty_segment() {
        let blocks = extract(json!([{ "type": "paragraph" }]));

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].segments, vec![TextSegment::plain("")]);
    }

    #[test]
    fn null_document_yields_nothing() {
        assert!(extract(Value::Null).is_empty());
    }

    #[test]
    fn nested_containers_are_traversed() {
        let blocks = extract(json!([{
            "type": "bulletList",
            "content": [{
                "type": "listItem",
                "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "item" }] }]
            }]
        }, {
            "type": "image",
            "attrs": { "src": "data:image/png;base64," }
        }]));

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].segments[0].text, "item");
    }

    #[test]
    fn same_kind_marks_use_the_last_value() {
        let blocks = extract(json!([{
            "type": "paragraph",
            "content": [{
                "type": "text",
                "text": "sized",
                "marks": [
                    { "type": "textStyle", "attrs": { "fontSize": "18px", "color": "#ff0000" } },
                    { "type": "italic" },
                    { "type": "textStyle", "attrs": { "fontSize": "10pt" } }
                ]
            }]
        }]));

        let segment = &blocks[0].segments[0];
        assert_eq!(segment.font_size, 10.0);
        assert_eq!(segment.color, [1.0, 0.0, 0.0]);
        assert!(segment.italic);
        assert!(!segment.bold);
    }

    #[test]
    fn unreadable_mark_values_keep_the_defaults() {
        let blocks = extract(json!([{
            "type": "paragraph",
            "content": [{
                "type": "text",
                "text": "x",
                "marks": [
                    { "type": "textStyle", "attrs": { "fontSize": "large", "color": "teal" } },
                    { "type": "underline" }
                ]
            }]
        }]));

        assert_eq!(blocks[0].segments[0], TextSegment::plain("x"));
    }

    #[test]
    fn control_characters_become_spaces() {
        let blocks = extract(json!([{
            "type": "paragraph",
            "content": [{ "type": "text", "text": "a\tb\nc" }]
        }]));

        assert_eq!(blocks[0].segments[0].text, "a b c");
    }

    #[test]
    fn colors_are_parsed_in_every_supported_notation() {
        assert_eq!(parse_color(&json!("#fff")), Some([1.0, 1.0, 1.0]));
        assert_eq!(parse_color(&json!("rgb(0, 0, 255)")), Some([0.0, 0.0, 1.0]));
        assert_eq!(parse_color(&json!("rgba(255, 0, 0, 0.5)")), Some([1.0, 0.0, 0.0]));
        assert_eq!(parse_color(&json!("#12345")), None);
    }

    #[test]
    fn heading_size_is_boosted_by_level() {
        let block = FormattedBlock {
            segments: vec![TextSegment::plain("Title")],
            is_new_line: true,
            is_heading: true,
            heading_level: Some(1),
        };
        let large = TextSegment {
            font_size: 30.0,
            ..TextSegment::plain("Big")
        };

        assert_eq!(block.effective_font_size(&block.segments[0]), 24.0);
        assert_eq!(block.effective_font_size(&large), 30.0);
        assert!(block.effective_bold(&block.segments[0]));
    }
}
