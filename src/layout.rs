//! Decides where every line of the document lands. Line and page breaks are computed from
//! character counts and line counts only, the same way the live editor estimates them, so
//! the rendered pages break exactly where the editor showed them to break.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

use crate::configuration::RendererConfiguration;
use crate::content::FormattedBlock;
use crate::error::{ContextError, ErrorKind};
use crate::fonts::{choose_family, contains_arabic, FontKey, FontRegistry, FontStyle, ResolvedFont};
use crate::shaping::TextShaper;

/// Where a drawn piece of text comes from in the document.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentOrigin {
    pub block_index: usize,
    pub segment_index: usize,
}

/// A piece of text placed on a page. Positions are in millimeters from the top-left corner
/// of the page and `y` is the baseline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawInstruction {
    /// 1-based page number.
    pub page: usize,
    pub text: String,
    pub font: FontKey,
    pub font_size: f32,
    pub color: [f32; 3],
    pub x: f32,
    pub y: f32,
    /// `None` for text which is not part of the document, such as the footers.
    pub origin: Option<SegmentOrigin>,
}

/// The page-tagged output of a layout pass.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawBuffer {
    pub page_count: usize,
    pub instructions: Vec<DrawInstruction>,
}

impl DrawBuffer {
    pub fn page_instructions(&self, page: usize) -> impl Iterator<Item = &DrawInstruction> {
        self.instructions
            .iter()
            .filter(move |instruction| instruction.page == page)
    }

    /// The page numbers referenced by at least one instruction.
    pub fn referenced_pages(&self) -> BTreeSet<usize> {
        self.instructions
            .iter()
            .map(|instruction| instruction.page)
            .collect()
    }
}

/// The result of laying out a document.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub draw_buffer: DrawBuffer,
    /// Number of text lines on each page, the first entry being page 1.
    pub page_line_counts: Vec<usize>,
    /// Lines placed on the final page past its budget because the target page count was reached.
    pub overflowed_lines: usize,
}

/// Splits a text into lines of at most `characters_per_line` characters. A text within the
/// budget is kept as a single line; a longer one is wrapped greedily at whitespace, and
/// words longer than the budget are cut at the budget boundary.
pub fn split_into_lines(text: &str, characters_per_line: usize) -> Vec<String> {
    let characters_per_line = characters_per_line.max(1);
    if text.chars().count() <= characters_per_line {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_length = 0;

    for word in text.split_whitespace() {
        let word_length = word.chars().count();

        if word_length > characters_per_line {
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            let characters = word.chars().collect::<Vec<_>>();
            let mut pieces = characters
                .chunks(characters_per_line)
                .map(|piece| piece.iter().collect::<String>())
                .collect::<Vec<_>>();
            // The tail of the word may still share its line with the following words
            current_line = pieces.pop().unwrap_or_default();
            current_length = current_line.chars().count();
            lines.extend(pieces);
            continue;
        }

        if current_line.is_empty() {
            current_line.push_str(word);
            current_length = word_length;
        } else if current_length + 1 + word_length <= characters_per_line {
            current_line.push(' ');
            current_line.push_str(word);
            current_length += 1 + word_length;
        } else {
            lines.push(std::mem::replace(&mut current_line, word.to_string()));
            current_length = word_length;
        }
    }

    if !current_line.is_empty() || lines.is_empty() {
        lines.push(current_line);
    }
    lines
}

/// The transient position of a layout pass. Every pass owns its own cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCursor {
    /// 1-based page number.
    pub page: usize,
    pub y: f32,
    pub x: f32,
    /// Text lines started on the current page.
    pub line_count: usize,
    /// Whether the current line already holds text, so the next run continues it.
    line_open: bool,
}

impl RenderCursor {
    pub fn new(margin: f32) -> Self {
        RenderCursor {
            page: 1,
            y: margin,
            x: margin,
            line_count: 0,
            line_open: false,
        }
    }
}

/// Lays out formatted blocks onto pages. The engine only borrows read-only state, so one
/// engine can serve any number of independent layout passes.
pub struct LayoutEngine<'a> {
    configuration: &'a RendererConfiguration,
    fonts: &'a FontRegistry,
    shaper: &'a dyn TextShaper,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        configuration: &'a RendererConfiguration,
        fonts: &'a FontRegistry,
        shaper: &'a dyn TextShaper,
    ) -> Self {
        LayoutEngine {
            configuration,
            fonts,
            shaper,
        }
    }

    /// Lays out the blocks in order. With a target page count, content is spread so that the
    /// page count tracks the target, and no page is ever added past it.
    pub fn lay_out(
        &self,
        blocks: &[FormattedBlock],
        target_page_count: Option<NonZeroUsize>,
    ) -> Result<LayoutResult, ContextError> {
        let default_font = self
            .fonts
            .resolve(&self.configuration.default_font_family, FontStyle::Normal)
            .ok_or_else(|| {
                ContextError::with_context(
                    ErrorKind::Configuration,
                    format!(
                        "Unable to find the default font family {:?}",
                        self.configuration.default_font_family
                    ),
                )
            })?;

        let budget = &self.configuration.budget;
        // Blocks spread evenly over the target pages, but never more lines than a page holds
        let lines_before_target = target_page_count.map(|target_page_count| {
            blocks
                .len()
                .div_ceil(target_page_count.get())
                .clamp(1, budget.lines_per_page.max(1))
        });
        if let (Some(target_page_count), Some(lines_before_target)) =
            (target_page_count, lines_before_target)
        {
            log::debug!(
                "Spreading {} blocks over {} pages with {} lines on each page before the last",
                blocks.len(),
                target_page_count,
                lines_before_target
            );
        }

        let mut pass = LayoutPass {
            engine: self,
            default_font,
            cursor: RenderCursor::new(budget.margin),
            target_page_count: target_page_count.map(NonZeroUsize::get),
            lines_before_target,
            result: LayoutResult {
                draw_buffer: DrawBuffer {
                    page_count: 1,
                    instructions: Vec::new(),
                },
                page_line_counts: vec![0],
                overflowed_lines: 0,
            },
        };

        for (block_index, block) in blocks.iter().enumerate() {
            pass.lay_out_block(block_index, block);
        }

        let mut result = pass.result;
        compress_overflowing_pages(&mut result.draw_buffer, self.configuration);

        log::debug!(
            "Laid out {} blocks onto {} pages ({} lines)",
            blocks.len(),
            result.draw_buffer.page_count,
            result.page_line_counts.iter().sum::<usize>()
        );
        Ok(result)
    }

    /// Finds a font able to draw the text: the chosen family first, then the fallback chain,
    /// then the same again on a normalized copy of the text. Text that no font can draw is
    /// replaced by the placeholder.
    fn resolve_drawable(
        &self,
        text: &str,
        family: &str,
        style: FontStyle,
        default_font: &ResolvedFont,
    ) -> (String, ResolvedFont) {
        if text.is_empty() {
            let font = self
                .fonts
                .resolve(family, style)
                .unwrap_or_else(|| default_font.clone());
            return (String::new(), font);
        }

        // Shaping is applied once the line is known, so it never moves a line or page break
        let shaped_text = self.shaper.shape(text, contains_arabic(text));
        let shaped: &str = &shaped_text;

        // The chosen family first, then the fallback chain without repeating it
        let mut families = vec![family.to_string()];
        for fallback in self.fonts.fallback_chain(
            &self.configuration.default_font_family,
            &self.configuration.arabic_font_families,
        ) {
            if !families
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(&fallback))
            {
                families.push(fallback);
            }
        }

        // Re-encodings of the text, tried in order: as written, with compatibility characters
        // (such as ligatures) decomposed, then with the accents removed
        let composed = shaped.nfkc().collect::<String>();
        let stripped = shaped
            .nfkd()
            .filter(|character| !is_combining_mark(*character))
            .collect::<String>();
        let mut encodings = vec![shaped];
        for encoding in [composed.as_str(), stripped.as_str()] {
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }

        // The first family able to draw the whole line wins, trying every family on one
        // encoding before moving on to the next encoding
        for (encoding_index, encoding) in encodings.iter().enumerate() {
            for (family_index, candidate) in families.iter().enumerate() {
                let Some(font) = self.fonts.resolve(candidate, style) else {
                    continue;
                };
                if !font.face.covers(encoding) {
                    continue;
                }
                if encoding_index > 0 {
                    log::warn!(
                        "Drawing {:?} as {:?} in {} because no font covers its original encoding",
                        text,
                        encoding,
                        font.key
                    );
                } else if family_index > 0 {
                    log::warn!(
                        "Falling back to {} for {:?} because {} cannot draw it",
                        font.key,
                        text,
                        family
                    );
                }
                return (encoding.to_string(), font);
            }
        }

        log::warn!(
            "No font can draw {:?}, substituting {:?}",
            text,
            self.configuration.placeholder
        );
        (self.configuration.placeholder.clone(), default_font.clone())
    }
}

/// The mutable state of one layout call.
struct LayoutPass<'e, 'a> {
    engine: &'e LayoutEngine<'a>,
    default_font: ResolvedFont,
    cursor: RenderCursor,
    target_page_count: Option<usize>,
    lines_before_target: Option<usize>,
    result: LayoutResult,
}

impl LayoutPass<'_, '_> {
    fn lay_out_block(&mut self, block_index: usize, block: &FormattedBlock) {
        let configuration = self.engine.configuration;
        let line_height = configuration.budget.line_height;

        // A heading reserves room for itself and the line that follows it, so that it is
        // never left alone at the bottom of a page
        if block.is_heading && block_index > 0 {
            self.ensure_room(2);
            if self.cursor.line_count > 0 {
                self.cursor.y += line_height / 2.0;
            }
        }

        for (segment_index, segment) in block.segments.iter().enumerate() {
            let font_size = block.effective_font_size(segment);
            let style = FontStyle::from_flags(block.effective_bold(segment), segment.italic);
            let family = choose_family(
                &segment.text,
                &configuration.default_font_family,
                &configuration.arabic_font_families,
                |family| self.engine.fonts.has_family(family),
            );
            let origin = SegmentOrigin {
                block_index,
                segment_index,
            };

            // The first line continues whatever the previous segment of the block left open,
            // every following line starts a new one
            let lines = split_into_lines(&segment.text, configuration.budget.characters_per_line);
            for (line_index, line) in lines.iter().enumerate() {
                if line_index > 0 {
                    self.end_line();
                }
                let (text, font) =
                    self.engine
                        .resolve_drawable(line, family, style, &self.default_font);
                self.place(text, font, font_size, segment.color, origin);
            }
        }

        if block.is_new_line {
            self.end_line();
        }
        // Half a line of spacing after the heading, not counted against the budget
        if block.is_heading {
            self.cursor.y += line_height / 2.0;
        }
    }

    /// Lines the current page may hold before the pass moves on to the next page.
    fn lines_allowed(&self) -> usize {
        let nominal = self.engine.configuration.budget.lines_per_page;
        match (self.target_page_count, self.lines_before_target) {
            (Some(target_page_count), Some(lines_before_target))
                if self.cursor.page < target_page_count =>
            {
                lines_before_target
            }
            _ => nominal,
        }
    }

    fn target_reached(&self) -> bool {
        self.target_page_count
            .is_some_and(|target_page_count| self.cursor.page >= target_page_count)
    }

    /// Moves to a new page unless `needed_lines` more lines still fit on the current one.
    /// Returns whether the lines overflow a page that cannot be left.
    fn ensure_room(&mut self, needed_lines: usize) -> bool {
        let fits = self.cursor.line_count + needed_lines <= self.lines_allowed();
        // An empty page is never left behind, whatever the budget says
        if fits || self.cursor.line_count == 0 {
            return !fits;
        }
        if self.target_reached() {
            return true;
        }

        let margin = self.engine.configuration.budget.margin;
        self.cursor.page += 1;
        self.cursor.y = margin;
        self.cursor.x = margin;
        self.cursor.line_count = 0;
        self.result.draw_buffer.page_count = self.cursor.page;
        self.result.page_line_counts.push(0);
        log::trace!("Advanced to page {}", self.cursor.page);
        false
    }

    fn place(
        &mut self,
        text: String,
        font: ResolvedFont,
        font_size: f32,
        color: [f32; 3],
        origin: SegmentOrigin,
    ) {
        if !self.cursor.line_open {
            let overflows = self.ensure_room(1);
            if overflows && self.target_reached() {
                self.result.overflowed_lines += 1;
            }
            self.cursor.line_open = true;
            self.cursor.line_count += 1;
            self.cursor.x = self.engine.configuration.budget.margin;
            if let Some(line_count) = self.result.page_line_counts.last_mut() {
                *line_count = self.cursor.line_count;
            }
        }

        if text.is_empty() {
            return;
        }
        let width = font.face.text_width(&text, font_size);
        self.result.draw_buffer.instructions.push(DrawInstruction {
            page: self.cursor.page,
            text,
            font: font.key,
            font_size,
            color,
            x: self.cursor.x,
            y: self.cursor.y,
            origin: Some(origin),
        });
        self.cursor.x += width + self.engine.configuration.segment_gap;
    }

    fn end_line(&mut self) {
        if self.cursor.line_open {
            self.cursor.y += self.engine.configuration.budget.line_height;
            self.cursor.x = self.engine.configuration.budget.margin;
            self.cursor.line_open = false;
        }
    }
}

/// Squeezes the lines of every page whose text ran past the bottom margin back between the
/// margins. This happens to the final page once the target page count was reached, and to any
/// page whose headings added more spacing than the line budget accounts for.
fn compress_overflowing_pages(draw_buffer: &mut DrawBuffer, configuration: &RendererConfiguration) {
    let budget = &configuration.budget;
    let bottom = budget.page_height - budget.margin;

    for page in 1..=draw_buffer.page_count {
        let lowest_baseline = draw_buffer
            .page_instructions(page)
            .map(|instruction| instruction.y)
            .fold(f32::NEG_INFINITY, f32::max);
        if lowest_baseline <= bottom {
            continue;
        }

        // Baselines keep their order, only the spacing between them shrinks
        let factor = (bottom - budget.margin) / (lowest_baseline - budget.margin);
        log::warn!(
            "Compressing the lines of page {} by a factor of {:.3} to keep them on the page",
            page,
            factor
        );
        for instruction in draw_buffer
            .instructions
            .iter_mut()
            .filter(|instruction| instruction.page == page)
        {
            instruction.y = budget.margin + (instruction.y - budget.margin) * factor;
        }
    }
}
