use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use xxhash_rust::xxh3::xxh3_64;

use crate::configuration::RendererConfiguration;
use crate::content::extract_content;
use crate::document::Document;
use crate::error::{ContextError, ErrorKind};
use crate::finalizer::stamp_page_footers;
use crate::fonts::FontRegistry;
use crate::layout::{DrawBuffer, LayoutEngine, LayoutResult};
use crate::pdf::{DocumentInfo, PdfDocument};
use crate::shaping::{NoopShaper, TextShaper};

/// Per-call settings of the produced PDF.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Spread the content so that the page count tracks this value.
    pub target_page_count: Option<NonZeroUsize>,
    pub title: String,
    /// Derived from the laid out content when missing.
    pub identifier: Option<String>,
    pub creation_date: OffsetDateTime,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            target_page_count: None,
            title: "Untitled".into(),
            identifier: None,
            creation_date: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// The finished PDF along with what the layout decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub overflowed_lines: usize,
    pub draw_buffer: DrawBuffer,
}

/// Renders documents with one configuration. The fonts are loaded once when the renderer is
/// built and only read afterwards, so the renderer can be shared between threads and every
/// render call is independent from the others.
pub struct Renderer {
    configuration: RendererConfiguration,
    fonts: FontRegistry,
    shaper: Box<dyn TextShaper>,
}

impl Renderer {
    /// Validates the configuration and loads every font it associates.
    pub fn new(configuration: RendererConfiguration) -> Result<Self, ContextError> {
        configuration.validate()?;
        let fonts = FontRegistry::from_configuration(&configuration)?;

        Ok(Renderer {
            configuration,
            fonts,
            shaper: Box::new(NoopShaper),
        })
    }

    /// Replaces the shaper applied to every line before it is drawn.
    pub fn with_shaper(mut self, shaper: impl TextShaper + 'static) -> Self {
        self.shaper = Box::new(shaper);
        self
    }

    pub fn configuration(&self) -> &RendererConfiguration {
        &self.configuration
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    /// Lays the document out and stamps the page footers, without producing a PDF.
    pub fn lay_out(
        &self,
        document: &Document,
        target_page_count: Option<NonZeroUsize>,
    ) -> Result<LayoutResult, ContextError> {
        let blocks = extract_content(document);
        if blocks.is_empty() {
            return Err(ContextError::with_context(
                ErrorKind::NoContent,
                "The document contains no paragraph or heading to render",
            ));
        }

        let layout_engine = LayoutEngine::new(&self.configuration, &self.fonts, self.shaper.as_ref());
        let mut layout_result = layout_engine.lay_out(&blocks, target_page_count)?;
        stamp_page_footers(&mut layout_result.draw_buffer, &self.configuration, &self.fonts)?;

        Ok(layout_result)
    }

    /// Renders the document into the bytes of a PDF.
    pub fn render(
        &self,
        document: &Document,
        options: &RenderOptions,
    ) -> Result<RenderedDocument, ContextError> {
        let layout_result = self.lay_out(document, options.target_page_count)?;
        let draw_buffer = layout_result.draw_buffer;

        if layout_result.overflowed_lines > 0 {
            log::warn!(
                "The target of {} pages was reached, {} lines were placed past the budget of the final page",
                draw_buffer.page_count,
                layout_result.overflowed_lines
            );
        }

        let identifier = match &options.identifier {
            Some(identifier) => identifier.clone(),
            None => content_identifier(&draw_buffer)?,
        };
        let bytes = self.emit(&draw_buffer, &identifier, options)?;
        log::info!(
            "Rendered {} pages ({} bytes) for the document {}",
            draw_buffer.page_count,
            bytes.len(),
            identifier
        );

        Ok(RenderedDocument {
            bytes,
            page_count: draw_buffer.page_count,
            overflowed_lines: layout_result.overflowed_lines,
            draw_buffer,
        })
    }

    fn emit(
        &self,
        draw_buffer: &DrawBuffer,
        identifier: &str,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, ContextError> {
        let budget = &self.configuration.budget;
        let mut pdf_document = PdfDocument::new(identifier.to_string());
        for _ in 0..draw_buffer.page_count {
            pdf_document.add_page(budget.page_width, budget.page_height);
        }

        for instruction in &draw_buffer.instructions {
            let face = self.fonts.face(&instruction.font).ok_or_else(|| {
                ContextError::with_context(
                    ErrorKind::Emission,
                    format!("The font {} is not registered", instruction.font),
                )
            })?;
            pdf_document.add_font(&instruction.font, face);

            pdf_document
                .write_text_to_page(
                    instruction.page - 1,
                    instruction.color,
                    &instruction.text,
                    &instruction.font,
                    instruction.font_size,
                    [instruction.x, instruction.y],
                )
                .map_err(|error| match instruction.origin {
                    Some(origin) => error.within(format!(
                        "Failed to draw segment {} of block {} on page {}",
                        origin.segment_index, origin.block_index, instruction.page
                    )),
                    None => error.within(format!(
                        "Failed to draw the footer of page {}",
                        instruction.page
                    )),
                })?;
        }

        let info = DocumentInfo {
            title: options.title.clone(),
            creation_date: options.creation_date,
            ..DocumentInfo::default()
        };
        pdf_document.write_all(identifier, &info)?;
        if self.configuration.compress {
            pdf_document.optimize();
        }

        pdf_document.save_to_bytes()
    }
}

/// A stable identifier of the laid out content: the XXH3 hash of the serialized draw buffer.
fn content_identifier(draw_buffer: &DrawBuffer) -> Result<String, ContextError> {
    let serialized_draw_buffer = serde_json::to_vec(draw_buffer).map_err(|error| {
        ContextError::with_error(
            ErrorKind::Emission,
            "Failed to serialize the draw buffer for its identifier",
            &error,
        )
    })?;

    Ok(format!("{:016x}", xxh3_64(&serialized_draw_buffer)))
}
