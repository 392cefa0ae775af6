use crate::configuration::RendererConfiguration;
use crate::error::{ContextError, ErrorKind};
use crate::fonts::{FontRegistry, FontStyle};
use crate::layout::{DrawBuffer, DrawInstruction};

/// Stamps every page of the buffer with a right-aligned "Page X of N" footer, N being the
/// number of pages the layout produced. This is the last change made to the buffer before it
/// is turned into a PDF.
pub fn stamp_page_footers(
    draw_buffer: &mut DrawBuffer,
    configuration: &RendererConfiguration,
    fonts: &FontRegistry,
) -> Result<(), ContextError> {
    let footer_font = fonts
        .resolve(&configuration.default_font_family, FontStyle::Normal)
        .ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Configuration,
                format!(
                    "Unable to find the font family {:?} for the page footers",
                    configuration.default_font_family
                ),
            )
        })?;

    let budget = &configuration.budget;
    let page_count = draw_buffer.page_count;
    // Halfway into the bottom margin
    let baseline = budget.page_height - budget.margin / 2.0;

    for page in 1..=page_count {
        let text = format!("Page {page} of {page_count}");
        let width = footer_font
            .face
            .text_width(&text, configuration.footer.font_size);
        draw_buffer.instructions.push(DrawInstruction {
            page,
            text,
            font: footer_font.key.clone(),
            font_size: configuration.footer.font_size,
            color: configuration.footer.color,
            x: budget.page_width - budget.margin - width,
            y: baseline,
            origin: None,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_page_gets_a_footer() {
        let configuration = RendererConfiguration::default();
        let fonts = FontRegistry::with_standard_families();
        let mut draw_buffer = DrawBuffer {
            page_count: 3,
            instructions: Vec::new(),
        };

        stamp_page_footers(&mut draw_buffer, &configuration, &fonts).unwrap();

        let footers = draw_buffer
            .instructions
            .iter()
            .map(|instruction| (instruction.page, instruction.text.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            footers,
            vec![(1, "Page 1 of 3"), (2, "Page 2 of 3"), (3, "Page 3 of 3")]
        );
        assert_eq!(draw_buffer.referenced_pages().len(), 3);
    }

    #[test]
    fn footer_is_right_aligned_in_the_bottom_margin() {
        let configuration = RendererConfiguration::default();
        let fonts = FontRegistry::with_standard_families();
        let mut draw_buffer = DrawBuffer {
            page_count: 1,
            instructions: Vec::new(),
        };

        stamp_page_footers(&mut draw_buffer, &configuration, &fonts).unwrap();

        let footer = &draw_buffer.instructions[0];
        let width = fonts
            .resolve("helvetica", FontStyle::Normal)
            .unwrap()
            .face
            .text_width(&footer.text, 8.0);
        assert!((footer.x + width - 190.0).abs() < 1e-3);
        assert_eq!(footer.y, 287.0);
        assert_eq!(footer.font_size, 8.0);
        assert_eq!(footer.color, [0.5, 0.5, 0.5]);
        assert!(footer.origin.is_none());
    }
}
