use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};
use crate::fonts::FontStyle;

/// The layout constants shared with the live editor. Every consumer has to inject the same
/// values, otherwise the page boundaries of the rendered document drift away from the ones
/// the end user has already seen. All lengths are expressed in millimeters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationBudget {
    /// Bumped whenever one of the values changes, so both sides can detect a mismatch.
    pub version: u32,
    pub page_width: f32,
    pub page_height: f32,
    /// Inset from every edge of the page.
    pub margin: f32,
    pub line_height: f32,
    pub characters_per_line: usize,
    pub lines_per_page: usize,
}

impl Default for PaginationBudget {
    fn default() -> Self {
        PaginationBudget {
            version: 1,
            page_width: 210.0,
            page_height: 297.0,
            margin: 20.0,
            line_height: 7.0,
            characters_per_line: 90,
            lines_per_page: 36,
        }
    }
}

impl PaginationBudget {
    /// The vertical space between the top and the bottom margin.
    pub fn usable_page_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    /// The horizontal space between the left and the right margin.
    pub fn usable_page_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    /// Rejects budgets which cannot produce a page at all.
    pub fn validate(&self) -> Result<(), ContextError> {
        let lengths = [
            ("page width", self.page_width),
            ("page height", self.page_height),
            ("line height", self.line_height),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value <= 0.0 {
                return Err(ContextError::with_context(
                    ErrorKind::Configuration,
                    format!("The {name} of the pagination budget must be positive, found {value}"),
                ));
            }
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                format!("The margin must not be negative, found {}", self.margin),
            ));
        }
        if self.usable_page_height() <= 0.0 || self.usable_page_width() <= 0.0 {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                format!(
                    "A margin of {}mm leaves no usable area on a {}x{}mm page",
                    self.margin, self.page_width, self.page_height
                ),
            ));
        }
        if self.characters_per_line == 0 || self.lines_per_page == 0 {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                "Both the characters per line and the lines per page must be at least one",
            ));
        }

        let budgeted_height = self.lines_per_page as f32 * self.line_height;
        if budgeted_height > self.usable_page_height() {
            log::warn!(
                "{} lines of {}mm need {}mm but only {}mm are usable, text will run into the bottom margin",
                self.lines_per_page,
                self.line_height,
                budgeted_height,
                self.usable_page_height()
            );
        }

        Ok(())
    }
}

/// The look of the "Page X of N" footer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FooterStyle {
    pub font_size: f32,
    pub color: [f32; 3],
}

impl Default for FooterStyle {
    fn default() -> Self {
        FooterStyle {
            font_size: 8.0,
            color: [0.5, 0.5, 0.5],
        }
    }
}

/// Associates a TTF file to a font family and style.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FontAssociation {
    pub font_family: String,
    #[serde(default)]
    pub font_style: FontStyle,
    pub font_file_path: PathBuf,
}

/// Everything a render call needs besides the document itself.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RendererConfiguration {
    pub budget: PaginationBudget,
    /// The family used for every segment without Arabic characters.
    pub default_font_family: String,
    /// Families preferred for Arabic segments, in order of preference.
    pub arabic_font_families: Vec<String>,
    pub font_associations: Vec<FontAssociation>,
    pub footer: FooterStyle,
    /// Horizontal space left after each run placed on a shared line, in millimeters.
    pub segment_gap: f32,
    /// Drawn instead of text that no font is able to render.
    pub placeholder: String,
    /// Compress the streams of the produced PDF.
    pub compress: bool,
}

impl Default for RendererConfiguration {
    fn default() -> Self {
        RendererConfiguration {
            budget: PaginationBudget::default(),
            default_font_family: "helvetica".into(),
            arabic_font_families: vec![
                "Amiri".into(),
                "NotoNaskhArabic".into(),
                "NotoSansArabic".into(),
            ],
            font_associations: Vec::new(),
            footer: FooterStyle::default(),
            segment_gap: 1.0,
            placeholder: "[unsupported text]".into(),
            compress: false,
        }
    }
}

impl RendererConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Io,
                    format!(
                        "Failed to read the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        let configuration: RendererConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Configuration,
                    format!(
                        "Failed to parse the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        configuration.validate()?;

        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        self.budget.validate()?;
        if self.default_font_family.trim().is_empty() {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                "The default font family must not be empty",
            ));
        }
        if !self.footer.font_size.is_finite() || self.footer.font_size <= 0.0 {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                format!(
                    "The footer font size must be positive, found {}",
                    self.footer.font_size
                ),
            ));
        }

        Ok(())
    }
}
