use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use owned_ttf_parser::{AsFaceRef as _, Face, OwnedFace};
use serde::{Deserialize, Serialize};

use crate::configuration::RendererConfiguration;
use crate::error::{ContextError, ErrorKind};

/// Number of points in a millimeter.
pub const POINTS_PER_MILLIMETER: f32 = 2.834646;

/// The style variant of a font family.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Bold,
    Italic,
    #[serde(rename = "bolditalic")]
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> FontStyle {
        match (bold, italic) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Normal,
        }
    }
}

/// Whether the character belongs to one of the Arabic script blocks, presentation forms included.
pub fn is_arabic(character: char) -> bool {
    matches!(
        character as u32,
        0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF
    )
}

pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(is_arabic)
}

/// Picks the family a segment is drawn with. Segments without Arabic characters always get the
/// default family; Arabic segments get the first preferred family which is available, and the
/// default one only when none of them is.
pub fn choose_family<'a>(
    text: &str,
    default_family: &'a str,
    arabic_families: &'a [String],
    is_available: impl Fn(&str) -> bool,
) -> &'a str {
    if !contains_arabic(text) {
        return default_family;
    }

    arabic_families
        .iter()
        .map(String::as_str)
        .find(|family| is_available(*family))
        .unwrap_or(default_family)
}

/// The standard PDF families, which every viewer can draw without embedding anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFamily {
    Helvetica,
    Times,
    Courier,
}

impl StandardFamily {
    const ALL: [StandardFamily; 3] = [
        StandardFamily::Helvetica,
        StandardFamily::Times,
        StandardFamily::Courier,
    ];

    pub fn family_name(&self) -> &'static str {
        match self {
            StandardFamily::Helvetica => "helvetica",
            StandardFamily::Times => "times",
            StandardFamily::Courier => "courier",
        }
    }

    /// The `BaseFont` name of the Type1 font for the given style.
    pub fn base_font(&self, style: FontStyle) -> &'static str {
        match (self, style) {
            (StandardFamily::Helvetica, FontStyle::Normal) => "Helvetica",
            (StandardFamily::Helvetica, FontStyle::Bold) => "Helvetica-Bold",
            (StandardFamily::Helvetica, FontStyle::Italic) => "Helvetica-Oblique",
            (StandardFamily::Helvetica, FontStyle::BoldItalic) => "Helvetica-BoldOblique",
            (StandardFamily::Times, FontStyle::Normal) => "Times-Roman",
            (StandardFamily::Times, FontStyle::Bold) => "Times-Bold",
            (StandardFamily::Times, FontStyle::Italic) => "Times-Italic",
            (StandardFamily::Times, FontStyle::BoldItalic) => "Times-BoldItalic",
            (StandardFamily::Courier, FontStyle::Normal) => "Courier",
            (StandardFamily::Courier, FontStyle::Bold) => "Courier-Bold",
            (StandardFamily::Courier, FontStyle::Italic) => "Courier-Oblique",
            (StandardFamily::Courier, FontStyle::BoldItalic) => "Courier-BoldOblique",
        }
    }

    /// Advance width of a WinAnsi byte in thousandths of an em. Proportional families share
    /// an approximate table, which is close enough for placing runs side by side.
    fn advance_1000(&self, byte: u8) -> f32 {
        match self {
            StandardFamily::Courier => 600.0,
            StandardFamily::Helvetica | StandardFamily::Times => match byte {
                32 => 278.0,
                33..=47 => 333.0,
                48..=57 => 556.0,
                58..=64 => 333.0,
                73 | 74 => 278.0,
                77 => 833.0,
                65..=90 => 667.0,
                91..=96 => 333.0,
                102 | 105 | 106 | 108 | 116 => 278.0,
                109 | 119 => 833.0,
                97..=122 => 556.0,
                _ => 556.0,
            },
        }
    }
}

/// Map a single Unicode character to its WinAnsi (Windows-1252) byte, if it has one.
pub fn char_to_winansi(character: char) -> Option<u8> {
    let byte = match character as u32 {
        0x0020..=0x007E => character as u8,
        0x00A0..=0x00FF => character as u8,
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// The (insofar) relevant vertical metrics of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct FontMetrics {
    pub ascent: i16,
    pub descent: i16,
    pub units_per_em: u16,
}

/// The (insofar) relevant metrics associated to a single glyph of a font.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlyphMetrics {
    pub width: u32,
    pub height: u32,
}

/// A font face loaded from a TTF font, together with its measure of units per em.
#[derive(Clone, Debug)]
pub struct TtfFontFace {
    inner: Arc<OwnedFace>,
    units_per_em: u16,
}

impl TtfFontFace {
    /// Constructs a font face from the underlying raw data extracted from the TTF font file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ContextError> {
        let face = OwnedFace::from_vec(data.to_vec(), 0).map_err(|error| {
            ContextError::with_error(ErrorKind::Configuration, "Failed to parse font", &error)
        })?;
        let units_per_em = face.as_face_ref().units_per_em();

        Ok(Self {
            inner: Arc::new(face),
            units_per_em,
        })
    }

    pub fn font_metrics(&self) -> FontMetrics {
        FontMetrics {
            ascent: self.face().ascender(),
            descent: self.face().descender(),
            units_per_em: self.units_per_em,
        }
    }

    pub fn glyph_id(&self, codepoint: char) -> Option<u16> {
        self.face()
            .glyph_index(codepoint)
            .map(|glyph_id| glyph_id.0)
            .filter(|glyph_id| *glyph_id > 0)
    }

    /// The mapping between every glyph with a Unicode codepoint and that codepoint.
    pub fn glyph_ids(&self) -> HashMap<u16, char> {
        let font_subtables = self.face().tables().cmap.map(|cmap| {
            cmap.subtables
                .into_iter()
                .filter(|font_subtable| font_subtable.is_unicode())
        });
        let Some(font_subtables) = font_subtables else {
            return HashMap::new();
        };

        let mut gid_to_codepoint_map =
            HashMap::with_capacity(self.face().number_of_glyphs().into());
        for font_subtable in font_subtables {
            font_subtable.codepoints(|codepoint| {
                if let Ok(character) = char::try_from(codepoint) {
                    if let Some(glyph_index) = font_subtable
                        .glyph_index(codepoint)
                        .filter(|index| index.0 > 0)
                    {
                        gid_to_codepoint_map
                            .entry(glyph_index.0)
                            .or_insert(character);
                    }
                }
            })
        }

        gid_to_codepoint_map
    }

    pub fn glyph_count(&self) -> u16 {
        self.face().number_of_glyphs()
    }

    pub fn glyph_metrics(&self, glyph_id: u16) -> Option<GlyphMetrics> {
        let glyph_id = owned_ttf_parser::GlyphId(glyph_id);
        let width = self.face().glyph_hor_advance(glyph_id)? as u32;
        // Glyphs without outline (such as the space) report the height of a full em
        let height = self
            .face()
            .glyph_bounding_box(glyph_id)
            .map(|bounding_box| {
                i32::from(bounding_box.y_max) - i32::from(bounding_box.y_min)
                    - i32::from(self.face().descender())
            })
            .unwrap_or(i32::from(self.units_per_em))
            .max(0) as u32;

        Some(GlyphMetrics { width, height })
    }

    /// Advance width of a character in thousandths of an em.
    fn advance_1000(&self, character: char) -> Option<f32> {
        let glyph_id = self.glyph_id(character)?;
        let advance = self
            .face()
            .glyph_hor_advance(owned_ttf_parser::GlyphId(glyph_id))?;
        Some(f32::from(advance) * 1000.0 / f32::from(self.units_per_em))
    }

    fn face(&self) -> &Face<'_> {
        self.inner.as_face_ref()
    }
}

/// A face that text can be drawn with.
#[derive(Clone, Debug)]
pub enum FontFace {
    Standard {
        family: StandardFamily,
        style: FontStyle,
    },
    TrueType {
        face: TtfFontFace,
        bytes: Arc<Vec<u8>>,
    },
}

impl FontFace {
    /// Whether every character of the text has a glyph in this face.
    pub fn covers(&self, text: &str) -> bool {
        match self {
            FontFace::Standard { .. } => text
                .chars()
                .all(|character| char_to_winansi(character).is_some()),
            FontFace::TrueType { face, .. } => text
                .chars()
                .all(|character| face.glyph_id(character).is_some()),
        }
    }

    /// The advance width of the text in millimeters at the given size in points.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let advance_1000: f32 = match self {
            FontFace::Standard { family, .. } => text
                .chars()
                .filter_map(char_to_winansi)
                .map(|byte| family.advance_1000(byte))
                .sum(),
            FontFace::TrueType { face, .. } => text
                .chars()
                .filter_map(|character| face.advance_1000(character))
                .sum(),
        };
        advance_1000 * font_size / 1000.0 / POINTS_PER_MILLIMETER
    }
}

/// Identifies one face of one registered family.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct FontKey {
    pub family: String,
    pub style: FontStyle,
}

impl std::fmt::Display for FontKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({:?})", self.family, self.style)
    }
}

/// A family resolved to one of its faces.
#[derive(Clone, Debug)]
pub struct ResolvedFont {
    pub key: FontKey,
    pub face: Arc<FontFace>,
}

/// The font families available to a renderer. It is built once and only read afterwards, so
/// it can be shared by any number of concurrent render calls.
#[derive(Clone, Debug, Default)]
pub struct FontRegistry {
    families: Vec<(String, BTreeMap<FontStyle, Arc<FontFace>>)>,
}

impl FontRegistry {
    /// A registry holding the three standard PDF families.
    pub fn with_standard_families() -> Self {
        let mut registry = FontRegistry::default();
        for family in StandardFamily::ALL {
            let faces = [
                FontStyle::Normal,
                FontStyle::Bold,
                FontStyle::Italic,
                FontStyle::BoldItalic,
            ]
            .into_iter()
            .map(|style| (style, Arc::new(FontFace::Standard { family, style })))
            .collect();
            registry
                .families
                .push((family.family_name().to_string(), faces));
        }
        registry
    }

    /// The standard families plus every TTF listed in the configuration.
    pub fn from_configuration(configuration: &RendererConfiguration) -> Result<Self, ContextError> {
        let mut registry = FontRegistry::with_standard_families();
        for font_association in &configuration.font_associations {
            let font_bytes = std::fs::read(&font_association.font_file_path).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Configuration,
                    format!(
                        "Failed to read the font {:?}, probably the path is wrong",
                        font_association.font_file_path
                    ),
                    &error,
                )
            })?;
            registry
                .register_true_type(
                    &font_association.font_family,
                    font_association.font_style,
                    font_bytes,
                )
                .map_err(|error| {
                    error.within(format!(
                        "Unable to register the font {:?}",
                        font_association.font_file_path
                    ))
                })?;
            log::debug!(
                "Registered {:?} as {} {:?}",
                font_association.font_file_path,
                font_association.font_family,
                font_association.font_style
            );
        }

        if !registry.has_family(&configuration.default_font_family) {
            return Err(ContextError::with_context(
                ErrorKind::Configuration,
                format!(
                    "The default font family {:?} is neither a standard family nor a configured one",
                    configuration.default_font_family
                ),
            ));
        }

        Ok(registry)
    }

    /// Adds a TTF face to a family, creating the family when needed.
    pub fn register_true_type(
        &mut self,
        family: &str,
        style: FontStyle,
        font_bytes: Vec<u8>,
    ) -> Result<(), ContextError> {
        let face = TtfFontFace::from_bytes(&font_bytes)?;
        let font_face = Arc::new(FontFace::TrueType {
            face,
            bytes: Arc::new(font_bytes),
        });

        match self.family_position(family) {
            Some(position) => {
                self.families[position].1.insert(style, font_face);
            }
            None => self
                .families
                .push((family.to_string(), BTreeMap::from([(style, font_face)]))),
        }

        Ok(())
    }

    /// Family names are matched without regard to ASCII case.
    pub fn has_family(&self, family: &str) -> bool {
        self.family_position(family).is_some()
    }

    /// Resolves a family and style to a face. A family missing the requested style falls back
    /// to its normal face, then to whatever face it has.
    pub fn resolve(&self, family: &str, style: FontStyle) -> Option<ResolvedFont> {
        let (family_name, faces) = &self.families[self.family_position(family)?];
        let (style, face) = faces
            .get_key_value(&style)
            .or_else(|| faces.get_key_value(&FontStyle::Normal))
            .or_else(|| faces.iter().next())?;

        Some(ResolvedFont {
            key: FontKey {
                family: family_name.clone(),
                style: *style,
            },
            face: face.clone(),
        })
    }

    pub fn face(&self, key: &FontKey) -> Option<Arc<FontFace>> {
        let (_, faces) = &self.families[self.family_position(&key.family)?];
        faces.get(&key.style).cloned()
    }

    /// The order in which families are tried once the chosen one cannot draw a text: the
    /// Arabic families by preference, the default family, then the remaining families in
    /// registration order.
    pub fn fallback_chain(&self, default_family: &str, arabic_families: &[String]) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let candidates = arabic_families
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(default_family))
            .chain(self.families.iter().map(|(name, _)| name.as_str()));

        for candidate in candidates {
            let Some(position) = self.family_position(candidate) else {
                continue;
            };
            let name = &self.families[position].0;
            if !chain.contains(name) {
                chain.push(name.clone());
            }
        }
        chain
    }

    fn family_position(&self, family: &str) -> Option<usize> {
        self.families
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(family))
    }
}
