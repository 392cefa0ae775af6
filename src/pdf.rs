use std::collections::BTreeMap;
use std::io::BufWriter;
use std::sync::Arc;

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};
use time::OffsetDateTime;

use crate::error::{ContextError, ErrorKind};
use crate::fonts::{char_to_winansi, FontFace, FontKey, TtfFontFace, POINTS_PER_MILLIMETER};

/// Converts millimeters to points, the unit the PDF content streams are expressed in.
fn millimeters_to_points(millimeters: f32) -> f32 {
    millimeters * POINTS_PER_MILLIMETER
}

/// Descriptive entries of the PDF `Info` dictionary.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub title: String,
    pub producer: String,
    /// Defaults to the Unix epoch so that identical inputs produce identical files.
    pub creation_date: OffsetDateTime,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        DocumentInfo {
            title: "Untitled".into(),
            producer: concat!("pagetext ", env!("CARGO_PKG_VERSION")).into(),
            creation_date: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// A font registered in the document together with the name it is referenced by in the
/// page resources.
#[derive(Debug, Clone)]
struct DocumentFont {
    object_id: lopdf::ObjectId,
    resource_name: String,
    face: Arc<FontFace>,
    base_font: String,
}

/// One page of the document with the operations of its single content stream.
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// Page width in points.
    pub width: f32,
    /// Page height in points.
    pub height: f32,
    operations: Vec<Operation>,
}

/// A thin interface over a `lopdf::Document`: pages are added, text is written onto them,
/// and `write_all` assembles the catalog, the fonts and the page tree.
pub struct PdfDocument {
    fonts: BTreeMap<FontKey, DocumentFont>,
    /// The underlying PDF document, exposed for anything this interface does not cover.
    pub inner_document: lopdf::Document,
    /// The identifier of the document, used for the PDF `ID` entry.
    pub identifier: String,
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    pub fn new(pdf_document_identifier: String) -> Self {
        PdfDocument {
            fonts: BTreeMap::new(),
            inner_document: lopdf::Document::with_version("1.5"),
            identifier: pdf_document_identifier,
            pages: Vec::new(),
        }
    }

    /// Adds a page of the given size in millimeters and returns its index.
    pub fn add_page(&mut self, page_width: f32, page_height: f32) -> usize {
        self.pages.push(PdfPage {
            width: millimeters_to_points(page_width),
            height: millimeters_to_points(page_height),
            operations: Vec::new(),
        });
        self.pages.len() - 1
    }

    /// Registers a face under the given key. Registering the same key twice is a no-op.
    pub fn add_font(&mut self, key: &FontKey, face: Arc<FontFace>) {
        if self.fonts.contains_key(key) {
            return;
        }

        let resource_name = format!("F{}", self.fonts.len());
        let base_font = match face.as_ref() {
            FontFace::Standard { family, style } => family.base_font(*style).to_string(),
            FontFace::TrueType { .. } => postscript_name(key),
        };
        let object_id = self.inner_document.new_object_id();
        self.fonts.insert(
            key.clone(),
            DocumentFont {
                object_id,
                resource_name,
                face,
                base_font,
            },
        );
    }

    /// Writes the text at the given position, expressed in millimeters from the top-left
    /// corner of the page with `y` being the baseline.
    #[allow(clippy::too_many_arguments)]
    pub fn write_text_to_page(
        &mut self,
        page_index: usize,
        color: [f32; 3],
        text: &str,
        font_key: &FontKey,
        font_size: f32,
        caret_position: [f32; 2],
    ) -> Result<(), ContextError> {
        let font = self.fonts.get(font_key).ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Emission,
                format!("Failed to find the font {} in the document", font_key),
            )
        })?;
        let encoded_text = encode_text(&font.face, text).map_err(|error| {
            error.within(format!("Unable to encode {:?} in {}", text, font_key))
        })?;
        let resource_name = font.resource_name.clone();

        let page = self.pages.get_mut(page_index).ok_or_else(|| {
            ContextError::with_context(
                ErrorKind::Emission,
                format!("Failed to find the page with index {}", page_index),
            )
        })?;
        let [x, y] = caret_position;
        let [r, g, b] = color;
        page.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(resource_name.into_bytes()), font_size.into()],
            ),
            Operation::new(
                "Td",
                vec![
                    millimeters_to_points(x).into(),
                    (page.height - millimeters_to_points(y)).into(),
                ],
            ),
            Operation::new(
                "rg",
                [r, g, b].into_iter().map(Object::Real).collect(),
            ),
            Operation::new("Tj", vec![encoded_text]),
            Operation::new("ET", vec![]),
        ]);

        Ok(())
    }

    /// Assembles the fonts, the pages and the document catalog into the underlying document.
    pub fn write_all(&mut self, instance_id: &str, info: &DocumentInfo) -> Result<(), ContextError> {
        use lopdf::Object::*;
        use lopdf::StringFormat::*;

        let timestamp = to_pdf_timestamp_format(&info.creation_date);
        let document_info = lopdf::Dictionary::from_iter(vec![
            ("Trapped", Name("False".into())),
            ("CreationDate", String(timestamp.clone().into_bytes(), Literal)),
            ("ModDate", String(timestamp.into_bytes(), Literal)),
            ("Title", text_string(&info.title)),
            ("Producer", String(info.producer.clone().into_bytes(), Literal)),
            ("Creator", String(info.producer.clone().into_bytes(), Literal)),
            (
                "Identifier",
                String(self.identifier.clone().into_bytes(), Literal),
            ),
        ]);
        let document_info_id = self.inner_document.add_object(Dictionary(document_info));

        let pages_id = self.inner_document.new_object_id();
        let catalog = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Catalog".into())),
            ("PageLayout", Name("OneColumn".into())),
            ("PageMode", Name("UseNone".into())),
            ("Pages", Reference(pages_id)),
        ]);
        let catalog_id = self.inner_document.add_object(catalog);

        self.inner_document.trailer.set("Root", Reference(catalog_id));
        self.inner_document
            .trailer
            .set("Info", Reference(document_info_id));
        self.inner_document.trailer.set(
            "ID",
            Array(vec![
                String(self.identifier.clone().into_bytes(), Literal),
                String(instance_id.as_bytes().to_vec(), Literal),
            ]),
        );

        let fonts_dictionary = self.insert_fonts_into_document();
        let fonts_dictionary_id = self.inner_document.add_object(fonts_dictionary);

        let mut page_ids = Vec::<Object>::new();
        for (index, page) in self.pages.iter_mut().enumerate() {
            let media_box = Array(vec![
                Integer(0),
                Integer(0),
                page.width.into(),
                page.height.into(),
            ]);
            let resources = lopdf::Dictionary::from_iter(vec![(
                "Font",
                Reference(fonts_dictionary_id),
            )]);

            let content = lopdf::content::Content {
                operations: std::mem::take(&mut page.operations),
            };
            let content_bytes = content.encode().map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Emission,
                    format!("Failed to encode the content of page {}", index + 1),
                    &error,
                )
            })?;
            let content_id = self
                .inner_document
                .add_object(lopdf::Stream::new(lopdf::Dictionary::new(), content_bytes));

            let page_dictionary = lopdf::Dictionary::from_iter(vec![
                ("Type", Name("Page".into())),
                ("Rotate", Integer(0)),
                ("MediaBox", media_box.clone()),
                ("CropBox", media_box),
                ("Parent", Reference(pages_id)),
                ("Resources", Dictionary(resources)),
                ("Contents", Reference(content_id)),
            ]);
            page_ids.push(Reference(self.inner_document.add_object(page_dictionary)));
        }

        let pages = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("Pages".into())),
            ("Count", Integer(page_ids.len() as i64)),
            ("Kids", Array(page_ids)),
        ]);
        self.inner_document
            .objects
            .insert(pages_id, Dictionary(pages));

        Ok(())
    }

    /// Compresses the streams and drops unused objects.
    pub fn optimize(&mut self) {
        self.inner_document.prune_objects();
        self.inner_document.delete_zero_length_streams();
        self.inner_document.renumber_objects();
        self.inner_document.compress();
    }

    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, ContextError> {
        let mut pdf_document_bytes = Vec::new();
        let mut writer = BufWriter::new(&mut pdf_document_bytes);
        self.inner_document.save_to(&mut writer).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Emission,
                "Error while saving the PDF document to bytes",
                &error,
            )
        })?;
        drop(writer);

        Ok(pdf_document_bytes)
    }

    /// Inserts every registered font into the document and returns the resource dictionary
    /// which maps their names to them.
    fn insert_fonts_into_document(&mut self) -> lopdf::Dictionary {
        let mut font_dictionary = lopdf::Dictionary::new();

        for font in self.fonts.values() {
            let dictionary = match font.face.as_ref() {
                FontFace::Standard { .. } => lopdf::Dictionary::from_iter(vec![
                    ("Type", Object::Name("Font".into())),
                    ("Subtype", Object::Name("Type1".into())),
                    ("BaseFont", Object::Name(font.base_font.clone().into_bytes())),
                    ("Encoding", Object::Name("WinAnsiEncoding".into())),
                ]),
                FontFace::TrueType { face, bytes } => {
                    true_type_font_dictionary(&mut self.inner_document, &font.base_font, face, bytes)
                }
            };
            self.inner_document
                .objects
                .insert(font.object_id, Object::Dictionary(dictionary));
            font_dictionary.set(
                font.resource_name.clone(),
                Object::Reference(font.object_id),
            );
        }

        font_dictionary
    }
}

/// Encodes the text for a `Tj` operator: WinAnsi bytes for the standard fonts and big-endian
/// glyph IDs for the embedded ones.
fn encode_text(face: &FontFace, text: &str) -> Result<Object, ContextError> {
    match face {
        FontFace::Standard { .. } => {
            let bytes = text
                .chars()
                .map(|character| {
                    char_to_winansi(character).ok_or_else(|| {
                        ContextError::with_context(
                            ErrorKind::Emission,
                            format!("The character {:?} has no WinAnsi encoding", character),
                        )
                    })
                })
                .collect::<Result<Vec<u8>, _>>()?;
            Ok(Object::String(bytes, StringFormat::Literal))
        }
        FontFace::TrueType { face, .. } => {
            let mut glyph_id_bytes = Vec::with_capacity(text.len() * 2);
            for character in text.chars() {
                let glyph_id = face.glyph_id(character).ok_or_else(|| {
                    ContextError::with_context(
                        ErrorKind::Emission,
                        format!("Unable to find the character {:?} in the font", character),
                    )
                })?;
                glyph_id_bytes.extend(glyph_id.to_be_bytes());
            }
            Ok(Object::String(glyph_id_bytes, StringFormat::Hexadecimal))
        }
    }
}

/// A PDF text string: literal bytes for ASCII text, UTF-16BE with a byte order mark otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend(unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// A PDF name for an embedded font, built from its family and style.
fn postscript_name(key: &FontKey) -> String {
    let family = key
        .family
        .chars()
        .filter(|character| character.is_ascii_alphanumeric())
        .collect::<String>();
    format!("{}-{:?}", family, key.style)
}

/// Embeds a TrueType face as a Type0 font with a `CIDFontType2` descendant and the
/// `Identity-H` encoding, so text is written as glyph IDs.
fn true_type_font_dictionary(
    inner_document: &mut lopdf::Document,
    base_font: &str,
    face: &TtfFontFace,
    bytes: &[u8],
) -> lopdf::Dictionary {
    use lopdf::Object::*;

    let face_metrics = face.font_metrics();
    // Glyph space is scaled to 1000 units per em
    let scaling = 1000.0 / f32::from(face_metrics.units_per_em);

    // The whole font file is embedded, `Length1` being its uncompressed length
    let font_stream = lopdf::Stream::new(
        lopdf::Dictionary::from_iter(vec![("Length1", Integer(bytes.len() as i64))]),
        bytes.to_vec(),
    );
    let font_file_id = inner_document.add_object(font_stream);

    // Collect the width of every glyph, in glyph ID order, along with the tallest glyph
    // which bounds the font box from above
    let mut maximum_glyph_height = 0;
    let mut widths = Vec::<Object>::new();
    for glyph_id in 0..face.glyph_count() {
        let width = match face.glyph_metrics(glyph_id) {
            Some(glyph_metrics) => {
                maximum_glyph_height = maximum_glyph_height.max(glyph_metrics.height);
                glyph_metrics.width
            }
            None => {
                log::warn!(
                    "Glyph ID {} of the font {} has no width, using zero",
                    glyph_id,
                    base_font
                );
                0
            }
        };
        widths.push(Integer((width as f32 * scaling) as i64));
    }

    // The descriptor carries the vertical metrics and points to the embedded font file
    let font_descriptor = lopdf::Dictionary::from_iter(vec![
        ("Type", Name("FontDescriptor".into())),
        ("FontName", Name(base_font.as_bytes().to_vec())),
        (
            "Ascent",
            Integer((f32::from(face_metrics.ascent) * scaling) as i64),
        ),
        (
            "Descent",
            Integer((f32::from(face_metrics.descent) * scaling) as i64),
        ),
        (
            "CapHeight",
            Integer((f32::from(face_metrics.ascent) * scaling) as i64),
        ),
        ("ItalicAngle", Integer(0)),
        // Nonsymbolic
        ("Flags", Integer(32)),
        ("StemV", Integer(80)),
        (
            "FontBBox",
            Array(vec![
                Integer(0),
                Integer((f32::from(face_metrics.descent) * scaling) as i64),
                Integer(1000),
                Integer((maximum_glyph_height as f32 * scaling) as i64),
            ]),
        ),
        ("FontFile2", Reference(font_file_id)),
    ]);
    let font_descriptor_id = inner_document.add_object(font_descriptor);

    // With the identity ordering the CIDs are the glyph IDs themselves, and `W` lists their
    // widths starting from CID 0
    let descendant_font = lopdf::Dictionary::from_iter(vec![
        ("Type", Name("Font".into())),
        ("Subtype", Name("CIDFontType2".into())),
        ("BaseFont", Name(base_font.as_bytes().to_vec())),
        (
            "CIDSystemInfo",
            Dictionary(lopdf::Dictionary::from_iter(vec![
                ("Registry", String("Adobe".into(), StringFormat::Literal)),
                ("Ordering", String("Identity".into(), StringFormat::Literal)),
                ("Supplement", Integer(0)),
            ])),
        ),
        ("W", Array(vec![Integer(0), Array(widths)])),
        ("DW", Integer(1000)),
        ("FontDescriptor", Reference(font_descriptor_id)),
    ]);

    // Map the glyph IDs back to characters so that the text can be extracted and searched
    let mut glyph_to_character = face.glyph_ids().into_iter().collect::<Vec<_>>();
    glyph_to_character.sort_unstable();
    let to_unicode = generate_cid_to_unicode_map(base_font, &glyph_to_character);
    let to_unicode_id = inner_document.add_object(lopdf::Stream::new(
        lopdf::Dictionary::new(),
        to_unicode.into_bytes(),
    ));

    lopdf::Dictionary::from_iter(vec![
        ("Type", Name("Font".into())),
        ("Subtype", Name("Type0".into())),
        ("BaseFont", Name(base_font.as_bytes().to_vec())),
        ("Encoding", Name("Identity-H".into())),
        ("DescendantFonts", Array(vec![Dictionary(descendant_font)])),
        ("ToUnicode", Reference(to_unicode_id)),
    ])
}

/// Generates the `ToUnicode` CMap of an embedded font. Mappings are grouped in `bfchar` blocks
/// of at most 100 entries whose glyph IDs share their high byte.
fn generate_cid_to_unicode_map(face_name: &str, glyph_to_character: &[(u16, char)]) -> String {
    let mut cid_to_unicode_map = format!(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /{face_name}-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <ffff>\n\
         endcodespacerange\n"
    );

    let mut blocks: Vec<Vec<(u16, char)>> = Vec::new();
    for &(glyph_id, character) in glyph_to_character {
        match blocks.last_mut() {
            Some(block)
                if block.len() < 100
                    && block.first().map(|(first, _)| first >> 8) == Some(glyph_id >> 8) =>
            {
                block.push((glyph_id, character))
            }
            _ => blocks.push(vec![(glyph_id, character)]),
        }
    }

    for block in blocks {
        cid_to_unicode_map.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph_id, character) in block {
            let utf16 = character
                .encode_utf16(&mut [0; 2])
                .iter()
                .map(|unit| format!("{unit:04x}"))
                .collect::<String>();
            cid_to_unicode_map.push_str(&format!("<{glyph_id:04x}> <{utf16}>\n"));
        }
        cid_to_unicode_map.push_str("endbfchar\n");
    }

    cid_to_unicode_map.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cid_to_unicode_map
}

/// Formats the given time so that it matches what the PDF specification expects.
/// An example of it is the following: D:20170505150224+02'00'.
fn to_pdf_timestamp_format(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}
