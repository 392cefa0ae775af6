use std::num::NonZeroUsize;

use pagetext::configuration::FontAssociation;
use pagetext::fonts::FontStyle;
use pagetext::{Document, ErrorKind, RenderOptions, Renderer, RendererConfiguration};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng as _};
use serde_json::{json, Value};

fn paragraph(text: &str) -> Value {
    json!({ "type": "paragraph", "content": [{ "type": "text", "text": text }] })
}

/// The strings shown by every page of the PDF, in page order.
fn page_texts(pdf_bytes: &[u8]) -> Vec<Vec<String>> {
    let pdf_document = lopdf::Document::load_mem(pdf_bytes).unwrap();
    pdf_document
        .get_pages()
        .into_values()
        .map(|page_id| {
            let content = pdf_document.get_page_content(page_id).unwrap();
            lopdf::content::Content::decode(&content)
                .unwrap()
                .operations
                .into_iter()
                .filter(|operation| operation.operator == "Tj")
                .map(|operation| match &operation.operands[0] {
                    lopdf::Object::String(bytes, _) => String::from_utf8_lossy(bytes).into_owned(),
                    other => panic!("Unexpected operand {:?}", other),
                })
                .collect()
        })
        .collect()
}

fn random_words(rng: &mut StdRng, maximum_words: usize) -> String {
    (0..rng.gen_range(1..=maximum_words))
        .map(|_| {
            let length = rng.gen_range(1..12);
            (0..length)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_document(rng: &mut StdRng) -> Value {
    let blocks = (0..rng.gen_range(1..80))
        .map(|_| {
            let runs = (0..rng.gen_range(1..4))
                .map(|_| {
                    let mut marks = Vec::new();
                    if rng.gen_bool(0.3) {
                        marks.push(json!({ "type": "bold" }));
                    }
                    if rng.gen_bool(0.3) {
                        marks.push(json!({ "type": "italic" }));
                    }
                    if rng.gen_bool(0.2) {
                        marks.push(json!({
                            "type": "textStyle",
                            "attrs": { "fontSize": format!("{}px", rng.gen_range(10..24)) }
                        }));
                    }
                    json!({ "type": "text", "text": random_words(rng, 40), "marks": marks })
                })
                .collect::<Vec<_>>();

            if rng.gen_bool(0.15) {
                json!({ "type": "heading", "attrs": { "level": rng.gen_range(1..=6) }, "content": runs })
            } else {
                json!({ "type": "paragraph", "content": runs })
            }
        })
        .collect::<Vec<_>>();

    json!({ "type": "doc", "content": blocks })
}

#[test]
fn hello_world_renders_on_a_single_page() {
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();
    let document = Document::from_value(json!({ "content": [paragraph("Hello world")] })).unwrap();

    let rendered_document = renderer
        .render(&document, &RenderOptions::default())
        .unwrap();

    assert_eq!(rendered_document.page_count, 1);
    assert_eq!(rendered_document.overflowed_lines, 0);
    assert_eq!(
        page_texts(&rendered_document.bytes),
        vec![vec!["Hello world".to_string(), "Page 1 of 1".to_string()]]
    );
}

#[test]
fn every_page_carries_its_footer() {
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();
    let paragraphs = (0..40)
        .map(|index| paragraph(&format!("Paragraph number {index}")))
        .collect::<Vec<_>>();
    let document = Document::from_value(Value::Array(paragraphs)).unwrap();

    let rendered_document = renderer
        .render(&document, &RenderOptions::default())
        .unwrap();

    let pages = page_texts(&rendered_document.bytes);
    assert_eq!(rendered_document.page_count, 2);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].len(), 37);
    assert_eq!(pages[0].first().map(String::as_str), Some("Paragraph number 0"));
    assert_eq!(pages[0].last().map(String::as_str), Some("Page 1 of 2"));
    assert_eq!(pages[1].first().map(String::as_str), Some("Paragraph number 36"));
    assert_eq!(pages[1].last().map(String::as_str), Some("Page 2 of 2"));
}

#[test]
fn documents_without_blocks_have_no_content() {
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();

    for value in [json!(null), json!([]), json!({ "content": [] })] {
        let document = Document::from_value(value.clone()).unwrap();
        let error = renderer
            .render(&document, &RenderOptions::default())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NoContent, "for {value}");
    }

    let unrecognized_roots: [&[u8]; 3] = [br#"{"type": "doc"}"#, b"42", br#""text""#];
    for document_content in unrecognized_roots {
        let error = Document::from_slice(document_content).unwrap_err();
        assert_eq!(error.kind, ErrorKind::NoContent);
    }
}

#[test]
fn target_page_count_is_never_exceeded() {
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();
    let paragraphs = (0..100)
        .map(|index| paragraph(&format!("Line {index}")))
        .collect::<Vec<_>>();
    let document = Document::from_value(Value::Array(paragraphs)).unwrap();

    let rendered_document = renderer
        .render(
            &document,
            &RenderOptions {
                target_page_count: NonZeroUsize::new(1),
                ..RenderOptions::default()
            },
        )
        .unwrap();

    assert_eq!(rendered_document.page_count, 1);
    assert!(rendered_document.overflowed_lines > 0);
    let pages = page_texts(&rendered_document.bytes);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].len(), 101);
    assert_eq!(pages[0].last().map(String::as_str), Some("Page 1 of 1"));
}

#[test]
fn pages_before_the_target_keep_their_text_on_the_page() {
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();
    let paragraphs = (0..100)
        .map(|index| paragraph(&format!("Line {index}")))
        .collect::<Vec<_>>();
    let document = Document::from_value(Value::Array(paragraphs)).unwrap();

    let rendered_document = renderer
        .render(
            &document,
            &RenderOptions {
                target_page_count: NonZeroUsize::new(2),
                ..RenderOptions::default()
            },
        )
        .unwrap();

    assert_eq!(rendered_document.page_count, 2);
    let bottom = 297.0 - 20.0;
    for instruction in &rendered_document.draw_buffer.instructions {
        if instruction.origin.is_some() {
            assert!(instruction.y <= bottom + 1e-3, "{instruction:?}");
        }
    }
    let pages = page_texts(&rendered_document.bytes);
    assert_eq!(pages.iter().map(Vec::len).sum::<usize>(), 102);
}

#[test]
fn random_documents_render_deterministically() {
    let mut rng = StdRng::seed_from_u64(0x7061_6765);
    let renderer = Renderer::new(RendererConfiguration::default()).unwrap();

    for _ in 0..20 {
        let document = Document::from_value(random_document(&mut rng)).unwrap();
        let target_page_count = NonZeroUsize::new(rng.gen_range(0..4));
        let options = RenderOptions {
            target_page_count,
            ..RenderOptions::default()
        };

        let first = renderer.render(&document, &options).unwrap();
        let second = renderer.render(&document, &options).unwrap();

        similar_asserts::assert_eq!(first.draw_buffer, second.draw_buffer);
        assert!(first.bytes == second.bytes);
        assert_eq!(page_texts(&first.bytes).len(), first.page_count);
        if let Some(target_page_count) = target_page_count {
            assert!(first.page_count <= target_page_count.get());
        }
    }
}

#[test]
fn compressed_output_keeps_its_pages() {
    let configuration = RendererConfiguration {
        compress: true,
        ..RendererConfiguration::default()
    };
    let renderer = Renderer::new(configuration).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let document = Document::from_value(random_document(&mut rng)).unwrap();

    let rendered_document = renderer
        .render(&document, &RenderOptions::default())
        .unwrap();

    let pages = page_texts(&rendered_document.bytes);
    assert_eq!(pages.len(), rendered_document.page_count);
    for (index, page) in pages.iter().enumerate() {
        let footer = format!("Page {} of {}", index + 1, rendered_document.page_count);
        assert_eq!(page.last(), Some(&footer));
    }
}

#[test]
fn sample_document_renders() {
    let renderer = Renderer::new(
        RendererConfiguration::from_path("demos/configuration.json".as_ref()).unwrap(),
    )
    .unwrap();
    let document = Document::from_path("demos/sample_document.json".as_ref()).unwrap();

    let rendered_document = renderer
        .render(&document, &RenderOptions::default())
        .unwrap();

    assert!(rendered_document.bytes.starts_with(b"%PDF-1.5"));
    assert_eq!(
        page_texts(&rendered_document.bytes).len(),
        rendered_document.page_count
    );
}

fn arabic_configuration() -> RendererConfiguration {
    RendererConfiguration {
        arabic_font_families: vec!["Amiri".into(), "DejaVuSans".into()],
        font_associations: vec![FontAssociation {
            font_family: "DejaVuSans".into(),
            font_style: FontStyle::Normal,
            font_file_path: "tests/fonts/DejaVuSans.ttf".into(),
        }],
        ..RendererConfiguration::default()
    }
}

#[test]
fn arabic_text_uses_the_capable_font() {
    let renderer = Renderer::new(arabic_configuration()).unwrap();
    let document = Document::from_value(json!([
        paragraph("مرحبا بالعالم"),
        paragraph("Hello world")
    ]))
    .unwrap();

    let layout_result = renderer.lay_out(&document, None).unwrap();

    let instructions = &layout_result.draw_buffer.instructions;
    assert_eq!(instructions[0].text, "مرحبا بالعالم");
    assert_eq!(instructions[0].font.family, "DejaVuSans");
    assert_eq!(instructions[1].text, "Hello world");
    assert_eq!(instructions[1].font.family, "helvetica");
}

#[test]
fn embedded_font_is_written_as_glyph_ids_with_a_unicode_map() {
    let renderer = Renderer::new(arabic_configuration()).unwrap();
    let document = Document::from_value(json!([paragraph("مرحبا")])).unwrap();

    let rendered_document = renderer
        .render(&document, &RenderOptions::default())
        .unwrap();
    let pdf_document = lopdf::Document::load_mem(&rendered_document.bytes).unwrap();

    let type0_font = pdf_document
        .objects
        .values()
        .filter_map(|object| object.as_dict().ok())
        .find(|dictionary| {
            dictionary
                .get(b"Subtype")
                .and_then(lopdf::Object::as_name)
                .is_ok_and(|subtype| subtype == b"Type0")
        })
        .unwrap();
    assert_eq!(type0_font.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
    let to_unicode_id = type0_font.get(b"ToUnicode").unwrap().as_reference().unwrap();
    let to_unicode = pdf_document
        .get_object(to_unicode_id)
        .unwrap()
        .as_stream()
        .unwrap();
    let cmap = String::from_utf8(to_unicode.content.clone()).unwrap();
    assert!(cmap.contains("beginbfchar"));
    assert!(cmap.contains("<0645>"));

    let (_, page_id) = pdf_document.get_pages().into_iter().next().unwrap();
    let content = pdf_document.get_page_content(page_id).unwrap();
    let operations = lopdf::content::Content::decode(&content).unwrap().operations;
    let arabic_operand = operations
        .iter()
        .filter(|operation| operation.operator == "Tj")
        .map(|operation| &operation.operands[0])
        .next()
        .unwrap();
    match arabic_operand {
        lopdf::Object::String(glyph_ids, lopdf::StringFormat::Hexadecimal) => {
            assert_eq!(glyph_ids.len(), 2 * "مرحبا".chars().count());
            assert!(glyph_ids.chunks(2).all(|glyph_id| glyph_id != [0, 0]));
        }
        other => panic!("Expected glyph IDs, found {:?}", other),
    }
}
