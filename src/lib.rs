//! pagetext renders rich-text documents, as produced by a TipTap-style editor, into paginated
//! PDF documents. The pages of the produced PDF break exactly where the editor showed them to
//! break: both sides estimate lines from character counts and pages from line counts, using
//! the same `PaginationBudget`.
//!
//! The entry point is the `Renderer` struct, which is built once from a `RendererConfiguration`
//! and then renders any number of `Document`s. Each render call goes through the same pipeline:
//! the content is extracted into blocks, the blocks are laid out into a page-tagged draw buffer,
//! every page is stamped with a "Page X of N" footer and the buffer is finally emitted as a PDF.

/// The module where the input `Document` is presented.
///
/// The document is the JSON tree produced by the editor. It is accepted either as an object with
/// a `content` array or directly as the array of block nodes, and a `null` document is accepted
/// too (it simply has nothing to render).
pub mod document;

/// Flattening of the document tree into `FormattedBlock`s, which are the paragraphs and the
/// headings of the document with the styling of their text runs already resolved.
pub mod content;

/// The `PaginationBudget` shared with the editor and the rest of the configuration of a renderer,
/// such as the fonts to load and the look of the page footers.
pub mod configuration;

/// Font resolution and measurement.
///
/// The three standard PDF families (`helvetica`, `times` and `courier`) are always available,
/// while any other family is loaded from the TTF files listed in the configuration. Arabic text
/// is detected here, and the `FontRegistry` knows the order in which families are tried when
/// the chosen one cannot draw a text.
pub mod fonts;

/// The `TextShaper` extension point, used to apply script-aware shaping to the lines before
/// they are drawn.
pub mod shaping;

/// The paginated layout engine, which turns the blocks into a `DrawBuffer`.
///
/// # Introduction
///
/// Lines are not measured: a text fits a line when it has no more characters than the budget
/// allows, and a page is full once it holds as many lines as the budget allows. When a target
/// page count is given, the content is spread over that many pages and no page is added past
/// it, the excess lines being squeezed onto the final page instead.
pub mod layout;

/// Stamping of the "Page X of N" footers onto a laid out document.
pub mod finalizer;

/// The module where the `PdfDocument` interface for writing PDF documents is presented.
///
/// It is a thin layer over `lopdf`: pages are added, fonts are registered and text is written
/// onto the pages, then `write_all` assembles the document. Timestamps default to the Unix epoch
/// and the identifier is supplied by the caller, so that the same input always gives the same
/// bytes.
pub mod pdf;

/// The end-to-end `Renderer`.
pub mod renderer;

/// This module contains the `ContextError` type which is the error type used throughout this library.
///
/// Every error carries an `ErrorKind`, so that callers can tell a document with nothing to render
/// apart from a broken configuration, along with a human-readable context and, when the error was
/// propagated from another crate, the message of that error.
pub mod error;

pub use configuration::{PaginationBudget, RendererConfiguration};
pub use document::Document;
pub use error::{ContextError, ErrorKind};
pub use renderer::{RenderOptions, RenderedDocument, Renderer};
