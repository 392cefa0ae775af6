use serde::{Deserialize, Serialize};

/// The broad category of a failure, so that callers can react to the
/// conditions they care about without parsing the message.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The document root is missing or contains no paragraph or heading.
    NoContent,
    /// The document could not be parsed into one of the accepted shapes.
    InvalidDocument,
    /// The pagination budget or the font setup is unusable.
    Configuration,
    /// The PDF primitive failed while emitting the artifact.
    Emission,
    /// Reading or writing a file failed.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NoContent => "no content",
            ErrorKind::InvalidDocument => "invalid document",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Emission => "emission",
            ErrorKind::Io => "io",
        };
        write!(formatter, "{name}")
    }
}

/// A struct that represents an error with a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContextError {
    pub kind: ErrorKind,
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` of the given kind with the given context.
    pub fn with_context<S: Into<String>>(kind: ErrorKind, context: S) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` of the given kind with the given context and source error.
    pub fn with_error<S: Into<String>>(
        kind: ErrorKind,
        context: S,
        error: &dyn std::error::Error,
    ) -> ContextError {
        ContextError {
            kind,
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// Prefix the context of the error with further information, keeping the kind and the source.
    pub fn within<S: AsRef<str>>(mut self, outer_context: S) -> ContextError {
        self.context = format!(
            "{}: {}",
            outer_context.as_ref(),
            minimize_first_letter(self.context)
        );
        self
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}
