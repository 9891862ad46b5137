//! Parse error signal.

use super::parser::SourceKind;

/// A line that could not be decoded.
///
/// Surfaced to the consumer for observability; the stream continues with
/// the next line.
#[derive(thiserror::Error, Debug)]
#[error("Malformed {origin} line: {cause}")]
pub struct ParseError {
    /// Log source the line came from.
    pub origin: SourceKind,
    /// The offending line, verbatim.
    pub line: String,
    /// Decoder failure.
    #[source]
    pub cause: serde_json::Error,
}
