//! Output format → engine export filter table

use crate::error::ServiceError;

/// Output token used when the caller does not ask for one
pub const DEFAULT_OUTPUT: &str = "odt";

/// (output token, export filter, file extension)
const FILTERS: &[(&str, &str, &str)] = &[
    ("pdf", "writer_pdf_Export", "pdf"),
    ("odt", "writer8", "odt"),
    ("doc", "MS Word 97", "doc"),
];

/// Resolve the export filter for a requested output token
///
/// `None` and the empty string fall back to [`DEFAULT_OUTPUT`].
pub fn export_filter(out_mime: Option<&str>) -> Result<&'static str, ServiceError> {
    let token = match out_mime {
        Some(token) if !token.is_empty() => token,
        _ => DEFAULT_OUTPUT,
    };
    FILTERS
        .iter()
        .find(|(name, _, _)| *name == token)
        .map(|(_, filter, _)| *filter)
        .ok_or_else(|| ServiceError::UnknownFormat(token.to_string()))
}

/// File extension produced by an export filter
pub fn extension_for_filter(filter: &str) -> Option<&'static str> {
    FILTERS
        .iter()
        .find(|(_, name, _)| *name == filter)
        .map(|(_, _, ext)| *ext)
}
