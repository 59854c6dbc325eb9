use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes document bytes for parsing and text scanning.
///
/// A leading BOM is dropped. Invalid UTF-8 sequences are replaced so the
/// regex stages still see the readable parts.
pub(crate) fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Parses decoded text as an XML tree. DTDs are tolerated.
pub(crate) fn parse(text: &str) -> Option<roxmltree::Document<'_>> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    roxmltree::Document::parse_with_options(text, options).ok()
}

/// Lowercased local name of an element.
pub(crate) fn local_name(node: roxmltree::Node<'_, '_>) -> String {
    node.tag_name().name().to_ascii_lowercase()
}
