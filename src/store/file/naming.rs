//! Mapping document ids to file names.

/// Extension of document files.
pub(super) const DOCUMENT_EXT: &str = "json";

/// File name for a document id.
///
/// ASCII letters, digits, `-` and `_` pass through; `.` passes through except
/// in leading position so no id can produce a hidden file or `..`. Every other
/// byte is written as `%XX`. The empty id is written as a bare `%`, which no
/// escape can produce. The mapping is injective, so distinct ids never share
/// a file.
pub(super) fn document_file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + DOCUMENT_EXT.len() + 2);
    if id.is_empty() {
        name.push('%');
    }
    for (i, byte) in id.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && i > 0);
        if keep {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push('.');
    name.push_str(DOCUMENT_EXT);
    name
}

/// Whether a directory entry is a document file (not a temporary, lock or
/// index file).
pub(super) fn is_document_file(file_name: &str) -> bool {
    !file_name.starts_with('.')
        && file_name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext == DOCUMENT_EXT)
}
