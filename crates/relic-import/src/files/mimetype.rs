//! MIME type detection from magic bytes, falling back to file extensions

/// Type reported when nothing more specific is known
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

const EXTENSIONS: &[(&str, &str)] = &[
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jp2", "image/jp2"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("pdf", "application/pdf"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("hocr", "text/html"),
    ("xml", "application/xml"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
];

/// MIME type implied by a file name's extension
pub fn from_extension(filename: &str) -> Option<&'static str> {
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Detect from the first bytes of the content, then the name
pub fn detect(filename: &str, head: &[u8]) -> String {
    infer::get(head)
        .map(|kind| kind.mime_type())
        .or_else(|| from_extension(filename))
        .unwrap_or(DEFAULT_MIMETYPE)
        .to_string()
}

/// Strip parameters from a `Content-Type` value
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIFF_HEADER: &[u8] = b"II*\x00\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn test_magic_bytes_win_over_extension() {
        assert_eq!(detect("scan.dat", TIFF_HEADER), "image/tiff");
        assert_eq!(detect("scan.jpg", TIFF_HEADER), "image/tiff");
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(detect("page-1.TIF", b""), "image/tiff");
        assert_eq!(detect("notes.txt", b"plain words"), "text/plain");
        assert_eq!(detect("README", b"plain words"), DEFAULT_MIMETYPE);
    }

    #[test]
    fn test_essence() {
        assert_eq!(essence("text/html; charset=UTF-8"), "text/html");
        assert_eq!(essence("Image/TIFF"), "image/tiff");
    }
}
