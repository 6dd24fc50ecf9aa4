//! File content classification and transport encoding
//!
//! Content read from the vault is carried as a [`FileContent`] value so that
//! binary payloads never travel through a text channel. The GitHub API moves
//! bytes as base64; [`encode_transport`] and [`decode_transport`] handle that
//! representation, including the line-wrapped base64 the contents endpoint
//! returns.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::Path;

/// Extensions that are always treated as binary, compared case-insensitively
pub const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "tif", "tiff", "avif", "heic",
    // documents
    "pdf",
    // audio
    "mp3", "wav", "ogg", "m4a", "flac", "aac", "3gp",
    // video
    "mp4", "webm", "mov", "mkv", "ogv", "avi",
    // vector images
    "svg",
];

/// Content of a single file, tagged by how it must be transported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Classify raw file bytes for the given path.
    ///
    /// Binary extensions always produce [`FileContent::Binary`]; anything else
    /// becomes text unless the bytes are not valid UTF-8.
    pub fn from_bytes(path: &str, bytes: Vec<u8>) -> Self {
        if is_binary_path(path) {
            return FileContent::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => FileContent::Text(text),
            Err(err) => FileContent::Binary(err.into_bytes()),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, FileContent::Binary(_))
    }

    /// Raw bytes of the content
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }

    /// Size in bytes of the content
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Text(text) => text.into_bytes(),
            FileContent::Binary(bytes) => bytes,
        }
    }
}

/// A vault file captured for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Vault-relative path with `/` separators
    pub path: String,
    pub content: FileContent,
}

impl LocalFile {
    pub fn new(path: impl Into<String>, content: FileContent) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// Whether a path is classified as binary by its extension alone
pub fn is_binary_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Encode bytes for the API's base64 transport
pub fn encode_transport(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 transport content, ignoring the line breaks GitHub inserts
pub fn decode_transport(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn wrap_lines(encoded: &str, width: usize) -> String {
        encoded
            .as_bytes()
            .chunks(width)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_binary_classification_by_extension() {
        assert!(is_binary_path("img.png"));
        assert!(is_binary_path("attachments/Scan.PDF"));
        assert!(is_binary_path("audio/voice.m4a"));
        assert!(is_binary_path("diagram.svg"));
        assert!(!is_binary_path("notes/a.md"));
        assert!(!is_binary_path("README"));
        assert!(!is_binary_path("archive.png.md"));
    }

    #[test]
    fn test_from_bytes_uses_extension_first() {
        let content = FileContent::from_bytes("plain.png", b"hello".to_vec());
        assert_eq!(content, FileContent::Binary(b"hello".to_vec()));

        let content = FileContent::from_bytes("notes/a.md", b"# Title".to_vec());
        assert_eq!(content, FileContent::Text("# Title".to_string()));
    }

    #[test]
    fn test_from_bytes_keeps_invalid_utf8_as_binary() {
        let bytes = vec![0xff, 0xfe, 0x00, 0x41];
        let content = FileContent::from_bytes("data.bin", bytes.clone());
        assert_eq!(content, FileContent::Binary(bytes));
    }

    #[test]
    fn test_text_that_looks_like_markers_stays_text() {
        let text = "<!-- BINARY_START -->aGVsbG8=<!-- BINARY_END -->";
        let content = FileContent::from_bytes("notes/markers.md", text.as_bytes().to_vec());
        assert_eq!(content, FileContent::Text(text.to_string()));
    }

    #[test]
    fn test_decode_github_wrapped_content() {
        let decoded = decode_transport("SGVsbG8s\nIFdvcmxk\nIQ==\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_transport("not base64 at all!").is_err());
    }

    #[test]
    fn test_empty_content_round_trip() {
        assert_eq!(encode_transport(&[]), "");
        assert_eq!(decode_transport("").unwrap(), Vec::<u8>::new());
        assert!(FileContent::Binary(Vec::new()).is_empty());
    }

    #[quickcheck]
    fn prop_binary_round_trip(bytes: Vec<u8>) -> bool {
        decode_transport(&encode_transport(&bytes)).ok() == Some(bytes)
    }

    #[quickcheck]
    fn prop_wrapped_binary_round_trip(bytes: Vec<u8>) -> bool {
        let wrapped = wrap_lines(&encode_transport(&bytes), 60);
        decode_transport(&wrapped).ok() == Some(bytes)
    }

    #[quickcheck]
    fn prop_binary_paths_never_become_text(bytes: Vec<u8>) -> bool {
        FileContent::from_bytes("img.png", bytes.clone()) == FileContent::Binary(bytes)
    }
}
