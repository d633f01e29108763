//! Input encoding: raw bytes → base64 data URL → OCR document reference.
//!
//! PDFs are sent as `document_url` references and images as `image_url`
//! references; both carry the file inline as a `data:` URL so no upload
//! step is needed.

use crate::error::AttemptError;
use crate::pipeline::ocr::DocumentRef;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// MIME type for a lower-case input extension, or `None` if unsupported.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Wrap `bytes` in a `data:<mime>;base64,` URL.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), b64.len());
    format!("data:{mime};base64,{b64}")
}

/// Build the document reference for a file with extension `ext`.
///
/// An empty file is an attempt failure; it never reaches the service.
pub fn encode_document(ext: &str, bytes: &[u8]) -> Result<DocumentRef, AttemptError> {
    let mime = mime_for_extension(ext).ok_or_else(|| AttemptError::UnsupportedInput {
        extension: ext.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(AttemptError::EmptyInput);
    }
    let url = data_url(mime, bytes);
    Ok(if mime.starts_with("image/") {
        DocumentRef::ImageUrl { image_url: url }
    } else {
        DocumentRef::DocumentUrl { document_url: url }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_becomes_document_url() {
        let doc = encode_document("pdf", b"%PDF-1.7").unwrap();
        match doc {
            DocumentRef::DocumentUrl { document_url } => {
                let b64 = document_url
                    .strip_prefix("data:application/pdf;base64,")
                    .expect("pdf data url prefix");
                assert_eq!(STANDARD.decode(b64).unwrap(), b"%PDF-1.7");
            }
            other => panic!("expected document_url, got {other:?}"),
        }
    }

    #[test]
    fn jpeg_becomes_image_url() {
        let doc = encode_document("jpeg", &[0xFF, 0xD8, 0xFF]).unwrap();
        match doc {
            DocumentRef::ImageUrl { image_url } => {
                assert!(image_url.starts_with("data:image/jpeg;base64,"));
            }
            other => panic!("expected image_url, got {other:?}"),
        }
    }

    #[test]
    fn unknown_extension_is_attempt_error() {
        let err = encode_document("tiff", b"II*").unwrap_err();
        assert_eq!(
            err,
            AttemptError::UnsupportedInput {
                extension: "tiff".into()
            }
        );
    }

    #[test]
    fn empty_input_is_attempt_error() {
        assert_eq!(encode_document("pdf", b""), Err(AttemptError::EmptyInput));
        assert_eq!(encode_document("png", b""), Err(AttemptError::EmptyInput));
    }
}
