//! Binary payloads and MIME type resolution for uploads.

use bytes::Bytes;

/// MIME type used when nothing better is known about a payload.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Raw bytes handed over by the host, with whatever metadata came along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryAsset {
    pub data: Bytes,
    /// MIME type carried with the payload by the host (may be stale or missing).
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

impl BinaryAsset {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
            file_name: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn present(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// MIME type detected from the leading bytes of `data`, if recognisable.
pub fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Picks the content type for an upload.
///
/// Precedence: sniffed from content, then `declared` by the caller, then the
/// type carried on the asset, then [`FALLBACK_MIME_TYPE`]. Blank strings count
/// as absent.
pub fn resolve_mime_type(asset: &BinaryAsset, declared: Option<&str>) -> String {
    sniff_mime_type(&asset.data)
        .or_else(|| present(declared))
        .or_else(|| present(asset.mime_type.as_deref()))
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}
