//! Media type classification from the filename extension

/// How the viewer can present a decrypted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preview {
    Image,
    Text,
    Pdf,
    /// Opaque binary: offer a download, no preview.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    mime: &'static str,
}

pub const OCTET_STREAM: MediaType = MediaType {
    mime: "application/octet-stream",
};

const TABLE: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("xml", "text/xml"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

impl MediaType {
    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn preview(&self) -> Preview {
        if self.mime.starts_with("image/") {
            Preview::Image
        } else if self.mime.starts_with("text/") {
            Preview::Text
        } else if self.mime == "application/pdf" {
            Preview::Pdf
        } else {
            Preview::None
        }
    }

    pub fn is_previewable(&self) -> bool {
        self.preview() != Preview::None
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime)
    }
}

/// Look up the type for `filename`'s extension (case-insensitive).
/// Unknown or missing extensions are `application/octet-stream`.
pub fn classify(filename: &str) -> MediaType {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let Some((_, ext)) = base.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| MediaType { mime })
        .unwrap_or(OCTET_STREAM)
}
