//! MIME type → file category lookup.
//!
//! Shared by the preview dispatcher and by icon selection in listings.

use std::fmt;

/// Semantic file category derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Image,
    Icon,
    Video,
    Audio,
    Code,
    Sheet,
    Word,
    Pdf,
    Markdown,
    Text,
    Zip,
    Ebook,
    Calendar,
    Presentation,
    Chart,
    Postscript,
    Unknown,
}

/// Exact matches, checked before the `type/*` prefix rules.
const EXACT: &[(&str, FileCategory)] = &[
    ("image/x-icon", FileCategory::Icon),
    ("image/vnd.microsoft.icon", FileCategory::Icon),
    ("application/pdf", FileCategory::Pdf),
    ("application/postscript", FileCategory::Postscript),
    ("application/eps", FileCategory::Postscript),
    ("text/markdown", FileCategory::Markdown),
    ("text/x-markdown", FileCategory::Markdown),
    ("text/csv", FileCategory::Sheet),
    ("text/tab-separated-values", FileCategory::Sheet),
    ("application/vnd.ms-excel", FileCategory::Sheet),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        FileCategory::Sheet,
    ),
    ("application/vnd.oasis.opendocument.spreadsheet", FileCategory::Sheet),
    ("application/msword", FileCategory::Word),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        FileCategory::Word,
    ),
    ("application/vnd.oasis.opendocument.text", FileCategory::Word),
    ("application/rtf", FileCategory::Word),
    ("application/vnd.ms-powerpoint", FileCategory::Presentation),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        FileCategory::Presentation,
    ),
    (
        "application/vnd.oasis.opendocument.presentation",
        FileCategory::Presentation,
    ),
    ("application/vnd.oasis.opendocument.chart", FileCategory::Chart),
    ("application/zip", FileCategory::Zip),
    ("application/x-zip-compressed", FileCategory::Zip),
    ("application/gzip", FileCategory::Zip),
    ("application/x-tar", FileCategory::Zip),
    ("application/x-7z-compressed", FileCategory::Zip),
    ("application/vnd.rar", FileCategory::Zip),
    ("application/x-rar-compressed", FileCategory::Zip),
    ("application/epub+zip", FileCategory::Ebook),
    ("application/x-mobipocket-ebook", FileCategory::Ebook),
    ("text/calendar", FileCategory::Calendar),
    ("application/ics", FileCategory::Calendar),
    ("application/json", FileCategory::Code),
    ("application/xml", FileCategory::Code),
    ("application/javascript", FileCategory::Code),
    ("application/typescript", FileCategory::Code),
    ("application/x-sh", FileCategory::Code),
    ("application/x-python", FileCategory::Code),
    ("application/toml", FileCategory::Code),
    ("application/x-yaml", FileCategory::Code),
    ("application/sql", FileCategory::Code),
    ("text/html", FileCategory::Code),
    ("text/css", FileCategory::Code),
    ("text/xml", FileCategory::Code),
    ("text/javascript", FileCategory::Code),
    ("text/x-rust", FileCategory::Code),
    ("text/x-python", FileCategory::Code),
    ("text/x-c", FileCategory::Code),
    ("text/x-c++", FileCategory::Code),
    ("text/x-java", FileCategory::Code),
    ("text/x-go", FileCategory::Code),
    ("text/x-sh", FileCategory::Code),
    ("text/x-yaml", FileCategory::Code),
];

impl FileCategory {
    /// Categorize a MIME type string. Parameters (`; charset=…`) and case
    /// are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = essence(mime);
        if essence.is_empty() {
            return Self::Unknown;
        }

        if let Some((_, category)) = EXACT.iter().find(|(m, _)| *m == essence) {
            return *category;
        }

        match essence.split('/').next().unwrap_or("") {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            _ => Self::Unknown,
        }
    }

    /// Categorize a file, falling back to its extension when the declared
    /// type is missing or generic (`application/octet-stream`).
    pub fn for_file(name: &str, mime: Option<&str>) -> Self {
        let declared = mime.map(Self::from_mime).unwrap_or(Self::Unknown);
        if declared != Self::Unknown {
            return declared;
        }
        match mime_guess::from_path(name).first() {
            Some(guess) => Self::from_mime(guess.essence_str()),
            None => Self::Unknown,
        }
    }

    /// Lower-case name, used in listings and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Icon => "icon",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Code => "code",
            Self::Sheet => "sheet",
            Self::Word => "word",
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Zip => "zip",
            Self::Ebook => "ebook",
            Self::Calendar => "calendar",
            Self::Presentation => "presentation",
            Self::Chart => "chart",
            Self::Postscript => "postscript",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"Text/HTML; charset=utf-8"` → `"text/html"`.
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_before_prefix() {
        assert_eq!(FileCategory::from_mime("image/x-icon"), FileCategory::Icon);
        assert_eq!(FileCategory::from_mime("image/png"), FileCategory::Image);
        assert_eq!(FileCategory::from_mime("text/markdown"), FileCategory::Markdown);
        assert_eq!(FileCategory::from_mime("text/plain"), FileCategory::Text);
        assert_eq!(FileCategory::from_mime("text/csv"), FileCategory::Sheet);
    }

    #[test]
    fn test_parameters_and_case_ignored() {
        assert_eq!(
            FileCategory::from_mime("Application/PDF; name=\"a.pdf\""),
            FileCategory::Pdf
        );
    }

    #[test]
    fn test_unknown_types() {
        assert_eq!(
            FileCategory::from_mime("application/octet-stream"),
            FileCategory::Unknown
        );
        assert_eq!(FileCategory::from_mime(""), FileCategory::Unknown);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            FileCategory::for_file("holiday.jpeg", Some("application/octet-stream")),
            FileCategory::Image
        );
        assert_eq!(
            FileCategory::for_file("report.pdf", None),
            FileCategory::Pdf
        );
        assert_eq!(
            FileCategory::for_file("photo.jpg", Some("image/png")),
            FileCategory::Image
        );
    }
}
