//! Content types and extensions that may never be attached.

use super::category::essence;

/// MIME types rejected at upload time.
pub const BANNED_CONTENT_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-ms-installer",
    "application/x-msi",
    "application/x-dosexec",
    "application/x-executable",
    "application/x-bat",
    "application/x-ms-shortcut",
    "application/hta",
    "application/x-ms-application",
    "application/vnd.microsoft.portable-executable",
];

/// File extensions rejected at upload time, lower-case without the dot.
pub const BANNED_FILE_EXTENSIONS: &[&str] = &[
    "ade", "adp", "apk", "appx", "bat", "cab", "chm", "cmd", "com", "cpl", "dll", "dmg", "exe",
    "hta", "ins", "isp", "jar", "jse", "lib", "lnk", "mde", "msc", "msi", "msix", "msp", "mst",
    "nsh", "pif", "ps1", "scr", "sct", "shb", "sys", "vb", "vbe", "vbs", "vxd", "wsc", "wsf",
    "wsh",
];

/// `true` if the declared type or the filename extension is banned.
pub fn is_banned(name: &str, content_type: &str) -> bool {
    let essence = essence(content_type);
    if BANNED_CONTENT_TYPES.contains(&essence.as_str()) {
        return true;
    }
    match extension(name) {
        Some(ext) => BANNED_FILE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// Inline SVG would let markup (and scripts) into the rendered body.
pub fn is_inline_svg(content_type: &str, inline: bool) -> bool {
    inline && essence(content_type) == "image/svg+xml"
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.trim().to_ascii_lowercase())
}
