//! Media-type to file-extension mapping used when an upload carries no
//! explicit extension.

/// Known media types and their canonical extension, sorted by media type.
const EXTENSIONS: &[(&str, &str)] = &[
    ("application/atom+xml", ".atom"),
    ("application/epub+zip", ".epub"),
    ("application/gzip", ".gz"),
    ("application/java-archive", ".jar"),
    ("application/javascript", ".js"),
    ("application/json", ".json"),
    ("application/ld+json", ".jsonld"),
    ("application/manifest+json", ".webmanifest"),
    ("application/msword", ".doc"),
    ("application/ogg", ".ogx"),
    ("application/pdf", ".pdf"),
    ("application/pgp-signature", ".sig"),
    ("application/postscript", ".ps"),
    ("application/rss+xml", ".rss"),
    ("application/rtf", ".rtf"),
    ("application/sql", ".sql"),
    ("application/toml", ".toml"),
    ("application/vnd.amazon.ebook", ".azw"),
    ("application/vnd.android.package-archive", ".apk"),
    ("application/vnd.apple.installer+xml", ".mpkg"),
    ("application/vnd.apple.mpegurl", ".m3u8"),
    ("application/vnd.ms-excel", ".xls"),
    ("application/vnd.ms-fontobject", ".eot"),
    ("application/vnd.ms-powerpoint", ".ppt"),
    ("application/vnd.oasis.opendocument.presentation", ".odp"),
    ("application/vnd.oasis.opendocument.spreadsheet", ".ods"),
    ("application/vnd.oasis.opendocument.text", ".odt"),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", ".pptx"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ".xlsx"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", ".docx"),
    ("application/vnd.rar", ".rar"),
    ("application/vnd.visio", ".vsd"),
    ("application/wasm", ".wasm"),
    ("application/x-7z-compressed", ".7z"),
    ("application/x-bzip", ".bz"),
    ("application/x-bzip2", ".bz2"),
    ("application/x-cdf", ".cda"),
    ("application/x-csh", ".csh"),
    ("application/x-freearc", ".arc"),
    ("application/x-gzip", ".gz"),
    ("application/x-httpd-php", ".php"),
    ("application/x-iso9660-image", ".iso"),
    ("application/x-javascript", ".js"),
    ("application/x-msdownload", ".exe"),
    ("application/x-rar-compressed", ".rar"),
    ("application/x-sh", ".sh"),
    ("application/x-shockwave-flash", ".swf"),
    ("application/x-tar", ".tar"),
    ("application/x-x509-ca-cert", ".crt"),
    ("application/x-xz", ".xz"),
    ("application/x-yaml", ".yaml"),
    ("application/x-zip-compressed", ".zip"),
    ("application/xhtml+xml", ".xhtml"),
    ("application/xml", ".xml"),
    ("application/yaml", ".yaml"),
    ("application/zip", ".zip"),
    ("application/zstd", ".zst"),
    ("audio/3gpp", ".3gp"),
    ("audio/3gpp2", ".3g2"),
    ("audio/aac", ".aac"),
    ("audio/aiff", ".aiff"),
    ("audio/amr", ".amr"),
    ("audio/flac", ".flac"),
    ("audio/midi", ".mid"),
    ("audio/mp4", ".m4a"),
    ("audio/mpeg", ".mp3"),
    ("audio/ogg", ".oga"),
    ("audio/opus", ".opus"),
    ("audio/wav", ".wav"),
    ("audio/wave", ".wav"),
    ("audio/webm", ".weba"),
    ("audio/x-aiff", ".aiff"),
    ("audio/x-flac", ".flac"),
    ("audio/x-m4a", ".m4a"),
    ("audio/x-matroska", ".mka"),
    ("audio/x-midi", ".mid"),
    ("audio/x-ms-wma", ".wma"),
    ("audio/x-wav", ".wav"),
    ("font/collection", ".ttc"),
    ("font/otf", ".otf"),
    ("font/ttf", ".ttf"),
    ("font/woff", ".woff"),
    ("font/woff2", ".woff2"),
    ("image/apng", ".apng"),
    ("image/avif", ".avif"),
    ("image/bmp", ".bmp"),
    ("image/gif", ".gif"),
    ("image/heic", ".heic"),
    ("image/heif", ".heif"),
    ("image/jp2", ".jp2"),
    ("image/jpeg", ".jpg"),
    ("image/jxl", ".jxl"),
    ("image/pjpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/svg+xml", ".svg"),
    ("image/tiff", ".tiff"),
    ("image/vnd.adobe.photoshop", ".psd"),
    ("image/vnd.microsoft.icon", ".ico"),
    ("image/webp", ".webp"),
    ("image/x-icon", ".ico"),
    ("image/x-ms-bmp", ".bmp"),
    ("image/x-png", ".png"),
    ("model/gltf+json", ".gltf"),
    ("model/gltf-binary", ".glb"),
    ("model/obj", ".obj"),
    ("model/stl", ".stl"),
    ("text/calendar", ".ics"),
    ("text/css", ".css"),
    ("text/csv", ".csv"),
    ("text/html", ".html"),
    ("text/javascript", ".js"),
    ("text/markdown", ".md"),
    ("text/plain", ".txt"),
    ("text/rtf", ".rtf"),
    ("text/tab-separated-values", ".tsv"),
    ("text/vcard", ".vcf"),
    ("text/vtt", ".vtt"),
    ("text/x-c", ".c"),
    ("text/x-csrc", ".c"),
    ("text/x-java-source", ".java"),
    ("text/x-markdown", ".md"),
    ("text/x-python", ".py"),
    ("text/x-rust", ".rs"),
    ("text/x-yaml", ".yaml"),
    ("text/xml", ".xml"),
    ("text/yaml", ".yaml"),
    ("video/3gpp", ".3gp"),
    ("video/3gpp2", ".3g2"),
    ("video/mp2t", ".ts"),
    ("video/mp4", ".mp4"),
    ("video/mpeg", ".mpeg"),
    ("video/ogg", ".ogv"),
    ("video/quicktime", ".mov"),
    ("video/webm", ".webm"),
    ("video/x-flv", ".flv"),
    ("video/x-m4v", ".m4v"),
    ("video/x-matroska", ".mkv"),
    ("video/x-ms-wmv", ".wmv"),
    ("video/x-msvideo", ".avi"),
];

/// Extension (with leading dot) for `content_type`, ignoring parameters and case.
///
/// `application/octet-stream` deliberately has no mapping: arbitrary bytes
/// carry no extension information.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    EXTENSIONS
        .binary_search_by(|(media_type, _)| (*media_type).cmp(essence.as_str()))
        .ok()
        .map(|idx| EXTENSIONS[idx].1)
}
