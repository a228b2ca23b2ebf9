//! Media-type sniffing for downloaded files and generated images.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Resolve the media type of a downloaded payload.
///
/// A specific `Content-Type` header wins; otherwise the bytes are sniffed, then the
/// URL extension is consulted.
pub fn resolve_media_type(header: Option<&str>, bytes: &[u8], url: &str) -> String {
    let header = header
        .and_then(|h| h.split(';').next())
        .map(str::trim)
        .filter(|h| !h.is_empty() && *h != OCTET_STREAM);
    if let Some(h) = header {
        return h.to_ascii_lowercase();
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first_raw()
        .map_or_else(|| OCTET_STREAM.to_string(), str::to_string)
}

/// Media type for an image `output_format` value (`png`, `jpeg`, `webp`).
pub fn image_format_media_type(format: Option<&str>) -> &'static str {
    match format.map(str::to_ascii_lowercase).as_deref() {
        Some("jpeg" | "jpg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

/// Upload file name for a blob of `media_type`, e.g. `image.png`.
pub fn file_name_for(media_type: &str) -> String {
    let ext = mime_guess::get_mime_extensions_str(media_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("bin");
    format!("image.{ext}")
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

/// Split a `data:{media};base64,{payload}` URL.
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let media = meta.strip_suffix(";base64")?;
    Some((if media.is_empty() { OCTET_STREAM } else { media }, payload))
}
