//! MIME handling for streamed responses
//!
//! Classifies objects as streamable or not, remaps stored MIME types to ones
//! browsers actually play, and guesses a type from a file extension when the
//! store did not record one.

/// True for MIME classes a browser can render inline
pub fn is_streamable(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
        || mime_type.starts_with("audio/")
        || mime_type.starts_with("image/")
}

/// Remap a stored MIME type to a browser-compatible one.
///
/// MKV in particular is served as MP4; already-compatible types pass through
/// unchanged, so the mapping is idempotent.
pub fn browser_compatible(mime_type: &str) -> &str {
    match mime_type {
        "video/x-matroska" => "video/mp4",
        "video/x-msvideo" => "video/mp4",
        "video/quicktime" => "video/mp4",
        "audio/x-flac" => "audio/mpeg",
        "audio/x-wav" => "audio/wav",
        "audio/x-m4a" => "audio/mp4",
        other => {
            if other.starts_with("video/")
                && !matches!(other, "video/mp4" | "video/webm" | "video/ogg")
            {
                "video/mp4"
            } else if other.starts_with("audio/")
                && !matches!(other, "audio/mpeg" | "audio/wav" | "audio/ogg" | "audio/mp4")
            {
                "audio/mpeg"
            } else {
                other
            }
        }
    }
}

/// Guess a MIME type from a file extension
pub fn from_file_name(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        // Video
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "3gp" => "video/3gpp",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        // Documents
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
