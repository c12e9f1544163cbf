//! Source classification by file extension

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi"];

/// What kind of derivative source a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

/// Extension after the last `.`, lowercased. Names without a dot have none.
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn classify(name: &str) -> MediaKind {
    match extension(name) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
        _ => MediaKind::Unsupported,
    }
}

/// Videos get a preview frame before their thumbnail.
pub fn is_video(name: &str) -> bool {
    classify(name) == MediaKind::Video
}
