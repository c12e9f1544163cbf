//! Dynamic setting keys read by the derivative pipeline, with their defaults.

/// Maximum number of concurrent derivative jobs. `<= 0` means host parallelism.
pub const THUMB_MAX_TASK_COUNT: &str = "thumb_max_task_count";
pub const DEFAULT_THUMB_MAX_TASK_COUNT: i64 = -1;

pub const THUMB_WIDTH: &str = "thumb_width";
pub const DEFAULT_THUMB_WIDTH: i64 = 400;

pub const THUMB_HEIGHT: &str = "thumb_height";
pub const DEFAULT_THUMB_HEIGHT: i64 = 300;

/// Suffix appended to a source name to form its thumbnail name.
pub const THUMB_FILE_SUFFIX: &str = "thumb_file_suffix";
pub const DEFAULT_THUMB_FILE_SUFFIX: &str = "._thumb";

/// Suffix appended to a video source name to form its preview frame name.
pub const PREVIEW_FILE_SUFFIX: &str = "preview_file_suffix";
pub const DEFAULT_PREVIEW_FILE_SUFFIX: &str = "._preview.jpeg";

/// Cache max-age (seconds) stamped on thumbnails served by a master node.
pub const PREVIEW_TIMEOUT: &str = "preview_timeout";
pub const DEFAULT_PREVIEW_TIMEOUT: i64 = 60;

pub const THUMB_GC_AFTER_GEN: &str = "thumb_gc_after_gen";

/// `jpg` or `png`
pub const THUMB_ENCODE_METHOD: &str = "thumb_encode_method";
pub const DEFAULT_THUMB_ENCODE_METHOD: &str = "jpg";

pub const THUMB_ENCODE_QUALITY: &str = "thumb_encode_quality";
pub const DEFAULT_THUMB_ENCODE_QUALITY: i64 = 85;

/// Images larger than this many bytes are not thumbnailed. `0` (the default)
/// means no limit.
pub const THUMB_MAX_SRC_SIZE: &str = "thumb_max_src_size";
pub const DEFAULT_THUMB_MAX_SRC_SIZE: i64 = 0;
