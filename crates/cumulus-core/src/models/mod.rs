pub mod file;
pub mod policy;
pub mod thumb;

pub use file::{format_pic_info, File};
pub use policy::StoragePolicy;
pub use thumb::ThumbSize;
