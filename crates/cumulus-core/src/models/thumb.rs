use serde::{Deserialize, Serialize};

/// Target box a thumbnail is fitted into. Resolved from settings per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}
