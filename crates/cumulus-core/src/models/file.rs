use serde::{Deserialize, Serialize};

/// A stored file.
///
/// `pic_info` holds `"width,height"` once a derivative has been generated
/// and is empty before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// `None` for a transient record that has not been persisted yet.
    pub id: Option<i64>,
    pub name: String,
    /// Backend-relative path or object key.
    pub source_name: String,
    pub size: u64,
    pub pic_info: String,
    pub policy_id: i64,
}

impl File {
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn has_pic_info(&self) -> bool {
        !self.pic_info.is_empty()
    }

    /// Native dimensions recorded in `pic_info`, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.pic_info.split_once(',')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

pub fn format_pic_info(width: u32, height: u32) -> String {
    format!("{},{}", width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(pic_info: &str) -> File {
        File {
            id: Some(1),
            name: "cat.jpg".to_string(),
            source_name: "uploads/1/cat.jpg".to_string(),
            size: 2048,
            pic_info: pic_info.to_string(),
            policy_id: 1,
        }
    }

    #[test]
    fn test_dimensions_parsed_from_pic_info() {
        assert_eq!(file("800,600").dimensions(), Some((800, 600)));
        assert_eq!(file(&format_pic_info(12, 34)).dimensions(), Some((12, 34)));
    }

    #[test]
    fn test_dimensions_absent_or_malformed() {
        assert!(!file("").has_pic_info());
        assert_eq!(file("").dimensions(), None);
        assert_eq!(file("800").dimensions(), None);
        assert_eq!(file("a,b").dimensions(), None);
    }
}
