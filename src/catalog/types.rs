use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable catalog entry for one probe file.
///
/// `id` is assigned at ingestion and strictly increases within every
/// (subject, tier) partition, which is what lets a delivery cursor walk the
/// partition without repeats or gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub subject: String,
    pub tier: String,
    pub label: String,
    /// Opaque handle to the stored file (a transport file id or URL).
    pub file_ref: String,
    pub ingested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_serializes_with_file_ref() {
        let item = Item {
            id: 3,
            subject: "math".to_string(),
            tier: "free".to_string(),
            label: "Variant 3".to_string(),
            file_ref: "file-abc".to_string(),
            ingested_at: Utc::now(),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["file_ref"], "file-abc");
    }
}
