use chrono::{TimeZone, Utc};

use crate::record::Record;

pub(crate) fn sample_record(id: &str, author: &str) -> Record {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Record {
        id: id.to_string(),
        author: author.to_string(),
        content: format!("content-{id}"),
        count: 0,
        favorites: vec!["ruby".to_string(), "gold".to_string()],
        sort_weight: 42,
        created_at: now,
        updated_at: now,
        committed_at: None,
    }
}
