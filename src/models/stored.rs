use crate::types::ExtractionRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Completed,
    Processing,
    Error,
}

/// One saved review session. Entries are never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredExtraction {
    pub id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub document_type: String,
    pub date: String,
    pub size: String,
    pub status: ExtractionStatus,
    pub extracted_data: ExtractionRecord,
    pub timestamp: i64,
}

/// Entry contents supplied on save; id, date and timestamp are stamped by the store.
#[derive(Debug, Clone)]
pub struct NewExtraction {
    pub filename: String,
    pub document_type: String,
    pub size: String,
    pub status: ExtractionStatus,
    pub extracted_data: ExtractionRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub completed: usize,
    pub processing: usize,
    pub errors: usize,
    pub by_type: BTreeMap<String, usize>,
}

impl HistoryStats {
    pub fn from_entries(entries: &[StoredExtraction]) -> Self {
        let mut stats = HistoryStats {
            total: entries.len(),
            ..Default::default()
        };
        for e in entries {
            match e.status {
                ExtractionStatus::Completed => stats.completed += 1,
                ExtractionStatus::Processing => stats.processing += 1,
                ExtractionStatus::Error => stats.errors += 1,
            }
            *stats.by_type.entry(e.document_type.to_lowercase()).or_insert(0) += 1;
        }
        stats
    }
}
