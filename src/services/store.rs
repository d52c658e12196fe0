use crate::error::StoreError;
use crate::models::{
    default_templates, ExtractionTemplate, HistoryStats, NewExtraction, StoredExtraction,
    TemplateDraft, TemplateUpdate,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub const HISTORY_KEY: &str = "extraction_history";
pub const TEMPLATES_KEY: &str = "extraction_templates";
/// Most-recent history entries kept; older ones are evicted on save.
pub const MAX_HISTORY: usize = 50;

/// Synchronous string namespace backing the store.
pub trait KeyValue {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<K: KeyValue + ?Sized> KeyValue for Box<K> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

static ID_SEQ: AtomicU64 = AtomicU64::new(0);

fn to_radix36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut s = Vec::new();
    while n > 0 {
        s.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    s.reverse();
    String::from_utf8(s).unwrap_or_default()
}

/// `<prefix>_<millis>_<nanos36>_<seq36>`; unique within the process.
fn generate_id(prefix: &str) -> String {
    let now = chrono::Utc::now();
    let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = u64::from(now.timestamp_subsec_nanos());
    format!(
        "{}_{}_{}_{}",
        prefix,
        now.timestamp_millis(),
        to_radix36(nanos),
        to_radix36(seq + 36 * 36)
    )
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// History and template collections over one key-value namespace. The store is the only writer
/// to its two keys. Each write is a read-all / modify / write-all cycle and is not atomic across
/// processes.
pub struct Store<K: KeyValue> {
    kv: K,
}

impl<K: KeyValue> Store<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// `None` when the key is absent, unreadable or corrupt.
    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = match self.kv.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "storage unavailable");
                return None;
            }
        };
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(key, error = %e, "corrupt collection ignored");
                None
            }
        }
    }

    fn write_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(items)?;
        self.kv.set(key, &raw)
    }

    // ---- history ----

    /// Most-recent-first. Unavailable or corrupt storage reads as empty.
    pub fn list_history(&self) -> Vec<StoredExtraction> {
        self.read_collection(HISTORY_KEY).unwrap_or_default()
    }

    pub fn get_history(&self, id: &str) -> Option<StoredExtraction> {
        self.list_history().into_iter().find(|e| e.id == id)
    }

    /// Prepend a new entry and evict anything beyond the newest `MAX_HISTORY`.
    pub fn create_history(&self, entry: NewExtraction) -> Result<StoredExtraction, StoreError> {
        let now = chrono::Local::now();
        let stored = StoredExtraction {
            id: generate_id("ext"),
            filename: entry.filename,
            document_type: entry.document_type,
            date: now.format("%Y-%m-%d").to_string(),
            size: entry.size,
            status: entry.status,
            extracted_data: entry.extracted_data,
            timestamp: now.timestamp_millis(),
        };
        let mut history = self.list_history();
        history.insert(0, stored.clone());
        history.truncate(MAX_HISTORY);
        self.write_collection(HISTORY_KEY, &history)?;
        debug!(id = %stored.id, count = history.len(), "history entry saved");
        Ok(stored)
    }

    /// Absent ids are a no-op.
    pub fn delete_history(&self, id: &str) -> Result<(), StoreError> {
        let history = self.list_history();
        let before = history.len();
        let remaining: Vec<StoredExtraction> = history.into_iter().filter(|e| e.id != id).collect();
        if remaining.len() == before {
            return Ok(());
        }
        self.write_collection(HISTORY_KEY, &remaining)
    }

    pub fn clear_history(&self) -> Result<(), StoreError> {
        self.kv.remove(HISTORY_KEY)
    }

    /// Case-insensitive filename substring AND case-insensitive exact type. Empty query or a type
    /// filter of `all` matches everything on that axis.
    pub fn search_history(&self, query: &str, type_filter: Option<&str>) -> Vec<StoredExtraction> {
        let query = query.trim().to_lowercase();
        let type_filter = type_filter
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty() && t != "all");
        self.list_history()
            .into_iter()
            .filter(|e| {
                type_filter
                    .as_deref()
                    .map(|t| e.document_type.to_lowercase() == t)
                    .unwrap_or(true)
            })
            .filter(|e| query.is_empty() || e.filename.to_lowercase().contains(&query))
            .collect()
    }

    pub fn history_stats(&self) -> HistoryStats {
        HistoryStats::from_entries(&self.list_history())
    }

    // ---- templates ----

    /// Built-in templates are returned while nothing (readable) has been stored.
    pub fn list_templates(&self) -> Vec<ExtractionTemplate> {
        self.read_collection(TEMPLATES_KEY)
            .unwrap_or_else(default_templates)
    }

    pub fn get_template(&self, id: &str) -> Option<ExtractionTemplate> {
        self.list_templates().into_iter().find(|t| t.id == id)
    }

    pub fn create_template(&self, draft: TemplateDraft) -> Result<ExtractionTemplate, StoreError> {
        draft.validate().map_err(StoreError::Invalid)?;
        let now = today();
        let template = ExtractionTemplate {
            id: generate_id("tpl"),
            name: draft.name,
            description: draft.description,
            fields: draft.fields,
            document_type: draft.document_type,
            created_date: now.clone(),
            updated_date: now,
        };
        let mut templates = self.list_templates();
        templates.insert(0, template.clone());
        self.write_collection(TEMPLATES_KEY, &templates)?;
        Ok(template)
    }

    /// `Ok(None)` when no template has this id.
    pub fn update_template(
        &self,
        id: &str,
        update: TemplateUpdate,
    ) -> Result<Option<ExtractionTemplate>, StoreError> {
        let mut templates = self.list_templates();
        let Some(template) = templates.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        update.apply(template, &today());
        if template.name.trim().is_empty() || template.fields.is_empty() {
            return Err(StoreError::Invalid(
                "Template needs a name and at least one field.".to_string(),
            ));
        }
        let updated = template.clone();
        self.write_collection(TEMPLATES_KEY, &templates)?;
        Ok(Some(updated))
    }

    pub fn delete_template(&self, id: &str) -> Result<(), StoreError> {
        let templates: Vec<ExtractionTemplate> = self
            .list_templates()
            .into_iter()
            .filter(|t| t.id != id)
            .collect();
        self.write_collection(TEMPLATES_KEY, &templates)
    }

    /// Forget stored templates so the built-in ones show again.
    pub fn reset_templates(&self) -> Result<(), StoreError> {
        self.kv.remove(TEMPLATES_KEY)
    }
}
