use crate::config::AppConfig;
use crate::db::Db;
use crate::error::RelayError;
use crate::export::{self, ExportFormat};
use crate::models::{
    ExtractionStatus, ExtractionTemplate, FieldIssue, HistoryStats, StoredExtraction,
    TemplateDraft, TemplateUpdate,
};
use crate::preview::{DocumentPreview, PreviewView};
use crate::relay::{CancelHandle, ExtractionJob, ExtractionRelay};
use crate::services::{CommitMeta, ReconcileConfig, ReconcileSnapshot, Reconciler, Store};
use crate::types::{DocumentType, ItemPatch, Scalar, Upload};
use crate::validate::{self, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Upload that produced the record currently under review.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub file_name: String,
    pub document_type: DocumentType,
    pub size_bytes: u64,
}

/// Per-window review session.
pub struct Session {
    pub reconciler: Reconciler,
    pub preview: DocumentPreview,
    pub upload: Option<UploadInfo>,
    pending: Option<CancelHandle>,
    generation: u64,
}

impl Session {
    pub fn new(auto_calculate: bool) -> Self {
        Self {
            reconciler: Reconciler::for_document_type(
                ReconcileConfig { auto_calculate },
                DocumentType::Other,
            ),
            preview: DocumentPreview::new(),
            upload: None,
            pending: None,
            generation: 0,
        }
    }

    pub fn is_extracting(&self) -> bool {
        self.pending.is_some()
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub store: Store<Db>,
    pub relay: Arc<dyn ExtractionRelay>,
    pub session: Mutex<Session>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Db, relay: Arc<dyn ExtractionRelay>) -> Self {
        let session = Session::new(config.auto_calculate);
        Self {
            config,
            store: Store::new(db),
            relay,
            session: Mutex::new(session),
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, Session>, String> {
        self.session.lock().map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionView {
    pub session: ReconcileSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistoryPayload {
    pub search: Option<String>,
    pub document_type: Option<String>,
}

fn parse_document_type(tag: Option<&str>) -> Result<DocumentType, String> {
    match tag {
        None => Ok(DocumentType::Other),
        Some(t) if t.trim().is_empty() => Ok(DocumentType::Other),
        Some(t) => DocumentType::parse(t).ok_or_else(|| format!("Unknown document type '{}'.", t)),
    }
}

fn patch_from_json(patch: &serde_json::Map<String, Value>) -> ItemPatch {
    patch
        .iter()
        .map(|(k, v)| (k.clone(), Scalar::from_json(v)))
        .collect()
}

pub fn validate_document_file(path: String) -> Result<ValidationResult, String> {
    let path = Path::new(&path);
    if !path.exists() {
        return Ok(ValidationResult {
            valid: false,
            error: Some("File not found.".to_string()),
        });
    }
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    let mime = validate::mime_for_path(path);
    Ok(validate::validate_upload(mime, metadata.len()).into())
}

/// Validate, submit and load the result into the session. Blocks until the backend answers; the
/// session lock is not held while waiting so `cancel_extraction` can interrupt.
pub fn run_extraction(
    state: &AppState,
    path: String,
    document_type: Option<String>,
) -> Result<ExtractionView, String> {
    let document_type = parse_document_type(document_type.as_deref())?;
    let upload = Upload::from_path(Path::new(&path))?;
    validate::validate_upload(&upload.mime_type, upload.size()).map_err(|e| e.to_string())?;

    let job = ExtractionJob::spawn(Arc::clone(&state.relay), upload.clone(), document_type);
    let generation = {
        let mut session = state.session()?;
        if let Some(previous) = session.pending.take() {
            previous.cancel();
        }
        session.pending = Some(job.cancel_handle());
        session.generation += 1;
        session.generation
    };
    info!(file = %upload.file_name, document_type = %document_type, "extraction started");

    let result = job.wait();

    let mut session = state.session()?;
    if session.generation != generation {
        return Err(RelayError::Cancelled.to_string());
    }
    session.pending = None;
    let envelope = match result {
        Ok(envelope) => envelope,
        Err(RelayError::Cancelled) => {
            session.reconciler.reset();
            session.preview.clear();
            session.upload = None;
            info!(file = %upload.file_name, "extraction cancelled");
            return Err(RelayError::Cancelled.to_string());
        }
        Err(e) => {
            warn!(file = %upload.file_name, error = %e, "extraction failed");
            return Err(e.to_string());
        }
    };

    let execution_time = envelope.execution_time;
    let config = session.reconciler.config();
    session.reconciler = Reconciler::for_document_type(config, document_type);
    session.reconciler.load_envelope(envelope);
    if let Err(e) = session.preview.show(&upload) {
        warn!(file = %upload.file_name, error = %e, "preview unavailable");
        session.preview.clear();
    }
    session.upload = Some(UploadInfo {
        file_name: upload.file_name.clone(),
        document_type,
        size_bytes: upload.size(),
    });
    Ok(ExtractionView {
        session: session.reconciler.snapshot(),
        preview: session.preview.view(),
        execution_time,
    })
}

/// Returns whether an extraction was in flight.
pub fn cancel_extraction(state: &AppState) -> Result<bool, String> {
    let mut session = state.session()?;
    match session.pending.take() {
        Some(handle) => {
            handle.cancel();
            session.generation += 1;
            session.reconciler.reset();
            session.preview.clear();
            session.upload = None;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub fn get_record(state: &AppState) -> Result<ExtractionView, String> {
    let session = state.session()?;
    Ok(ExtractionView {
        session: session.reconciler.snapshot(),
        preview: session.preview.view(),
        execution_time: None,
    })
}

pub fn set_field(state: &AppState, key: String, value: Value) -> Result<ReconcileSnapshot, String> {
    let mut session = state.session()?;
    session
        .reconciler
        .set_field(&key, Scalar::from_json(&value))
        .map_err(|e| e.to_string())?;
    Ok(session.reconciler.snapshot())
}

/// Focus raises the highlight in both the form and the preview.
pub fn focus_field(state: &AppState, key: Option<String>) -> Result<(), String> {
    let mut session = state.session()?;
    match key {
        Some(key) => {
            session.reconciler.focus_field(&key);
            session.preview.highlight(&key);
        }
        None => {
            session.reconciler.blur();
            session.preview.clear_highlight();
        }
    }
    Ok(())
}

pub fn update_item(
    state: &AppState,
    index: usize,
    patch: serde_json::Map<String, Value>,
) -> Result<ReconcileSnapshot, String> {
    let mut session = state.session()?;
    session
        .reconciler
        .update_item(index, patch_from_json(&patch))
        .map_err(|e| e.to_string())?;
    Ok(session.reconciler.snapshot())
}

pub fn add_item(state: &AppState) -> Result<ReconcileSnapshot, String> {
    let mut session = state.session()?;
    session.reconciler.add_item().map_err(|e| e.to_string())?;
    Ok(session.reconciler.snapshot())
}

pub fn remove_item(state: &AppState, index: usize) -> Result<ReconcileSnapshot, String> {
    let mut session = state.session()?;
    session
        .reconciler
        .remove_item(index)
        .map_err(|e| e.to_string())?;
    Ok(session.reconciler.snapshot())
}

pub fn set_auto_calculate(state: &AppState, enabled: bool) -> Result<ReconcileSnapshot, String> {
    let mut session = state.session()?;
    session.reconciler.set_auto_calculate(enabled);
    Ok(session.reconciler.snapshot())
}

/// Write the export next to `dir` (or the configured/default folder); returns the file path.
pub fn export_record(state: &AppState, format: String, dir: Option<String>) -> Result<String, String> {
    let format = ExportFormat::parse(&format).map_err(|e| e.to_string())?;
    let artifact = {
        let mut session = state.session()?;
        session.reconciler.export(format).map_err(|e| e.to_string())?
    };
    let dir = dir.map(PathBuf::from).or_else(|| state.config.export_dir.clone());
    let path = export::write_artifact(&artifact, dir.as_deref()).map_err(|e| e.to_string())?;
    info!(path = %path.display(), "export written");
    path.to_str()
        .map(String::from)
        .ok_or_else(|| "Invalid path".to_string())
}

pub fn save_extraction(state: &AppState) -> Result<StoredExtraction, String> {
    let mut session = state.session()?;
    let upload = session
        .upload
        .clone()
        .ok_or_else(|| "No extraction to save.".to_string())?;
    let meta = CommitMeta {
        file_name: upload.file_name,
        document_type: upload.document_type,
        size_bytes: upload.size_bytes,
        status: ExtractionStatus::Completed,
    };
    session
        .reconciler
        .commit(&state.store, meta)
        .map_err(|e| e.to_string())
}

pub fn get_history(
    state: &AppState,
    payload: Option<GetHistoryPayload>,
) -> Result<Vec<StoredExtraction>, String> {
    let payload = payload.unwrap_or_default();
    let search = payload.search.unwrap_or_default();
    Ok(state
        .store
        .search_history(&search, payload.document_type.as_deref()))
}

pub fn get_history_by_id(state: &AppState, id: String) -> Result<Option<StoredExtraction>, String> {
    Ok(state.store.get_history(&id))
}

pub fn delete_history_record(state: &AppState, id: String) -> Result<(), String> {
    state.store.delete_history(&id).map_err(|e| e.to_string())
}

pub fn clear_history(state: &AppState) -> Result<(), String> {
    state.store.clear_history().map_err(|e| e.to_string())
}

pub fn get_history_stats(state: &AppState) -> Result<HistoryStats, String> {
    Ok(state.store.history_stats())
}

pub fn get_templates(state: &AppState) -> Result<Vec<ExtractionTemplate>, String> {
    Ok(state.store.list_templates())
}

pub fn save_template(state: &AppState, draft: TemplateDraft) -> Result<ExtractionTemplate, String> {
    state.store.create_template(draft).map_err(|e| e.to_string())
}

pub fn update_template(
    state: &AppState,
    id: String,
    update: TemplateUpdate,
) -> Result<Option<ExtractionTemplate>, String> {
    state
        .store
        .update_template(&id, update)
        .map_err(|e| e.to_string())
}

pub fn delete_template(state: &AppState, id: String) -> Result<(), String> {
    state.store.delete_template(&id).map_err(|e| e.to_string())
}

/// Required-field and type problems of the current record against a template.
pub fn check_against_template(state: &AppState, id: String) -> Result<Vec<FieldIssue>, String> {
    let template = state
        .store
        .get_template(&id)
        .ok_or_else(|| "Template not found.".to_string())?;
    let session = state.session()?;
    let record = session
        .reconciler
        .record()
        .ok_or_else(|| "No extraction is loaded".to_string())?;
    Ok(template.check_record(record))
}

/// Review the live record with a template's field list. The record itself is unchanged apart
/// from the totals recompute.
pub fn apply_template(state: &AppState, id: String) -> Result<ReconcileSnapshot, String> {
    let template = state
        .store
        .get_template(&id)
        .ok_or_else(|| "Template not found.".to_string())?;
    let mut session = state.session()?;
    let record = session
        .reconciler
        .record()
        .cloned()
        .ok_or_else(|| "No extraction is loaded".to_string())?;
    let config = session.reconciler.config();
    let document_type = session.reconciler.document_type();
    let mut reconciler = Reconciler::for_template(config, &template, document_type);
    reconciler.load(record);
    session.reconciler = reconciler;
    info!(template = %template.id, "template applied");
    Ok(session.reconciler.snapshot())
}
