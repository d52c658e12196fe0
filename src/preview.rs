use crate::types::Upload;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Pdf,
    File,
}

/// Binary view of the current upload. The temp file is deleted when this is dropped.
#[derive(Debug)]
enum PreviewResource {
    Image { data_url: String },
    File { kind: PreviewKind, file: NamedTempFile },
}

impl PreviewResource {
    fn kind(&self) -> PreviewKind {
        match self {
            PreviewResource::Image { .. } => PreviewKind::Image,
            PreviewResource::File { kind, .. } => *kind,
        }
    }

    fn locator(&self) -> String {
        match self {
            PreviewResource::Image { data_url } => data_url.clone(),
            PreviewResource::File { file, .. } => file.path().to_string_lossy().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewView {
    pub kind: PreviewKind,
    pub file_name: String,
    pub locator: String,
    pub highlighted: Option<String>,
}

#[derive(Debug, Default)]
pub struct DocumentPreview {
    current: Option<(String, PreviewResource)>,
    highlighted: Option<String>,
}

impl DocumentPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a view of `upload`, releasing the previous one first.
    pub fn show(&mut self, upload: &Upload) -> std::io::Result<()> {
        self.clear();
        let resource = if upload.mime_type.starts_with("image/") {
            PreviewResource::Image {
                data_url: format!("data:{};base64,{}", upload.mime_type, STANDARD.encode(&upload.bytes)),
            }
        } else {
            let suffix = Path::new(&upload.file_name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_default();
            let mut file = tempfile::Builder::new()
                .prefix("docxtract-preview-")
                .suffix(&suffix)
                .tempfile()?;
            file.write_all(&upload.bytes)?;
            file.flush()?;
            let kind = if upload.mime_type == "application/pdf" {
                PreviewKind::Pdf
            } else {
                PreviewKind::File
            };
            PreviewResource::File { kind, file }
        };
        debug!(file = %upload.file_name, kind = ?resource.kind(), "preview ready");
        self.current = Some((upload.file_name.clone(), resource));
        Ok(())
    }

    pub fn highlight(&mut self, field: &str) {
        self.highlighted = Some(field.to_string());
    }

    pub fn clear_highlight(&mut self) {
        self.highlighted = None;
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.highlighted = None;
    }

    pub fn view(&self) -> Option<PreviewView> {
        self.current.as_ref().map(|(name, resource)| PreviewView {
            kind: resource.kind(),
            file_name: name.clone(),
            locator: resource.locator(),
            highlighted: self.highlighted.clone(),
        })
    }
}
