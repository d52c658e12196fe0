use crate::format;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

/// Closed set of document tags accepted at the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    PackingList,
    Awb,
    Contract,
    BankStatement,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 7] = [
        DocumentType::Invoice,
        DocumentType::Receipt,
        DocumentType::PackingList,
        DocumentType::Awb,
        DocumentType::Contract,
        DocumentType::BankStatement,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::PackingList => "packing-list",
            DocumentType::Awb => "awb",
            DocumentType::Contract => "contract",
            DocumentType::BankStatement => "bank-statement",
            DocumentType::Other => "other",
        }
    }

    /// Parse a tag, including the legacy upload-page vocabulary (`kwitansi`, `laporan`).
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        let parsed = match tag.as_str() {
            "invoice" => DocumentType::Invoice,
            "receipt" | "kwitansi" => DocumentType::Receipt,
            "packing-list" | "packing_list" | "packinglist" => DocumentType::PackingList,
            "awb" => DocumentType::Awb,
            "contract" => DocumentType::Contract,
            "bank-statement" | "bank_statement" => DocumentType::BankStatement,
            "other" | "laporan" => DocumentType::Other,
            _ => return None,
        };
        Some(parsed)
    }

    /// Backend route for this type. Types without a dedicated route use the invoice extractor.
    pub fn endpoint(&self) -> &'static str {
        match self {
            DocumentType::PackingList => "/extract/packing-list",
            DocumentType::Awb => "/extract/awb",
            _ => "/extract/invoice",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single non-null field value as delivered by the backend or typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value. Text goes through the locale-aware parser.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Number(_) => None,
            Scalar::Text(s) => format::parse_number(s),
            Scalar::Bool(_) => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.trim().is_empty())
    }

    /// Convert a loosely-typed JSON value. Nested structures are kept as compact JSON text.
    pub fn from_json(value: &Value) -> Option<Scalar> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            other => Some(Scalar::Text(other.to_string())),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

/// Ordered key -> nullable value map. Order is the order keys arrived in.
pub type FieldMap = IndexMap<String, Option<Scalar>>;

/// Partial update for one line item; keys not present are left untouched.
pub type ItemPatch = IndexMap<String, Option<Scalar>>;

/// One row of an itemized section. Column keys depend on the document type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItem {
    cells: FieldMap,
}

impl LineItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row with every given column present and null.
    pub fn blank<S: AsRef<str>>(columns: &[S]) -> Self {
        let cells = columns
            .iter()
            .map(|c| (c.as_ref().to_string(), None))
            .collect();
        Self { cells }
    }

    pub fn with(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.cells.insert(key.to_string(), Some(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.cells.get(key).and_then(|v| v.as_ref())
    }

    pub fn set(&mut self, key: &str, value: Option<Scalar>) {
        self.cells.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Scalar::as_number)
    }

    /// Display text of a cell; null and missing cells are empty.
    pub fn text(&self, key: &str) -> String {
        self.get(key).map(Scalar::display).unwrap_or_default()
    }

    pub fn cells(&self) -> &FieldMap {
        &self.cells
    }

    pub fn from_json(value: &Value) -> LineItem {
        match value {
            Value::Object(map) => LineItem {
                cells: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Scalar::from_json(v)))
                    .collect(),
            },
            other => LineItem::new().with(
                "description",
                Scalar::from_json(other).map(|s| s.display()).unwrap_or_default(),
            ),
        }
    }
}

/// Serialized name of the line-item array; never a scalar field.
pub const ITEMS_KEY: &str = "items";
const RAW_ITEMS_KEY: &str = "items_raw";

/// The editable structured result for one uploaded document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(flatten)]
    pub fields: FieldMap,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl ExtractionRecord {
    pub fn field(&self, key: &str) -> Option<&Scalar> {
        self.fields.get(key).and_then(|v| v.as_ref())
    }

    pub fn field_text(&self, key: &str) -> String {
        self.field(key).map(Scalar::display).unwrap_or_default()
    }

    pub fn field_number(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(Scalar::as_number)
    }

    /// Build a record from an arbitrary JSON object. `items` (when an array) becomes the line items;
    /// everything else is kept as a scalar field. A non-array `items` value is kept under
    /// `items_raw` so it cannot collide with the line items when serialized.
    pub fn from_json(value: &Value) -> Option<ExtractionRecord> {
        let map = value.as_object()?;
        let mut record = ExtractionRecord::default();
        let mut stray_items = None;
        for (key, v) in map {
            if key == ITEMS_KEY {
                match v {
                    Value::Array(rows) => {
                        record.items = rows.iter().map(LineItem::from_json).collect();
                    }
                    Value::Null => {}
                    other => stray_items = Some(Scalar::from_json(other)),
                }
                continue;
            }
            record.fields.insert(key.clone(), Scalar::from_json(v));
        }
        if let Some(raw) = stray_items {
            let mut key = RAW_ITEMS_KEY.to_string();
            let mut n = 2;
            while record.fields.contains_key(&key) {
                key = format!("{}_{}", RAW_ITEMS_KEY, n);
                n += 1;
            }
            record.fields.insert(key, raw);
        }
        Some(record)
    }
}

/// Normalized response of the extraction backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionEnvelope {
    pub fields: FieldMap,
    pub items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl ExtractionEnvelope {
    pub fn into_record(self) -> ExtractionRecord {
        ExtractionRecord {
            fields: self.fields,
            items: self.items,
        }
    }
}

/// A candidate upload held in memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk; the MIME type is derived from its extension.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                "File not found.".to_string()
            } else {
                format!("Could not read file: {}", e)
            }
        })?;
        let file_name = path
            .file_name()
            .and_then(|o| o.to_str())
            .unwrap_or("document")
            .to_string();
        let mime_type = crate::validate::mime_for_path(path).to_string();
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_legacy_document_tags() {
        assert_eq!(DocumentType::parse("kwitansi"), Some(DocumentType::Receipt));
        assert_eq!(DocumentType::parse("laporan"), Some(DocumentType::Other));
        assert_eq!(DocumentType::parse(" Bank_Statement "), Some(DocumentType::BankStatement));
        assert_eq!(DocumentType::parse("spreadsheet"), None);
        for dt in DocumentType::ALL {
            assert_eq!(DocumentType::parse(dt.as_str()), Some(dt));
        }
    }

    #[test]
    fn contract_falls_back_to_invoice_route() {
        assert_eq!(DocumentType::Contract.endpoint(), "/extract/invoice");
        assert_eq!(DocumentType::Awb.endpoint(), "/extract/awb");
    }

    #[test]
    fn record_from_json_keeps_every_key() {
        let value = json!({
            "invoice_number": "INV-1",
            "seller_name": null,
            "tax": 125000,
            "meta": {"pages": 2},
            "items": [{"description": "A", "quantity": "2"}]
        });
        let record = ExtractionRecord::from_json(&value).unwrap();
        let keys: Vec<&str> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["invoice_number", "seller_name", "tax", "meta"]);
        assert_eq!(record.field("seller_name"), None);
        assert_eq!(record.field_number("tax"), Some(125000.0));
        assert_eq!(record.field_text("meta"), r#"{"pages":2}"#);
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].number("quantity"), Some(2.0));
    }

    #[test]
    fn non_array_items_do_not_shadow_line_items() {
        let value = json!({
            "invoice_no": "B",
            "items_raw": "kept",
            "items": {"note": "see page 2"}
        });
        let record = ExtractionRecord::from_json(&value).unwrap();
        assert!(record.items.is_empty());
        assert_eq!(record.field_text("items_raw"), "kept");
        assert_eq!(record.field_text("items_raw_2"), r#"{"note":"see page 2"}"#);
        assert!(!record.fields.contains_key(ITEMS_KEY));

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text.matches("\"items\"").count(), 1);
        let back: ExtractionRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_serializes_fields_before_items() {
        let mut record = ExtractionRecord::default();
        record.fields.insert("b".into(), Some("x".into()));
        record.fields.insert("a".into(), None);
        record.items.push(LineItem::new().with("description", "Row"));
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"b":"x","a":null,"items":[{"description":"Row"}]}"#);
        let back: ExtractionRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
