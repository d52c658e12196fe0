use crate::error::ReconcileError;
use crate::export::{self, ExportArtifact, ExportFormat, ExportRow};
use crate::format;
use crate::models::{
    ExtractionStatus, ExtractionTemplate, FieldSchema, FieldSpec, ItemColumn, NewExtraction,
    StoredExtraction,
};
use crate::services::store::{KeyValue, Store};
use crate::types::{
    DocumentType, ExtractionEnvelope, ExtractionRecord, ItemPatch, LineItem, Scalar, ITEMS_KEY,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    pub auto_calculate: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            auto_calculate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    Idle,
    Loaded,
    Editing,
    Exporting,
    Saving,
}

/// Upload metadata recorded alongside a committed snapshot.
#[derive(Debug, Clone)]
pub struct CommitMeta {
    pub file_name: String,
    pub document_type: DocumentType,
    pub size_bytes: u64,
    pub status: ExtractionStatus,
}

/// Serializable view of the session for the review panel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSnapshot {
    pub state: ReconcileState,
    pub document_type: DocumentType,
    pub title: String,
    pub auto_calculate: bool,
    pub highlight: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub item_columns: Vec<ItemColumn>,
    pub item_numbers: Vec<String>,
    pub record: Option<ExtractionRecord>,
    pub formatted_subtotal: Option<String>,
    pub formatted_grand_total: Option<String>,
}

/// Editable extraction result. One instance per review session; the schema only changes which
/// keys are labelled, read-only or treated as item roles.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcileConfig,
    schema: FieldSchema,
    document_type: DocumentType,
    state: ReconcileState,
    record: Option<ExtractionRecord>,
    loaded_keys: HashSet<String>,
    highlight: Option<String>,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig, schema: FieldSchema, document_type: DocumentType) -> Self {
        Self {
            config,
            schema,
            document_type,
            state: ReconcileState::Idle,
            record: None,
            loaded_keys: HashSet::new(),
            highlight: None,
        }
    }

    pub fn for_document_type(config: ReconcileConfig, document_type: DocumentType) -> Self {
        Self::new(config, FieldSchema::for_document_type(document_type), document_type)
    }

    pub fn for_template(
        config: ReconcileConfig,
        template: &ExtractionTemplate,
        document_type: DocumentType,
    ) -> Self {
        Self::new(config, FieldSchema::from_template(template), document_type)
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn config(&self) -> ReconcileConfig {
        self.config
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn record(&self) -> Option<&ExtractionRecord> {
        self.record.as_ref()
    }

    pub fn highlight(&self) -> Option<&str> {
        self.highlight.as_deref()
    }

    /// Replace the session record with a fresh extraction.
    pub fn load(&mut self, record: ExtractionRecord) {
        self.loaded_keys = record.fields.keys().cloned().collect();
        self.record = Some(record);
        self.highlight = None;
        self.state = ReconcileState::Loaded;
        if self.config.auto_calculate && self.has_items() {
            self.recompute_totals();
        }
        debug!(
            document_type = %self.document_type,
            fields = self.loaded_keys.len(),
            items = self.items().len(),
            "extraction loaded"
        );
    }

    pub fn load_envelope(&mut self, envelope: ExtractionEnvelope) {
        self.load(envelope.into_record());
    }

    pub fn reset(&mut self) {
        self.record = None;
        self.loaded_keys.clear();
        self.highlight = None;
        self.state = ReconcileState::Idle;
    }

    /// Focus is a separate event from editing.
    pub fn focus_field(&mut self, key: &str) {
        self.highlight = Some(key.to_string());
    }

    pub fn blur(&mut self) {
        self.highlight = None;
    }

    fn has_items(&self) -> bool {
        !self.items().is_empty()
    }

    fn items(&self) -> &[LineItem] {
        self.record.as_ref().map(|r| r.items.as_slice()).unwrap_or(&[])
    }

    fn record_mut(&mut self) -> Result<&mut ExtractionRecord, ReconcileError> {
        self.record.as_mut().ok_or(ReconcileError::NoRecord)
    }

    /// Subtotal and grand total are owned by the recompute while auto-calc is on and items exist.
    fn is_computed_field(&self, key: &str) -> bool {
        if !self.config.auto_calculate || !self.has_items() {
            return false;
        }
        match &self.schema.totals {
            Some(t) => key == t.subtotal || key == t.grand_total,
            None => false,
        }
    }

    /// Keys present at load, declared by the schema, or written by the totals recompute.
    fn is_known_field(&self, key: &str) -> bool {
        if self.loaded_keys.contains(key) || self.schema.declares_field(key) {
            return true;
        }
        match &self.schema.totals {
            Some(t) => key == t.subtotal || key == t.tax || key == t.grand_total,
            None => false,
        }
    }

    pub fn is_field_editable(&self, key: &str) -> bool {
        self.schema.is_field_editable(key) && !self.is_computed_field(key)
    }

    pub fn set_field(&mut self, key: &str, value: Option<Scalar>) -> Result<(), ReconcileError> {
        if self.record.is_none() {
            return Err(ReconcileError::NoRecord);
        }
        if key == ITEMS_KEY || !self.is_known_field(key) {
            return Err(ReconcileError::UnknownField(key.to_string()));
        }
        if !self.is_field_editable(key) {
            return Err(ReconcileError::ReadOnlyField(key.to_string()));
        }
        self.record_mut()?.fields.insert(key.to_string(), value);
        self.state = ReconcileState::Editing;
        let touches_tax = self.schema.totals.as_ref().map(|t| t.tax == key).unwrap_or(false);
        if touches_tax && self.config.auto_calculate && self.has_items() {
            self.recompute_totals();
        }
        Ok(())
    }

    fn is_auto_total(&self, key: &str) -> bool {
        self.config.auto_calculate && key == self.schema.roles.total
    }

    /// Merge `patch` into the item at `index`. With auto-calc on, the line total is derived from
    /// the merged quantity and unit price and any patched total is discarded.
    pub fn update_item(&mut self, index: usize, patch: ItemPatch) -> Result<(), ReconcileError> {
        let len = self.items().len();
        if self.record.is_none() {
            return Err(ReconcileError::NoRecord);
        }
        if index >= len {
            return Err(ReconcileError::ItemOutOfRange { index, len });
        }
        if let Some(key) = patch
            .keys()
            .find(|k| !self.schema.is_item_column_editable(k) && !self.is_auto_total(k))
        {
            return Err(ReconcileError::ReadOnlyField(key.clone()));
        }

        let roles = self.schema.roles.clone();
        let auto = self.config.auto_calculate;
        let touches_amounts = patch
            .keys()
            .any(|k| *k == roles.quantity || *k == roles.unit_price || *k == roles.total);

        let record = self.record_mut()?;
        let item = &mut record.items[index];
        for (key, value) in patch {
            if auto && key == roles.total {
                continue;
            }
            item.set(&key, value);
        }
        if auto && touches_amounts {
            let total = line_total(item, &roles.quantity, &roles.unit_price);
            item.set(&roles.total, Some(Scalar::Number(total)));
        }

        self.state = ReconcileState::Editing;
        self.after_items_changed();
        Ok(())
    }

    /// Append a blank row; returns its index.
    pub fn add_item(&mut self) -> Result<usize, ReconcileError> {
        let blank = self.schema.blank_item();
        let record = self.record_mut()?;
        record.items.push(blank);
        let index = record.items.len() - 1;
        self.state = ReconcileState::Editing;
        self.after_items_changed();
        Ok(index)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<LineItem, ReconcileError> {
        let record = self.record_mut()?;
        let len = record.items.len();
        if index >= len {
            return Err(ReconcileError::ItemOutOfRange { index, len });
        }
        let removed = record.items.remove(index);
        self.state = ReconcileState::Editing;
        self.after_items_changed();
        Ok(removed)
    }

    fn after_items_changed(&mut self) {
        if self.config.auto_calculate {
            self.recompute_totals();
        }
    }

    /// Turning auto-calc on recomputes subtotal and grand total. Line totals typed while it was
    /// off are kept until their row's quantity or price changes.
    pub fn set_auto_calculate(&mut self, enabled: bool) {
        self.config.auto_calculate = enabled;
        if enabled {
            self.recompute_totals();
        }
    }

    /// subtotal = sum of line totals (nulls as 0); grand total = subtotal + tax (missing as 0).
    /// Idempotent.
    pub fn recompute_totals(&mut self) {
        let Some(keys) = self.schema.totals.clone() else {
            return;
        };
        let total_key = self.schema.roles.total.clone();
        let Some(record) = self.record.as_mut() else {
            return;
        };
        let subtotal: f64 = record
            .items
            .iter()
            .map(|item| item.number(&total_key).unwrap_or(0.0))
            .sum();
        let tax = record.field_number(&keys.tax).unwrap_or(0.0);
        record
            .fields
            .insert(keys.subtotal, Some(Scalar::Number(subtotal)));
        record
            .fields
            .insert(keys.grand_total, Some(Scalar::Number(subtotal + tax)));
    }

    /// Explicit number column when filled, otherwise the 1-based position.
    pub fn item_number(&self, index: usize) -> String {
        let explicit = self.schema.number_key.as_deref().and_then(|key| {
            self.items()
                .get(index)
                .and_then(|item| item.get(key))
                .filter(|v| !v.is_blank())
                .map(Scalar::display)
        });
        explicit.unwrap_or_else(|| (index + 1).to_string())
    }

    pub fn currency(&self) -> String {
        self.record
            .as_ref()
            .map(|r| r.field_text(&self.schema.currency_key))
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.schema.default_currency.clone())
    }

    pub fn formatted_total(&self, key: &str) -> String {
        let value = self.record.as_ref().and_then(|r| r.field_number(key));
        format::format_currency(value, &self.currency())
    }

    pub fn to_export_rows(&self) -> Vec<ExportRow> {
        let roles = &self.schema.roles;
        self.items()
            .iter()
            .map(|item| ExportRow {
                description: item.text(&roles.description),
                quantity: item.text(&roles.quantity),
                unit_price: item.text(&roles.unit_price),
                total: item.text(&roles.total),
            })
            .collect()
    }

    pub fn field_rows(&self) -> Vec<(String, String)> {
        match &self.record {
            Some(record) => record
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(Scalar::display).unwrap_or_default()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn export(&mut self, format: ExportFormat) -> Result<ExportArtifact, ReconcileError> {
        let record = self.record.as_ref().ok_or(ReconcileError::NoRecord)?;
        self.state = ReconcileState::Exporting;
        let identifier = record.field_text(&self.schema.primary_key);
        let file_name = export::export_file_name(
            Some(identifier.as_str()),
            self.document_type.as_str(),
            format,
        );
        let bytes = match format {
            ExportFormat::Json => export::to_json(record),
            ExportFormat::Csv => export::to_csv(&self.to_export_rows(), &self.field_rows()),
            ExportFormat::Excel => export::to_xlsx(&self.to_export_rows(), &self.field_rows()),
        };
        self.state = ReconcileState::Editing;
        let bytes = bytes?;
        info!(file = %file_name, bytes = bytes.len(), "export ready");
        Ok(ExportArtifact {
            file_name,
            mime_type: format.mime_type(),
            bytes,
        })
    }

    /// Save a deep copy of the current record to history.
    pub fn commit<K: KeyValue>(
        &mut self,
        store: &Store<K>,
        meta: CommitMeta,
    ) -> Result<StoredExtraction, ReconcileError> {
        let snapshot = self.record.clone().ok_or(ReconcileError::NoRecord)?;
        self.state = ReconcileState::Saving;
        let result = store.create_history(NewExtraction {
            filename: meta.file_name,
            document_type: meta.document_type.as_str().to_string(),
            size: format::format_file_size(meta.size_bytes),
            status: meta.status,
            extracted_data: snapshot,
        });
        self.state = ReconcileState::Editing;
        Ok(result?)
    }

    pub fn snapshot(&self) -> ReconcileSnapshot {
        let fields = match &self.record {
            Some(record) => self
                .schema
                .visible_fields(record)
                .into_iter()
                .map(|mut f| {
                    f.editable = self.is_field_editable(&f.key);
                    f
                })
                .collect(),
            None => self.schema.fields.clone(),
        };
        let item_columns = self
            .schema
            .item_columns
            .iter()
            .cloned()
            .map(|mut c| {
                if self.is_auto_total(&c.key) {
                    c.editable = false;
                }
                c
            })
            .collect();
        let totals = self.schema.totals.as_ref().filter(|_| self.record.is_some());
        ReconcileSnapshot {
            state: self.state,
            document_type: self.document_type,
            title: self.schema.title.clone(),
            auto_calculate: self.config.auto_calculate,
            highlight: self.highlight.clone(),
            fields,
            item_columns,
            item_numbers: (0..self.items().len()).map(|i| self.item_number(i)).collect(),
            record: self.record.clone(),
            formatted_subtotal: totals.map(|t| self.formatted_total(&t.subtotal)),
            formatted_grand_total: totals.map(|t| self.formatted_total(&t.grand_total)),
        }
    }
}

/// Non-numeric quantity or price counts as 0.
fn line_total(item: &LineItem, quantity_key: &str, unit_price_key: &str) -> f64 {
    let q = item.number(quantity_key).unwrap_or(0.0);
    let p = item.number(unit_price_key).unwrap_or(0.0);
    q * p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKv;
    use crate::models::FieldSchema;

    fn patch(pairs: &[(&str, Option<Scalar>)]) -> ItemPatch {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn generic_record() -> ExtractionRecord {
        let mut record = ExtractionRecord::default();
        record.fields.insert("invoice_no".into(), Some("INV-7".into()));
        record.fields.insert("tax".into(), Some(Scalar::Number(100.0)));
        record.items.push(
            LineItem::new()
                .with("description", "A")
                .with("quantity", 2.0)
                .with("unit_price", 500.0)
                .with("total", 1000.0),
        );
        record.items.push(
            LineItem::new()
                .with("description", "B")
                .with("quantity", 1.0)
                .with("unit_price", 250.0)
                .with("total", 250.0),
        );
        record
    }

    fn loaded(auto: bool) -> Reconciler {
        let mut r = Reconciler::for_document_type(
            ReconcileConfig {
                auto_calculate: auto,
            },
            DocumentType::Other,
        );
        r.load(generic_record());
        r
    }

    fn num(r: &Reconciler, key: &str) -> Option<f64> {
        r.record().and_then(|rec| rec.field_number(key))
    }

    #[test]
    fn load_enters_loaded_and_recomputes() {
        let r = loaded(true);
        assert_eq!(r.state(), ReconcileState::Loaded);
        assert_eq!(num(&r, "subtotal"), Some(1250.0));
        assert_eq!(num(&r, "grand_total"), Some(1350.0));
    }

    #[test]
    fn update_uses_merged_values() {
        let mut r = loaded(true);
        r.update_item(0, patch(&[("quantity", Some("3".into()))])).unwrap();
        let item = &r.record().unwrap().items[0];
        assert_eq!(item.number("total"), Some(1500.0));
        assert_eq!(num(&r, "subtotal"), Some(1750.0));
        assert_eq!(num(&r, "grand_total"), Some(1850.0));
        assert_eq!(r.state(), ReconcileState::Editing);
    }

    #[test]
    fn non_numeric_quantity_counts_as_zero() {
        let mut r = loaded(true);
        r.update_item(0, patch(&[("quantity", Some("abc".into()))])).unwrap();
        let total = r.record().unwrap().items[0].number("total").unwrap();
        assert_eq!(total, 0.0);
        assert!(!total.is_nan());
    }

    #[test]
    fn recompute_wins_over_patched_total() {
        let mut r = loaded(true);
        r.update_item(1, patch(&[("total", Some(Scalar::Number(9999.0)))])).unwrap();
        assert_eq!(r.record().unwrap().items[1].number("total"), Some(250.0));
    }

    #[test]
    fn manual_mode_keeps_patched_total() {
        let mut r = loaded(false);
        r.update_item(0, patch(&[("quantity", Some(Scalar::Number(5.0)))])).unwrap();
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(1000.0));
        r.update_item(0, patch(&[("total", Some(Scalar::Number(42.0)))])).unwrap();
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(42.0));
        assert_eq!(num(&r, "subtotal"), None);
    }

    #[test]
    fn description_patch_leaves_total_alone() {
        let mut r = loaded(true);
        r.update_item(0, patch(&[("description", Some("Renamed".into()))])).unwrap();
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(1000.0));
    }

    #[test]
    fn add_and_remove_keep_order_and_totals() {
        let mut r = loaded(true);
        let idx = r.add_item().unwrap();
        assert_eq!(idx, 2);
        let added = &r.record().unwrap().items[2];
        assert!(added.contains("description"));
        assert_eq!(added.get("description"), None);
        assert_eq!(num(&r, "subtotal"), Some(1250.0));

        let removed = r.remove_item(0).unwrap();
        assert_eq!(removed.text("description"), "A");
        assert_eq!(r.record().unwrap().items[0].text("description"), "B");
        assert_eq!(num(&r, "subtotal"), Some(250.0));
        assert_eq!(num(&r, "grand_total"), Some(350.0));
    }

    #[test]
    fn item_count_tracks_adds_and_valid_removes() {
        let mut r = loaded(true);
        let mut expected = 2usize;
        for step in 0..200usize {
            let index = (step * 7) % 5;
            if step % 3 == 0 {
                r.add_item().unwrap();
                expected += 1;
            } else if r.remove_item(index).is_ok() {
                expected -= 1;
            }
            assert_eq!(r.record().unwrap().items.len(), expected);
        }
    }

    #[test]
    fn out_of_range_does_not_mutate() {
        let mut r = loaded(true);
        let before = r.record().cloned();
        let err = r.update_item(5, patch(&[("quantity", Some(Scalar::Number(1.0)))]));
        assert!(matches!(err, Err(ReconcileError::ItemOutOfRange { index: 5, len: 2 })));
        assert!(matches!(r.remove_item(2), Err(ReconcileError::ItemOutOfRange { .. })));
        assert_eq!(r.record().cloned(), before);
    }

    #[test]
    fn tax_edit_moves_grand_total() {
        let mut r = loaded(true);
        r.set_field("tax", Some("1.000,50".into())).unwrap();
        assert_eq!(num(&r, "grand_total"), Some(2250.5));
    }

    #[test]
    fn set_field_rules() {
        let mut r = loaded(true);
        assert!(matches!(
            r.set_field("not_there", Some("x".into())),
            Err(ReconcileError::UnknownField(_))
        ));
        assert!(matches!(
            r.set_field("subtotal", Some(Scalar::Number(1.0))),
            Err(ReconcileError::ReadOnlyField(_))
        ));
        r.set_field("invoice_no", None).unwrap();
        assert_eq!(r.record().unwrap().field("invoice_no"), None);

        r.set_auto_calculate(false);
        r.set_field("subtotal", Some(Scalar::Number(1.0))).unwrap();
        assert_eq!(num(&r, "subtotal"), Some(1.0));
    }

    #[test]
    fn declared_invoice_field_can_be_added() {
        let mut r = Reconciler::for_document_type(ReconcileConfig::default(), DocumentType::Invoice);
        r.load(ExtractionRecord::default());
        r.set_field("seller_name", Some("ACME".into())).unwrap();
        assert_eq!(r.record().unwrap().field_text("seller_name"), "ACME");
    }

    #[test]
    fn invoice_number_column_is_read_only() {
        let mut r = Reconciler::for_document_type(ReconcileConfig::default(), DocumentType::Invoice);
        let mut record = ExtractionRecord::default();
        record.items.push(LineItem::new().with("number", "10").with("quantity", 1.0));
        record.items.push(LineItem::new().with("quantity", 1.0));
        r.load(record);
        assert!(matches!(
            r.update_item(0, patch(&[("number", Some("11".into()))])),
            Err(ReconcileError::ReadOnlyField(_))
        ));
        assert_eq!(r.item_number(0), "10");
        assert_eq!(r.item_number(1), "2");
    }

    #[test]
    fn focus_is_separate_from_editing() {
        let mut r = loaded(true);
        r.focus_field("invoice_no");
        r.set_field("invoice_no", Some("INV-8".into())).unwrap();
        assert_eq!(r.highlight(), Some("invoice_no"));
        r.blur();
        assert_eq!(r.highlight(), None);
        r.focus_field("tax");
        r.load(generic_record());
        assert_eq!(r.highlight(), None);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut r = loaded(true);
        r.recompute_totals();
        let once = r.record().cloned();
        r.recompute_totals();
        assert_eq!(r.record().cloned(), once);
    }

    #[test]
    fn enabling_auto_calc_recomputes_totals_only() {
        let mut r = loaded(false);
        r.update_item(0, patch(&[("total", Some(Scalar::Number(1.0)))])).unwrap();
        r.set_auto_calculate(true);
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(1.0));
        assert_eq!(num(&r, "subtotal"), Some(251.0));
        assert_eq!(num(&r, "grand_total"), Some(351.0));

        r.update_item(0, patch(&[("quantity", Some(Scalar::Number(2.0)))])).unwrap();
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(1000.0));
        assert_eq!(num(&r, "grand_total"), Some(1350.0));
    }

    #[test]
    fn receipt_uses_its_own_keys() {
        let mut r = Reconciler::for_document_type(ReconcileConfig::default(), DocumentType::Receipt);
        let mut record = ExtractionRecord::default();
        record.fields.insert("taxAmount".into(), Some(Scalar::Number(11.0)));
        record.items.push(
            LineItem::new()
                .with("name", "Kopi")
                .with("quantity", 2.0)
                .with("price", 20.0),
        );
        r.load(record);
        r.update_item(0, patch(&[("price", Some(Scalar::Number(25.0)))])).unwrap();
        assert_eq!(r.record().unwrap().items[0].number("total"), Some(50.0));
        assert_eq!(num(&r, "totalAmount"), Some(61.0));
        assert_eq!(r.to_export_rows()[0].description, "Kopi");
    }

    #[test]
    fn export_rows_and_field_section() {
        let r = loaded(true);
        let rows = r.to_export_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].quantity, "2");
        assert_eq!(rows[0].total, "1000");
        let fields = r.field_rows();
        assert_eq!(fields[0], ("invoice_no".to_string(), "INV-7".to_string()));
    }

    #[test]
    fn null_cells_export_as_empty_strings() {
        let mut record = generic_record();
        let mut sparse = LineItem::new().with("description", "C");
        sparse.set("quantity", None);
        sparse.set("unit_price", None);
        record.items.push(sparse);
        let mut r = Reconciler::for_document_type(
            ReconcileConfig {
                auto_calculate: false,
            },
            DocumentType::Other,
        );
        r.load(record);
        let rows = r.to_export_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].description, "C");
        assert_eq!(rows[2].quantity, "");
        assert_eq!(rows[2].unit_price, "");
        assert_eq!(rows[2].total, "");

        let text = String::from_utf8(r.export(ExportFormat::Csv).unwrap().bytes).unwrap();
        assert!(text.lines().any(|l| l == "C,,,"));
        assert!(!text.contains("null"));
    }

    #[test]
    fn template_schema_labels_fields_and_keeps_totals() {
        let template = crate::models::default_templates().remove(0);
        let first = template.fields[0].name.clone();
        let mut r = Reconciler::for_template(ReconcileConfig::default(), &template, DocumentType::Invoice);
        r.load(generic_record());
        assert_eq!(r.document_type(), DocumentType::Invoice);
        assert_eq!(r.schema().primary_key, first);
        r.set_field(&first, Some("X-1".into())).unwrap();
        assert_eq!(num(&r, "grand_total"), Some(1350.0));
        let keys: Vec<String> = r.snapshot().fields.into_iter().map(|f| f.key).collect();
        assert_eq!(keys[0], first);
    }

    #[test]
    fn non_array_items_do_not_break_history() {
        let store = Store::new(MemoryKv::new());
        let meta = || CommitMeta {
            file_name: "inv.pdf".into(),
            document_type: DocumentType::Invoice,
            size_bytes: 10,
            status: ExtractionStatus::Completed,
        };
        let mut first = loaded(true);
        first.commit(&store, meta()).unwrap();

        let envelope = crate::relay::parse_envelope(
            r#"{"data":{"invoice_no":"B","items":{"note":"see page 2"}}}"#,
        )
        .unwrap();
        let mut second = Reconciler::for_document_type(ReconcileConfig::default(), DocumentType::Other);
        second.load_envelope(envelope);
        assert!(matches!(
            second.set_field("items", Some("x".into())),
            Err(ReconcileError::UnknownField(_))
        ));
        second.commit(&store, meta()).unwrap();

        let history = store.list_history();
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[0].extracted_data.field_text("items_raw"),
            r#"{"note":"see page 2"}"#
        );
        let json = String::from_utf8(second.export(ExportFormat::Json).unwrap().bytes).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["items"], serde_json::json!([]));
    }

    #[test]
    fn export_returns_to_editing() {
        let mut r = loaded(true);
        let artifact = r.export(ExportFormat::Csv).unwrap();
        assert_eq!(artifact.file_name, "extraction-INV-7.csv");
        assert_eq!(r.state(), ReconcileState::Editing);
        let text = String::from_utf8(artifact.bytes).unwrap();
        assert!(text.starts_with("Description,Quantity,Unit Price,Total\n"));
    }

    #[test]
    fn formats_with_record_currency() {
        let mut r = loaded(true);
        assert_eq!(r.formatted_total("grand_total"), "Rp 1.350,00");
        assert!(matches!(
            r.set_field("currency", Some("XX1".into())),
            Err(ReconcileError::UnknownField(_))
        ));
        r.record_mut().unwrap().fields.insert("currency".into(), Some("XX1".into()));
        assert_eq!(r.formatted_total("grand_total"), "XX1 1.350");
    }

    #[test]
    fn commit_is_a_deep_copy() {
        let store = Store::new(MemoryKv::new());
        let mut r = loaded(true);
        let meta = CommitMeta {
            file_name: "inv.pdf".into(),
            document_type: DocumentType::Invoice,
            size_bytes: 2048,
            status: ExtractionStatus::Completed,
        };
        let saved = r.commit(&store, meta).unwrap();
        assert_eq!(r.state(), ReconcileState::Editing);
        assert_eq!(saved.size, "2 KB");

        r.update_item(0, patch(&[("quantity", Some(Scalar::Number(10.0)))])).unwrap();
        let stored = store.get_history(&saved.id).unwrap();
        assert_eq!(stored.extracted_data.items[0].number("quantity"), Some(2.0));
        assert_eq!(stored.extracted_data.field_number("subtotal"), Some(1250.0));
    }

    #[test]
    fn operations_without_record() {
        let mut r = Reconciler::new(ReconcileConfig::default(), FieldSchema::generic(), DocumentType::Other);
        assert!(matches!(r.add_item(), Err(ReconcileError::NoRecord)));
        assert!(matches!(r.export(ExportFormat::Json), Err(ReconcileError::NoRecord)));
        assert_eq!(r.state(), ReconcileState::Idle);
        r.load(generic_record());
        r.reset();
        assert_eq!(r.state(), ReconcileState::Idle);
        assert!(r.record().is_none());
    }
}
