pub mod field_schema;
pub mod stored;
pub mod template;

pub use field_schema::{FieldSchema, FieldSpec, ItemColumn, ItemRoles, SchemaKind, TotalsKeys};
pub use stored::{ExtractionStatus, HistoryStats, NewExtraction, StoredExtraction};
pub use template::{
    default_templates, ExtractionTemplate, FieldIssue, FieldType, TemplateDraft, TemplateField,
    TemplateUpdate,
};
