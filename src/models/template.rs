use crate::format;
use crate::types::ExtractionRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Email,
    Phone,
}

impl FieldType {
    /// Whether a non-empty value is acceptable for this field type.
    pub fn accepts(&self, value: &str) -> bool {
        let v = value.trim();
        match self {
            FieldType::Text => true,
            FieldType::Number => format::parse_number(v).is_some(),
            FieldType::Date => ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"]
                .iter()
                .any(|f| NaiveDate::parse_from_str(v, f).is_ok()),
            FieldType::Email => match v.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && !v.contains(char::is_whitespace)
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                }
                None => false,
            },
            FieldType::Phone => {
                let digits = v.chars().filter(|c| c.is_ascii_digit()).count();
                digits >= 6
                    && v.chars()
                        .all(|c| c.is_ascii_digit() || " +-()./".contains(c))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TemplateField {
    pub fn new(id: &str, name: &str, label: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            label: label.to_string(),
            field_type,
            required,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub fields: Vec<TemplateField>,
    pub document_type: String,
    pub created_date: String,
    pub updated_date: String,
}

/// Template contents supplied by the user on create.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub name: String,
    pub description: String,
    pub document_type: String,
    pub fields: Vec<TemplateField>,
}

impl TemplateDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Template name is required.".to_string());
        }
        if self.fields.is_empty() {
            return Err("Add at least one field.".to_string());
        }
        if let Some(f) = self.fields.iter().find(|f| f.name.trim().is_empty()) {
            return Err(format!("Field '{}' has no name.", f.id));
        }
        Ok(())
    }
}

/// Partial edit. `id` and `created_date` are not editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<String>,
    pub fields: Option<Vec<TemplateField>>,
}

impl TemplateUpdate {
    pub fn apply(self, template: &mut ExtractionTemplate, today: &str) {
        if let Some(name) = self.name {
            template.name = name;
        }
        if let Some(description) = self.description {
            template.description = description;
        }
        if let Some(document_type) = self.document_type {
            template.document_type = document_type;
        }
        if let Some(fields) = self.fields {
            template.fields = fields;
        }
        template.updated_date = today.to_string();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl ExtractionTemplate {
    /// Check a record against the template: required fields present, typed fields well-formed.
    pub fn check_record(&self, record: &ExtractionRecord) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        for field in &self.fields {
            let value = record.field_text(&field.name);
            if value.trim().is_empty() {
                if field.required {
                    issues.push(FieldIssue {
                        field: field.name.clone(),
                        message: format!("{} is required", field.label),
                    });
                }
                continue;
            }
            if !field.field_type.accepts(&value) {
                issues.push(FieldIssue {
                    field: field.name.clone(),
                    message: format!("{} is not a valid {:?}", field.label, field.field_type)
                        .to_lowercase(),
                });
            }
        }
        issues
    }
}

/// Seed templates shown when nothing has been stored yet.
pub fn default_templates() -> Vec<ExtractionTemplate> {
    vec![
        ExtractionTemplate {
            id: "tpl_default_invoice".to_string(),
            name: "Standard Invoice".to_string(),
            description: "Template for standard invoices".to_string(),
            document_type: "invoice".to_string(),
            created_date: "2024-01-01".to_string(),
            updated_date: "2024-01-01".to_string(),
            fields: vec![
                TemplateField::new("f1", "invoiceNumber", "Invoice Number", FieldType::Text, true),
                TemplateField::new("f2", "date", "Invoice Date", FieldType::Date, true),
                TemplateField::new("f3", "dueDate", "Due Date", FieldType::Date, true),
                TemplateField::new("f4", "vendor", "Vendor Name", FieldType::Text, true),
                TemplateField::new("f5", "amount", "Total Amount", FieldType::Number, true),
            ],
        },
        ExtractionTemplate {
            id: "tpl_default_receipt".to_string(),
            name: "Receipt".to_string(),
            description: "Template for receipt extraction".to_string(),
            document_type: "receipt".to_string(),
            created_date: "2024-01-01".to_string(),
            updated_date: "2024-01-01".to_string(),
            fields: vec![
                TemplateField::new("f1", "merchant", "Merchant Name", FieldType::Text, true),
                TemplateField::new("f2", "date", "Date", FieldType::Date, true),
                TemplateField::new("f3", "amount", "Total Amount", FieldType::Number, true),
                TemplateField::new("f4", "paymentMethod", "Payment Method", FieldType::Text, false),
            ],
        },
    ]
}
