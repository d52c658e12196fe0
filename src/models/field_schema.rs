use crate::models::template::ExtractionTemplate;
use crate::types::{DocumentType, ExtractionRecord, LineItem};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    Generic,
    Invoice,
    Receipt,
    Template,
}

/// One labelled top-level field in the review panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub editable: bool,
    pub section: String,
}

/// One column of the line-item table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemColumn {
    pub key: String,
    pub label: String,
    pub editable: bool,
}

/// Which item columns carry description, quantity, unit price and line total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRoles {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

/// Top-level keys receiving recomputed subtotal and grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsKeys {
    pub subtotal: String,
    pub tax: String,
    pub grand_total: String,
}

/// Presentation and editability rules for one document type. The reconciler is the same for every
/// schema; only the keys, labels and read-only flags differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub kind: SchemaKind,
    pub title: String,
    pub fields: Vec<FieldSpec>,
    pub item_columns: Vec<ItemColumn>,
    pub roles: ItemRoles,
    pub totals: Option<TotalsKeys>,
    pub currency_key: String,
    pub default_currency: String,
    pub primary_key: String,
    /// Explicit item-number column, if the document type has one.
    pub number_key: Option<String>,
}

fn field(key: &str, label: &str, section: &str) -> FieldSpec {
    FieldSpec {
        key: key.to_string(),
        label: label.to_string(),
        editable: true,
        section: section.to_string(),
    }
}

fn column(key: &str, label: &str) -> ItemColumn {
    ItemColumn {
        key: key.to_string(),
        label: label.to_string(),
        editable: true,
    }
}

fn roles(description: &str, quantity: &str, unit_price: &str, total: &str) -> ItemRoles {
    ItemRoles {
        description: description.to_string(),
        quantity: quantity.to_string(),
        unit_price: unit_price.to_string(),
        total: total.to_string(),
    }
}

fn totals(subtotal: &str, tax: &str, grand_total: &str) -> TotalsKeys {
    TotalsKeys {
        subtotal: subtotal.to_string(),
        tax: tax.to_string(),
        grand_total: grand_total.to_string(),
    }
}

impl FieldSchema {
    pub fn for_document_type(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Invoice => Self::invoice(),
            DocumentType::Receipt => Self::receipt(),
            _ => Self::generic(),
        }
    }

    pub fn invoice() -> Self {
        let mut number = column("number", "No.");
        number.editable = false;
        FieldSchema {
            kind: SchemaKind::Invoice,
            title: "Extracted Invoice Data".to_string(),
            fields: vec![
                field("seller_name", "Seller Name", "seller"),
                field("seller_address", "Seller Address", "seller"),
                field("seller_country", "Seller Country", "seller"),
                field("seller_phone", "Seller Phone", "seller"),
                field("buyer_name", "Buyer Name", "buyer"),
                field("buyer_address", "Buyer Address", "buyer"),
                field("buyer_country", "Buyer Country", "buyer"),
                field("buyer_phone", "Buyer Phone", "buyer"),
                field("invoice_number", "Invoice Number", "invoice"),
                field("invoice_date", "Invoice Date", "invoice"),
                field("payment_terms", "Payment Terms", "invoice"),
                field("inco_terms", "INCO Terms", "invoice"),
                field("freight_terms", "Freight Terms", "invoice"),
                field("ship_to", "Ship To", "invoice"),
                field("currency", "Currency", "totals"),
                field("subtotal", "Subtotal", "totals"),
                field("tax", "Tax", "totals"),
                field("grand_total", "Grand Total", "totals"),
            ],
            item_columns: vec![
                number,
                column("prod_number", "Product Number"),
                column("description", "Description"),
                column("quantity", "Quantity"),
                column("uom", "UOM"),
                column("unit_price", "Unit Price"),
                column("currency", "Currency"),
                column("total", "Total"),
            ],
            roles: roles("description", "quantity", "unit_price", "total"),
            totals: Some(totals("subtotal", "tax", "grand_total")),
            currency_key: "currency".to_string(),
            default_currency: "USD".to_string(),
            primary_key: "invoice_number".to_string(),
            number_key: Some("number".to_string()),
        }
    }

    pub fn receipt() -> Self {
        FieldSchema {
            kind: SchemaKind::Receipt,
            title: "Extracted Receipt Data".to_string(),
            fields: vec![
                field("merchant", "Merchant Name", "merchant"),
                field("merchantAddress", "Merchant Address", "merchant"),
                field("receiptNumber", "Receipt Number", "merchant"),
                field("date", "Date", "merchant"),
                field("time", "Time", "merchant"),
                field("paymentMethod", "Payment Method", "payment"),
                field("cardNumber", "Card Number", "payment"),
                field("subtotal", "Subtotal", "payment"),
                field("taxAmount", "Tax Amount", "payment"),
                field("totalAmount", "Total Amount", "payment"),
            ],
            item_columns: vec![
                column("name", "Item"),
                column("quantity", "Qty"),
                column("price", "Price"),
                column("total", "Total"),
            ],
            roles: roles("name", "quantity", "price", "total"),
            totals: Some(totals("subtotal", "taxAmount", "totalAmount")),
            currency_key: "currency".to_string(),
            default_currency: "IDR".to_string(),
            primary_key: "receiptNumber".to_string(),
            number_key: None,
        }
    }

    /// Fields are whatever the record carries; only the item table and totals are fixed.
    pub fn generic() -> Self {
        FieldSchema {
            kind: SchemaKind::Generic,
            title: "Extracted Data".to_string(),
            fields: Vec::new(),
            item_columns: vec![
                column("description", "Description"),
                column("quantity", "Qty"),
                column("unit_price", "Unit Price"),
                column("total", "Total"),
            ],
            roles: roles("description", "quantity", "unit_price", "total"),
            totals: Some(totals("subtotal", "tax", "grand_total")),
            currency_key: "currency".to_string(),
            default_currency: "IDR".to_string(),
            primary_key: "invoice_no".to_string(),
            number_key: None,
        }
    }

    /// Schema whose top-level fields come from a user template.
    pub fn from_template(template: &ExtractionTemplate) -> Self {
        let mut schema = Self::generic();
        schema.kind = SchemaKind::Template;
        schema.title = template.name.clone();
        schema.fields = template
            .fields
            .iter()
            .map(|f| field(&f.name, &f.label, "template"))
            .collect();
        if let Some(first) = template.fields.first() {
            schema.primary_key = first.name.clone();
        }
        schema
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn declares_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Undeclared keys follow the generic rule: editable.
    pub fn is_field_editable(&self, key: &str) -> bool {
        self.field(key).map(|f| f.editable).unwrap_or(true)
    }

    pub fn item_column(&self, key: &str) -> Option<&ItemColumn> {
        self.item_columns.iter().find(|c| c.key == key)
    }

    pub fn is_item_column_editable(&self, key: &str) -> bool {
        self.item_column(key).map(|c| c.editable).unwrap_or(true)
    }

    /// Fields to show for a record: declared fields first, then any extra keys the record carries.
    pub fn visible_fields(&self, record: &ExtractionRecord) -> Vec<FieldSpec> {
        let mut out = self.fields.clone();
        for key in record.fields.keys() {
            if self.declares_field(key) || key.contains("Item") {
                continue;
            }
            out.push(FieldSpec {
                key: key.clone(),
                label: humanize_key(key),
                editable: true,
                section: "basic".to_string(),
            });
        }
        out
    }

    pub fn blank_item(&self) -> LineItem {
        let keys: Vec<&str> = self.item_columns.iter().map(|c| c.key.as_str()).collect();
        LineItem::blank(&keys)
    }
}

/// `sellerName` / `seller_name` -> `Seller Name`.
pub fn humanize_key(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
