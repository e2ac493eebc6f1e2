use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::AppError;

/// Wire-level type of a field, as reported by the platform's reflection
/// metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Uint32,
    Fixed64,
    Fixed32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
}

/// A named message type with its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// A well-known scalar wrapper such as `StringValue`, holding one `value`.
    pub fn wrapper(name: &str, inner: WireType) -> Self {
        Self::new(name, vec![FieldDescriptor::scalar("value", inner)])
    }
}

/// Reflection metadata for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub wire_type: WireType,
    /// Nested message type. Present only for `WireType::Message`.
    pub message: Option<MessageDescriptor>,
    pub repeated: bool,
}

impl FieldDescriptor {
    pub fn scalar(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            wire_type,
            message: None,
            repeated: false,
        }
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::scalar(name, WireType::Enum)
    }

    pub fn message(name: impl Into<String>, message: MessageDescriptor) -> Self {
        Self {
            name: name.into(),
            wire_type: WireType::Message,
            message: Some(message),
            repeated: false,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// Column kind in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Record,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "STRING",
            FieldKind::Integer => "INTEGER",
            FieldKind::Float => "FLOAT",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Record => "RECORD",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One warehouse column. `children` is non-empty only for records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub repeated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldSpec>,
}

impl FieldSpec {
    /// Render as a BigQuery `TableFieldSchema`.
    pub fn to_bigquery(&self) -> serde_json::Value {
        let mut field = serde_json::json!({
            "name": self.name,
            "type": self.kind.as_str(),
            "mode": if self.repeated { "REPEATED" } else { "NULLABLE" },
        });
        if self.kind == FieldKind::Record {
            field["fields"] = self.children.iter().map(FieldSpec::to_bigquery).collect();
        }
        field
    }
}

/// Render a full column list as a BigQuery `TableSchema`.
pub fn bigquery_schema(fields: &[FieldSpec]) -> serde_json::Value {
    serde_json::json!({ "fields": fields.iter().map(FieldSpec::to_bigquery).collect::<Vec<_>>() })
}

/// Data-driven exceptions applied during translation.
#[derive(Debug, Clone)]
pub struct TranslationRules {
    /// Field names whose kind is fixed regardless of wire type.
    pub overrides: HashMap<String, FieldKind>,
    /// Message types flattened to a single string column.
    pub opaque_messages: HashSet<String>,
    /// Scalar wrapper message types and the kind they unwrap to.
    pub wrappers: HashMap<String, FieldKind>,
    pub max_depth: usize,
}

impl Default for TranslationRules {
    fn default() -> Self {
        let overrides = [("http_code", FieldKind::Integer), ("texts", FieldKind::String)]
            .into_iter()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        let opaque_messages = ["HotelAdInfo", "ShoppingSmartAdInfo", "ShoppingProductAdInfo"]
            .into_iter()
            .map(String::from)
            .collect();
        let wrappers = [
            ("StringValue", FieldKind::String),
            ("Int32Value", FieldKind::Integer),
            ("Int64Value", FieldKind::Integer),
            ("BoolValue", FieldKind::Boolean),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

        Self {
            overrides,
            opaque_messages,
            wrappers,
            max_depth: 20,
        }
    }
}

impl TranslationRules {
    pub fn with_override(mut self, field: impl Into<String>, kind: FieldKind) -> Self {
        self.overrides.insert(field.into(), kind);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Translates wire field metadata into warehouse columns.
#[derive(Debug, Clone, Default)]
pub struct SchemaTranslator {
    rules: TranslationRules,
}

impl SchemaTranslator {
    pub fn new(rules: TranslationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &TranslationRules {
        &self.rules
    }

    /// Translate a message's fields, in declaration order.
    pub fn translate(&self, fields: &[FieldDescriptor]) -> Result<Vec<FieldSpec>, AppError> {
        self.translate_fields(fields, 1)
    }

    fn translate_fields(
        &self,
        fields: &[FieldDescriptor],
        depth: usize,
    ) -> Result<Vec<FieldSpec>, AppError> {
        if depth > self.rules.max_depth {
            return Err(AppError::TranslationError(format!(
                "nesting exceeds maximum depth of {}",
                self.rules.max_depth
            )));
        }
        fields
            .iter()
            .map(|field| self.translate_field(field, depth))
            .collect()
    }

    fn translate_field(&self, field: &FieldDescriptor, depth: usize) -> Result<FieldSpec, AppError> {
        let (kind, children) = match self.rules.overrides.get(&field.name) {
            Some(kind) => (*kind, Vec::new()),
            None => self.resolve(field, depth)?,
        };

        Ok(FieldSpec {
            name: field.name.clone(),
            kind,
            repeated: field.repeated || kind == FieldKind::Record,
            children,
        })
    }

    fn resolve(
        &self,
        field: &FieldDescriptor,
        depth: usize,
    ) -> Result<(FieldKind, Vec<FieldSpec>), AppError> {
        let kind = match field.wire_type {
            WireType::Enum => FieldKind::String,
            WireType::Message => {
                let message = field.message.as_ref().ok_or_else(|| {
                    AppError::TranslationError(format!(
                        "field '{}' is a message without a message type",
                        field.name
                    ))
                })?;

                if self.rules.opaque_messages.contains(&message.name) {
                    FieldKind::String
                } else if let Some(kind) = self.rules.wrappers.get(&message.name) {
                    *kind
                } else if message.fields.is_empty() {
                    FieldKind::String
                } else {
                    let children = self.translate_fields(&message.fields, depth + 1)?;
                    return Ok((FieldKind::Record, children));
                }
            }
            WireType::Int32 => FieldKind::Integer,
            WireType::Double => FieldKind::Float,
            WireType::Float => FieldKind::Float,
            WireType::Bool => FieldKind::Boolean,
            WireType::String | WireType::Bytes => FieldKind::String,
            WireType::Int64
            | WireType::Uint64
            | WireType::Uint32
            | WireType::Fixed64
            | WireType::Fixed32
            | WireType::Sfixed32
            | WireType::Sfixed64
            | WireType::Sint32
            | WireType::Sint64 => FieldKind::Integer,
        };
        Ok((kind, Vec::new()))
    }
}
