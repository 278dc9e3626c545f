//! Structured-output schema declarations for gateway calls.
//!
//! Each stage declares the fields it expects back from the model. The
//! schema drives three things: the instruction appended to the prompt,
//! the provider's JSON-mode request, and the tolerant decoder's
//! coercion/defaulting rules.

use serde_json::json;

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer score, inclusive bounds.
    Integer { min: i64, max: i64 },
    /// Free text.
    Text,
    /// One of a fixed set of string variants.
    Enum(&'static [&'static str]),
}

/// A single required field in a structured reply.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// An ordered set of required fields the model must return.
#[derive(Debug, Clone, Default)]
pub struct ResponseSchema {
    fields: Vec<SchemaField>,
}

impl ResponseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a 0–10 integer score field.
    pub fn score(mut self, name: &'static str) -> Self {
        self.fields.push(SchemaField {
            name,
            kind: FieldKind::Integer { min: 0, max: 10 },
        });
        self
    }

    /// Add a free-text field.
    pub fn text(mut self, name: &'static str) -> Self {
        self.fields.push(SchemaField {
            name,
            kind: FieldKind::Text,
        });
        self
    }

    /// Add an enum field with fixed variants.
    pub fn enumeration(mut self, name: &'static str, variants: &'static [&'static str]) -> Self {
        self.fields.push(SchemaField {
            name,
            kind: FieldKind::Enum(variants),
        });
        self
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of all required fields, in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Render the schema as a provider-facing JSON object description.
    pub fn to_provider_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for field in &self.fields {
            let prop = match &field.kind {
                FieldKind::Integer { min, max } => json!({
                    "type": "INTEGER",
                    "minimum": min,
                    "maximum": max,
                }),
                FieldKind::Text => json!({ "type": "STRING" }),
                FieldKind::Enum(variants) => json!({
                    "type": "STRING",
                    "enum": variants,
                }),
            };
            properties.insert(field.name.to_string(), prop);
        }
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.required().collect::<Vec<_>>(),
        })
    }
}
