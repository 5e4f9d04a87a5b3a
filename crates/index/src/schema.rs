//! Index schema, field values, and the email document stored per message.
use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Dimensionality of the embedding vector every email document carries.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Name of the vector field in the email schema.
pub const EMBEDDINGS_FIELD: &str = "embeddings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    StringArray,
    Vector(usize),
}

impl FieldType {
    /// Whether the field takes part in full-text search.
    pub fn is_text(self) -> bool {
        matches!(self, Self::String | Self::StringArray)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::StringArray => f.write_str("string[]"),
            Self::Vector(dims) => write!(f, "vector[{dims}]"),
        }
    }
}

/// A single field value inside an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    String(String),
    StringArray(Vec<String>),
    Vector(Vec<f32>),
}

impl FieldValue {
    fn describe(&self) -> String {
        match self {
            Self::String(_) => "string".into(),
            Self::StringArray(_) => "string[]".into(),
            Self::Vector(v) => format!("vector[{}]", v.len()),
        }
    }

    /// Text fragments of a string or string-array value; empty for vectors.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::String(s) => vec![s.as_str()],
            Self::StringArray(items) => items.iter().map(String::as_str).collect(),
            Self::Vector(_) => Vec::new(),
        }
    }
}

/// Field name → value, ordered so serialized snapshots are stable.
pub type Document = BTreeMap<String, FieldValue>;

/// Declared fields of an index. Fixed at creation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    fields: BTreeMap<String, FieldType>,
}

impl IndexSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), ty);
        self
    }

    /// The schema every account index is created with.
    pub fn email() -> Self {
        Self::new()
            .field("title", FieldType::String)
            .field("body", FieldType::String)
            .field("rawBody", FieldType::String)
            .field("from", FieldType::String)
            .field("to", FieldType::StringArray)
            .field("sentAt", FieldType::String)
            .field(EMBEDDINGS_FIELD, FieldType::Vector(EMBEDDING_DIMENSIONS))
            .field("threadId", FieldType::String)
    }

    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.fields()
            .filter(|(_, ty)| ty.is_text())
            .map(|(name, _)| name)
    }

    /// Check a document against the declared fields.
    ///
    /// Fields may be omitted, but every present field must be declared and
    /// carry a value of the declared type; vectors must match the declared
    /// dimensionality exactly with finite components only.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        for (name, value) in doc {
            let Some(ty) = self.get(name) else {
                return Err(IndexError::schema(format!("unknown field `{name}`")));
            };
            let ok = match (ty, value) {
                (FieldType::String, FieldValue::String(_))
                | (FieldType::StringArray, FieldValue::StringArray(_)) => true,
                (FieldType::Vector(dims), FieldValue::Vector(v)) => v.len() == dims,
                _ => false,
            };
            if !ok {
                return Err(IndexError::schema(format!(
                    "field `{name}` expects {ty}, got {}",
                    value.describe()
                )));
            }
            if let FieldValue::Vector(v) = value
                && let Some(pos) = v.iter().position(|x| !x.is_finite())
            {
                return Err(IndexError::schema(format!(
                    "field `{name}` has a non-finite component at position {pos}"
                )));
            }
        }
        Ok(())
    }
}

/// One email as stored in the account index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDocument {
    pub title: String,
    pub body: String,
    pub raw_body: String,
    pub from: String,
    pub to: Vec<String>,
    pub sent_at: String,
    pub embeddings: Vec<f32>,
    pub thread_id: String,
}

impl EmailDocument {
    pub fn into_document(self) -> Document {
        let mut doc = Document::new();
        doc.insert("title".into(), FieldValue::String(self.title));
        doc.insert("body".into(), FieldValue::String(self.body));
        doc.insert("rawBody".into(), FieldValue::String(self.raw_body));
        doc.insert("from".into(), FieldValue::String(self.from));
        doc.insert("to".into(), FieldValue::StringArray(self.to));
        doc.insert("sentAt".into(), FieldValue::String(self.sent_at));
        doc.insert(EMBEDDINGS_FIELD.into(), FieldValue::Vector(self.embeddings));
        doc.insert("threadId".into(), FieldValue::String(self.thread_id));
        doc
    }

    /// Rebuild an email from an indexed document. Missing fields come back empty.
    pub fn from_document(doc: &Document) -> Result<Self> {
        fn string(doc: &Document, name: &str) -> Result<String> {
            match doc.get(name) {
                None => Ok(String::new()),
                Some(FieldValue::String(s)) => Ok(s.clone()),
                Some(other) => Err(IndexError::schema(format!(
                    "field `{name}` expects string, got {}",
                    other.describe()
                ))),
            }
        }

        let to = match doc.get("to") {
            None => Vec::new(),
            Some(FieldValue::StringArray(items)) => items.clone(),
            Some(other) => {
                return Err(IndexError::schema(format!(
                    "field `to` expects string[], got {}",
                    other.describe()
                )));
            },
        };
        let embeddings = match doc.get(EMBEDDINGS_FIELD) {
            None => Vec::new(),
            Some(FieldValue::Vector(v)) => v.clone(),
            Some(other) => {
                return Err(IndexError::schema(format!(
                    "field `{EMBEDDINGS_FIELD}` expects a vector, got {}",
                    other.describe()
                )));
            },
        };

        Ok(Self {
            title: string(doc, "title")?,
            body: string(doc, "body")?,
            raw_body: string(doc, "rawBody")?,
            from: string(doc, "from")?,
            to,
            sent_at: string(doc, "sentAt")?,
            embeddings,
            thread_id: string(doc, "threadId")?,
        })
    }
}
