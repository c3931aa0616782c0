// # Callback payloads and routes
//
// Providers post callbacks as JSON, as url-encoded forms, or as plain query
// strings (some only ever issue GETs). All of them are flattened into a
// single string map so adapters read fields the same way regardless of how
// the provider encoded them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// HTTP method a callback route accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// An inbound path owned by a data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallbackRoute {
    pub method: HttpMethod,
    /// Absolute path, always starting with `/`
    pub path: String,
}

impl CallbackRoute {
    /// Create a route, normalizing the path to start with `/`
    pub fn new(method: HttpMethod, path: impl AsRef<str>) -> Self {
        let path = path.as_ref().trim();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self { method, path }
    }

    /// `POST` route
    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// `GET` route
    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(HttpMethod::Get, path)
    }
}

impl fmt::Display for CallbackRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Flattened callback fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackPayload {
    fields: BTreeMap<String, String>,
}

impl CallbackPayload {
    /// Empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a url-encoded query string (without the leading `?`)
    pub fn from_query(query: &str) -> Result<Self> {
        Self::from_form(query.as_bytes())
    }

    /// Parse an `application/x-www-form-urlencoded` body
    pub fn from_form(body: &[u8]) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::validation(format!("Invalid form payload: {}", e)))?;
        Ok(Self {
            fields: pairs.into_iter().collect(),
        })
    }

    /// Parse a JSON object body
    ///
    /// Top-level scalars are kept (numbers and booleans as their JSON text);
    /// nested objects, arrays and nulls are dropped.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| Error::validation(format!("Invalid JSON payload: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::validation("JSON payload must be an object"))?;

        let fields = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect();

        Ok(Self { fields })
    }

    /// Parse a request body according to its content type
    ///
    /// Without a recognizable content type a body starting with `{` is read
    /// as JSON and anything else as a form.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let trimmed = body.trim_ascii();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }

        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if content_type.contains("json") {
            Self::from_json(trimmed)
        } else if content_type.contains("x-www-form-urlencoded") {
            Self::from_form(trimmed)
        } else if trimmed.starts_with(b"{") {
            Self::from_json(trimmed)
        } else {
            Self::from_form(trimmed)
        }
    }

    /// Merge another payload into this one; `other` wins on conflicts
    pub fn merge(mut self, other: CallbackPayload) -> Self {
        self.fields.extend(other.fields);
        self
    }

    /// Set a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw field value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|value| value.as_str())
    }

    /// Trimmed, non-empty field value
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|value| !value.is_empty())
    }

    /// Trimmed, non-empty field value or a validation error
    pub fn require(&self, key: &str) -> Result<&str> {
        self.non_empty(key)
            .ok_or_else(|| Error::validation(format!("Missing {} value", key)))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the payload has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
