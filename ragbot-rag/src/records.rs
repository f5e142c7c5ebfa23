//! Splitting structured sources (JSON, CSV) into one document per record.
//!
//! Names found in sensitive fields are collected across the whole source,
//! then replaced everywhere: the sensitive fields themselves become the
//! placeholder and free text is run through an [`Anonymizer`].

use std::collections::{BTreeSet, HashMap};

use ragbot_core::{RagError, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::chunking::Document;
use crate::privacy::{ANONYMIZED_PERSON, Anonymizer};

/// Record type of the elements of a top-level JSON array.
pub const RECORD_TYPE: &str = "record";
/// Record type of CSV rows.
pub const CSV_ROW_TYPE: &str = "csv_row";

/// Turns structured sources into [`Document`]s, one per record.
///
/// A JSON source is either an array of objects or an object whose
/// array-of-object fields hold the records (`{"Decrees": [...], "Orders":
/// [...]}`); the field name becomes the record type. A JSON object without
/// such fields is a single record. Each CSV row is a record.
///
/// The document text joins every value found under a text field, in key
/// order. A record without text fields is rendered as compact JSON.
/// Scalar fields outside the text fields become metadata, nested objects
/// flattened with dotted keys (`Appointee.Name`). Metadata also carries
/// `source`, `record_type` and the 1-based `record_index`.
#[derive(Debug, Clone)]
pub struct RecordSplitter {
    sensitive_fields: BTreeSet<String>,
    text_fields: BTreeSet<String>,
    placeholder: String,
}

impl Default for RecordSplitter {
    fn default() -> Self {
        Self {
            sensitive_fields: ["Name", "Replacement"].map(String::from).into(),
            text_fields: ["Content", "Content_EN", "Content_FR", "Text_Content"]
                .map(String::from)
                .into(),
            placeholder: ANONYMIZED_PERSON.to_string(),
        }
    }
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field names whose string values are personal names.
    pub fn with_sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Field names whose string values form the document text.
    pub fn with_text_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Split a JSON document read from `source`.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidDocument`] if `json` does not parse.
    pub fn split_json(&self, source: &str, json: &str) -> Result<Vec<Document>> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RagError::InvalidDocument(format!("{source}: {e}")))?;
        self.split_json_value(source, &value)
    }

    pub fn split_json_value(&self, source: &str, value: &Value) -> Result<Vec<Document>> {
        let mut records: Vec<(String, &Map<String, Value>)> = Vec::new();
        match value {
            Value::Array(items) => {
                records.extend(objects(items).map(|o| (RECORD_TYPE.to_string(), o)));
            }
            Value::Object(map) => {
                for (key, field) in map {
                    if let Value::Array(items) = field {
                        records.extend(objects(items).map(|o| (record_type(key), o)));
                    }
                }
                if records.is_empty() {
                    records.push((RECORD_TYPE.to_string(), map));
                }
            }
            _ => {
                return Err(RagError::InvalidDocument(format!(
                    "{source}: expected a JSON object or array"
                )));
            }
        }
        self.build(source, records)
    }

    /// Split CSV with a header row read from `source`.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidDocument`] on malformed CSV, including rows whose
    /// field count differs from the header.
    pub fn split_csv<R: std::io::Read>(&self, source: &str, reader: R) -> Result<Vec<Document>> {
        let invalid = |e: csv::Error| RagError::InvalidDocument(format!("{source}: {e}"));
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers().map_err(invalid)?.clone();

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row.map_err(invalid)?;
            let map: Map<String, Value> = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect();
            rows.push(map);
        }
        self.build(source, rows.iter().map(|r| (CSV_ROW_TYPE.to_string(), r)).collect())
    }

    fn build(
        &self,
        source: &str,
        records: Vec<(String, &Map<String, Value>)>,
    ) -> Result<Vec<Document>> {
        let mut names = Vec::new();
        for (_, record) in &records {
            self.collect_names(record, &mut names);
        }
        let anonymizer = Anonymizer::new(&names)?.with_placeholder(self.placeholder.clone());

        let mut per_type: HashMap<&str, usize> = HashMap::new();
        let mut documents = Vec::with_capacity(records.len());
        for (kind, record) in &records {
            let index = per_type.entry(kind.as_str()).or_default();
            *index += 1;

            let record = self.anonymize(record, &anonymizer);
            let mut texts = Vec::new();
            let mut metadata = HashMap::new();
            self.extract(&record, "", &mut texts, &mut metadata);

            let text = if texts.is_empty() {
                Value::Object(record).to_string()
            } else {
                texts.join("\n\n")
            };
            metadata.insert("source".to_string(), source.to_string());
            metadata.insert("record_type".to_string(), kind.clone());
            metadata.insert("record_index".to_string(), index.to_string());

            documents.push(Document {
                id: format!("{source}/{kind}/{index}"),
                text,
                version: None,
                metadata,
            });
        }

        debug!(
            source,
            records = documents.len(),
            sensitive_names = names.len(),
            "split structured source"
        );
        Ok(documents)
    }

    fn collect_names(&self, map: &Map<String, Value>, names: &mut Vec<String>) {
        for (key, value) in map {
            match value {
                Value::String(s) if self.sensitive_fields.contains(key) && !s.trim().is_empty() => {
                    names.push(s.clone());
                }
                Value::Object(inner) => self.collect_names(inner, names),
                Value::Array(items) => {
                    for inner in objects(items) {
                        self.collect_names(inner, names);
                    }
                }
                _ => {}
            }
        }
    }

    fn anonymize(&self, map: &Map<String, Value>, anonymizer: &Anonymizer) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let value = if self.sensitive_fields.contains(key) && is_present(value) {
                    Value::String(self.placeholder.clone())
                } else {
                    self.anonymize_value(value, anonymizer)
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn anonymize_value(&self, value: &Value, anonymizer: &Anonymizer) -> Value {
        match value {
            Value::String(s) => Value::String(anonymizer.anonymize(s)),
            Value::Object(map) => Value::Object(self.anonymize(map, anonymizer)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.anonymize_value(v, anonymizer)).collect())
            }
            other => other.clone(),
        }
    }

    fn extract(
        &self,
        map: &Map<String, Value>,
        prefix: &str,
        texts: &mut Vec<String>,
        metadata: &mut HashMap<String, String>,
    ) {
        for (key, value) in map {
            let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            match value {
                Value::String(s) if self.text_fields.contains(key) => {
                    if !s.trim().is_empty() {
                        texts.push(s.clone());
                    }
                }
                Value::String(s) => {
                    metadata.insert(path, s.clone());
                }
                Value::Number(n) => {
                    metadata.insert(path, n.to_string());
                }
                Value::Bool(b) => {
                    metadata.insert(path, b.to_string());
                }
                Value::Object(inner) => self.extract(inner, &path, texts, metadata),
                // Only text is taken from arrays; their scalars have no stable key.
                Value::Array(items) => {
                    for inner in objects(items) {
                        self.extract_text(inner, texts);
                    }
                }
                Value::Null => {}
            }
        }
    }

    fn extract_text(&self, map: &Map<String, Value>, texts: &mut Vec<String>) {
        for (key, value) in map {
            match value {
                Value::String(s) if self.text_fields.contains(key) && !s.trim().is_empty() => {
                    texts.push(s.clone());
                }
                Value::Object(inner) => self.extract_text(inner, texts),
                Value::Array(items) => {
                    for inner in objects(items) {
                        self.extract_text(inner, texts);
                    }
                }
                _ => {}
            }
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn objects(items: &[Value]) -> impl Iterator<Item = &Map<String, Value>> {
    items.iter().filter_map(Value::as_object)
}

/// `"Decrees"` → `"decree"`.
fn record_type(key: &str) -> String {
    let lower = key.to_lowercase();
    match lower.strip_suffix('s') {
        Some(singular) if !singular.is_empty() => singular.to_string(),
        _ => lower,
    }
}
