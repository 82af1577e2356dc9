//! Record model shared by sources and sinks.
//!
//! A record is one event: a set of named reference tokens (in column order)
//! plus attribute columns. On disk it is one JSON object per line:
//!
//! ```json
//! {"tokens": {"StreamAOD_ref": "[DB=...][CNT=...][OID=...]"}, "attributes": {"RunNumber": 167607}}
//! ```

mod token;

pub use token::Token;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One input event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    /// Reference columns, in schema order.
    #[serde(default)]
    pub tokens: IndexMap<String, Token>,
    /// Attribute columns, in schema order.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// A record shaped for a destination sink.
///
/// Rows have the same layout as records; only the reference column names may
/// differ (see [`Record::into_row`]).
pub type Row = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference token.
    pub fn with_token(mut self, name: impl Into<String>, token: impl Into<Token>) -> Self {
        self.tokens.insert(name.into(), token.into());
        self
    }

    /// Add an attribute column.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a reference token by column name.
    pub fn token(&self, name: &str) -> Option<&Token> {
        self.tokens.get(name)
    }

    /// Look up an attribute by column name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Iterate reference columns in order.
    pub fn reference_fields(&self) -> impl Iterator<Item = (&str, &Token)> {
        self.tokens.iter().map(|(name, token)| (name.as_str(), token))
    }

    /// Build the destination row for this record.
    ///
    /// Attributes are copied as-is. The token stored under `src_ref` is
    /// stored under `dst_ref` instead, keeping its position; other tokens keep
    /// their names. A pre-existing `dst_ref` column is overwritten by the
    /// renamed one.
    pub fn into_row(self, src_ref: &str, dst_ref: &str) -> Row {
        if src_ref == dst_ref {
            return self;
        }

        let renamed = self.tokens.contains_key(src_ref);
        let tokens = self
            .tokens
            .into_iter()
            .filter(|(name, _)| !(renamed && name == dst_ref))
            .map(|(name, token)| {
                if name == src_ref {
                    (dst_ref.to_string(), token)
                } else {
                    (name, token)
                }
            })
            .collect();

        Row {
            tokens,
            attributes: self.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new()
            .with_token("Token", "[DB=AAA][OID=1-1]")
            .with_token("StreamESD_ref", "[DB=BBB][OID=1-2]")
            .with_attribute("RunNumber", 167607)
            .with_attribute("EventNumber", 12)
    }

    #[test]
    fn test_accessors() {
        let record = sample();
        assert_eq!(record.token("Token").unwrap().db_id(), "AAA");
        assert_eq!(record.field("RunNumber"), Some(&Value::from(167607)));
        let names: Vec<_> = record.reference_fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Token", "StreamESD_ref"]);
    }

    #[test]
    fn test_into_row_renames_primary_ref_in_place() {
        let row = sample().into_row("Token", "StreamAOD_ref");
        let names: Vec<_> = row.tokens.keys().cloned().collect();
        assert_eq!(names, vec!["StreamAOD_ref", "StreamESD_ref"]);
        assert_eq!(row.token("StreamAOD_ref").unwrap().db_id(), "AAA");
        assert_eq!(row.attributes.len(), 2);
    }

    #[test]
    fn test_into_row_same_name_is_identity() {
        let record = sample();
        assert_eq!(record.clone().into_row("Token", "Token"), record);
    }

    #[test]
    fn test_into_row_replaces_existing_destination_column() {
        let row = sample().into_row("Token", "StreamESD_ref");
        assert_eq!(row.tokens.len(), 1);
        assert_eq!(row.token("StreamESD_ref").unwrap().db_id(), "AAA");
    }

    #[test]
    fn test_json_line_shape() {
        let line = r#"{"tokens":{"Token":"[DB=AAA][OID=1-1]"},"attributes":{"RunNumber":1}}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!(record.token("Token").unwrap().db_id(), "AAA");
        assert_eq!(serde_json::to_string(&record).unwrap(), line);
    }
}
