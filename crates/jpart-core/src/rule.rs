//! Partitioning rules.
//!
//! A rule is an ordered list of parts. Each part pulls one value out of a
//! record, either by plain hierarchical lookup or through a [`Filter`], and
//! the resulting values form the partition key naming the output file.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::{AppendFile, Resource, SharedCache};
use crate::error::{PartitionError, Result};
use crate::filter::{Filter, FilterMappings};
use crate::hierarchy::lookup;
use crate::output::{construct_output_filename, write_json_line};

/// Marks a filter reference inside a rule part, e.g. `["status", "!active_only"]`.
pub const FILTER_MARKER: char = '!';

/// A rule part as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPart {
    /// Bare field reference.
    Field(String),
    /// Field reference plus a `!`-prefixed filter name.
    Filtered(String, String),
}

impl RawPart {
    pub fn field(&self) -> &str {
        match self {
            RawPart::Field(field) | RawPart::Filtered(field, _) => field,
        }
    }
}

enum Part {
    Field(String),
    Filtered { field: String, filter: Box<dyn Filter> },
}

impl Part {
    fn field(&self) -> &str {
        match self {
            Part::Field(field) | Part::Filtered { field, .. } => field,
        }
    }
}

/// Why a rule produced nothing for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The referenced field is absent from the record.
    NotFound,
    /// A filter rejected the extracted value.
    NotQualified,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found"),
            SkipReason::NotQualified => write!(f, "not qualified"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub field: String,
    pub reason: SkipReason,
}

/// Result of applying a rule to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Validated, stringified values in part order.
    Partition(Vec<String>),
    /// The rule does not apply to this record.
    Skip(Skip),
}

pub struct Rule {
    name: String,
    parts: Vec<Part>,
    cache: Option<SharedCache>,
}

impl Rule {
    /// Build a rule, instantiating a filter for each filtered part.
    pub fn new(
        filters: &FilterMappings,
        name: impl Into<String>,
        raw_parts: &[RawPart],
        cache: Option<SharedCache>,
    ) -> Result<Self> {
        let name = name.into();
        let parts = Self::process_parts(filters, &name, raw_parts)?;

        Ok(Self { name, parts, cache })
    }

    fn process_parts(filters: &FilterMappings, rule_name: &str, raw_parts: &[RawPart]) -> Result<Vec<Part>> {
        raw_parts
            .iter()
            .map(|raw| match raw {
                RawPart::Field(field) => Ok(Part::Field(field.clone())),
                RawPart::Filtered(field, reference) => {
                    let filter_name = reference.strip_prefix(FILTER_MARKER).ok_or_else(|| {
                        PartitionError::MissingFilterMarker(reference.clone(), rule_name.to_string())
                    })?;

                    let factory = filters.get(filter_name).ok_or_else(|| PartitionError::UnknownFilter {
                        rule: rule_name.to_string(),
                        filter: filter_name.to_string(),
                    })?;

                    Ok(Part::Filtered {
                        field: field.clone(),
                        filter: factory(),
                    })
                }
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field references in part order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(Part::field)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Resolve every part against `record`.
    ///
    /// Stops at the first part that skips. Non-scalar and filename-unsafe
    /// values are errors: they mean the rule was written against the wrong
    /// field.
    pub fn apply(&self, record: &Value) -> Result<Evaluation> {
        let mut values = Vec::with_capacity(self.parts.len());

        for part in &self.parts {
            let value = match self.value_for_part(part, record) {
                Ok(value) => value,
                Err(skip) => return Ok(Evaluation::Skip(skip)),
            };

            values.push(self.filename_value(part.field(), &value)?);
        }

        Ok(Evaluation::Partition(values))
    }

    fn value_for_part<'r>(&self, part: &Part, record: &'r Value) -> std::result::Result<Cow<'r, Value>, Skip> {
        match part {
            Part::Field(field) => lookup(record, field)
                .map(Cow::Borrowed)
                .map_err(|_| not_found(field)),
            Part::Filtered { field, filter } => {
                let value = filter.get_value(field, record).map_err(|_| not_found(field))?;

                if !filter.does_qualify(field, &value) {
                    return Err(Skip {
                        field: field.clone(),
                        reason: SkipReason::NotQualified,
                    });
                }

                Ok(value)
            }
        }
    }

    fn filename_value(&self, field: &str, value: &Value) -> Result<String> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            other => {
                return Err(PartitionError::NonScalarValue {
                    rule: self.name.clone(),
                    field: field.to_string(),
                    kind: value_kind(other),
                })
            }
        };

        if !is_filename_safe(&text) {
            return Err(PartitionError::UnsafeValue {
                rule: self.name.clone(),
                field: field.to_string(),
                value: text,
            });
        }

        Ok(text)
    }

    /// Append `record` to the partition file named by `key_parts`.
    ///
    /// Without a cache the file is opened, written and closed on every call.
    /// With one, the resource stays open and the cache decides when to close
    /// it.
    pub fn write_record(&self, output_root: &Path, rule_name: &str, record: &Value, key_parts: &[String]) -> Result<()> {
        let filename = construct_output_filename(key_parts);

        match &self.cache {
            None => {
                let rule_output_path = output_root.join(rule_name);
                if !rule_output_path.exists() {
                    std::fs::create_dir_all(&rule_output_path)?;
                }

                let mut file = AppendFile::open(rule_output_path.join(&filename))?;
                write_json_line(&mut file, record)?;
                file.close()?;
            }
            Some(shared) => {
                // Relative to the output root, so the name is unique across rules.
                let rel_filepath = format!("{}/{}", rule_name, filename);

                let mut cache = shared.lock().map_err(|_| PartitionError::CachePoisoned)?;
                let resource = cache.get_or_create(&rel_filepath)?;
                write_json_line(resource, record)?;
            }
        }

        debug!(rule = %self.name, file = %filename, "Wrote record");
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("fields", &self.fields().collect::<Vec<_>>())
            .field("cached", &self.is_cached())
            .finish()
    }
}

fn not_found(field: &str) -> Skip {
    Skip {
        field: field.to_string(),
        reason: SkipReason::NotFound,
    }
}

/// Letters, digits, `-`, `_`, `.` and space.
pub(crate) fn is_filename_safe(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
