//! Transformers between a record type and a subset of its fields.
//!
//! The subset is a record type synthesized from the named fields, in the
//! order they were named. Names match case-insensitively against a field's
//! name or its alias. Values move by field position, so the records must
//! have exactly the declared number of fields.

use crate::error::ConfigError;
use async_trait::async_trait;
use indexmap::IndexMap;
use rhi_tributary_core::{RecordType, Sink, TransformError, Transformer, Value, ValueType};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Which fields of `full` make up `subset`.
#[derive(Debug, Clone)]
struct Selection {
    full: RecordType,
    subset: RecordType,
    /// `index[i]` is the position in `full` of subset field `i`.
    index: Vec<usize>,
}

impl Selection {
    fn new<I, S>(ty: &ValueType, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        if names.is_empty() {
            return Err(ConfigError::EmptyNames);
        }
        let full = ty
            .as_record()
            .ok_or_else(|| ConfigError::NotRecord(ty.clone()))?
            .clone();

        let mut positions: HashMap<String, usize> = HashMap::new();
        for (position, field) in full.fields().iter().enumerate() {
            let mut keys = vec![field.name.to_lowercase()];
            if let Some(alias) = &field.alias {
                let alias = alias.to_lowercase();
                if alias != keys[0] {
                    keys.push(alias);
                }
            }
            for key in keys {
                if positions.insert(key.clone(), position).is_some() {
                    return Err(ConfigError::NameClash(key));
                }
            }
        }

        let mut subset = RecordType::new();
        let mut index = Vec::with_capacity(names.len());
        for name in &names {
            let name = name.as_ref();
            let position = *positions
                .get(&name.to_lowercase())
                .ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
            if index.contains(&position) {
                return Err(ConfigError::DuplicateField(name.to_string()));
            }
            subset.push(full.fields()[position].clone());
            index.push(position);
        }

        Ok(Self {
            full,
            subset,
            index,
        })
    }
}

/// Take the fields of a record value that has exactly `expected` fields.
fn record_fields(
    value: Value,
    expected: &RecordType,
) -> Result<IndexMap<String, Value>, TransformError> {
    match value {
        Value::Record(fields) if fields.len() == expected.len() => Ok(fields),
        other => Err(TransformError::invalid_input(
            ValueType::Record(expected.clone()),
            &other,
        )),
    }
}

/// Expands a subset record into the full record.
///
/// Fields not in the subset get their zero value.
#[derive(Debug, Clone)]
pub struct RecordExpander {
    selection: Selection,
}

impl RecordExpander {
    /// Expand into `ty` from a record of the named fields.
    pub fn new<I, S>(ty: &ValueType, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            selection: Selection::new(ty, names)?,
        })
    }
}

#[async_trait]
impl Transformer for RecordExpander {
    fn input_type(&self) -> ValueType {
        ValueType::Record(self.selection.subset.clone())
    }

    fn output_type(&self) -> ValueType {
        ValueType::Record(self.selection.full.clone())
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let fields = record_fields(value, &self.selection.subset)?;

        let mut output = self.selection.full.zero_fields();
        for (&position, value) in self.selection.index.iter().zip(fields.into_values()) {
            if let Some((_, slot)) = output.get_index_mut(position) {
                *slot = value;
            }
        }

        sink.send(token, Value::Record(output))
    }
}

/// Collapses a full record into a record of the named fields.
#[derive(Debug, Clone)]
pub struct RecordCollapser {
    selection: Selection,
}

impl RecordCollapser {
    /// Collapse records of `ty` into a record of the named fields.
    pub fn new<I, S>(ty: &ValueType, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            selection: Selection::new(ty, names)?,
        })
    }
}

#[async_trait]
impl Transformer for RecordCollapser {
    fn input_type(&self) -> ValueType {
        ValueType::Record(self.selection.full.clone())
    }

    fn output_type(&self) -> ValueType {
        ValueType::Record(self.selection.subset.clone())
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let mut fields = record_fields(value, &self.selection.full)?;

        let output = self
            .selection
            .index
            .iter()
            .zip(self.selection.subset.fields())
            .map(|(&position, decl)| {
                let value = fields
                    .get_index_mut(position)
                    .map(|(_, value)| std::mem::take(value))
                    .unwrap_or_default();
                (decl.name.clone(), value)
            })
            .collect();

        sink.send(token, Value::Record(output))
    }
}
