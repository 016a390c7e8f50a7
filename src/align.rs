//! Positional alignment of per-field values into rows.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::constants::{RESERVED_COLUMNS, SOURCE_COLUMN};
use crate::resolve::FieldOutcome;

/// Ordered mapping from field label to the values that field produced.
///
/// Insertion order is kept so exported columns follow the field order the
/// caller gave, not the incidental order of a hash map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    entries: Vec<(String, Vec<String>)>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the values of a label. An existing label keeps its position.
    pub fn insert(&mut self, label: impl Into<String>, values: Vec<String>) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, existing_values)) => *existing_values = values,
            None => self.entries.push((label, values)),
        }
    }

    /// Builds the mapping from resolved fields. Repeated labels are kept
    /// apart as `Label (2)`, `Label (3)` and so on.
    pub fn from_outcomes(outcomes: &[FieldOutcome]) -> Self {
        let labels = column_labels(outcomes.iter().map(|outcome| outcome.label.as_str()));
        labels
            .into_iter()
            .zip(outcomes)
            .map(|(label, outcome)| (label, outcome.values.clone()))
            .collect()
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, values)| values.as_slice())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(label, values)| (label.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the longest value list, 0 when there are no fields.
    pub fn max_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0)
    }
}

/// Column headers for a list of field labels, with repeats made unique.
///
/// `source` and `error` belong to the export columns, so labels using them
/// are suffixed too.
pub fn column_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for label in labels {
        let taken = |candidate: &str| {
            RESERVED_COLUMNS.contains(&candidate)
                || columns.iter().any(|existing| existing == candidate)
        };
        let column = if taken(label) {
            (2..)
                .map(|suffix| format!("{label} ({suffix})"))
                .find(|candidate| !taken(candidate))
                .unwrap_or_else(|| label.to_owned())
        } else {
            label.to_owned()
        };
        columns.push(column);
    }
    columns
}

impl<L: Into<String>> FromIterator<(L, Vec<String>)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (L, Vec<String>)>>(iter: I) -> Self {
        let mut field_values = Self::new();
        for (label, values) in iter {
            field_values.insert(label, values);
        }
        field_values
    }
}

/// One aligned row: a value for every field label, plus the document it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecord {
    source: Option<String>,
    cells: Vec<(String, String)>,
}

impl RowRecord {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self {
            source: None,
            cells,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(label, _)| label.as_str())
    }

    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(label, value)| (label.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for RowRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.source.is_some());
        let mut map = serializer.serialize_map(Some(self.cells.len() + extra))?;
        if let Some(source) = &self.source {
            map.serialize_entry(SOURCE_COLUMN, source)?;
        }
        for (label, value) in &self.cells {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Joins per-field values by index.
///
/// Produces `max_len()` rows; row `i` holds the `i`-th value of every field,
/// or an empty string for fields with fewer values. No fields, no rows.
pub fn align_rows(field_values: &FieldValues) -> Vec<RowRecord> {
    (0..field_values.max_len())
        .map(|index| {
            RowRecord::new(
                field_values
                    .iter()
                    .map(|(label, values)| {
                        (
                            label.to_owned(),
                            values.get(index).cloned().unwrap_or_default(),
                        )
                    })
                    .collect(),
            )
        })
        .collect()
}
