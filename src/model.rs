use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of fillable control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTag {
    Input,
    Textarea,
    Select,
}

impl FieldTag {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "input" => Some(Self::Input),
            "textarea" => Some(Self::Textarea),
            "select" => Some(Self::Select),
            _ => None,
        }
    }
}

/// One fillable control on one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub selector: String,
    pub tag: FieldTag,
    pub input_type: String,
    pub name: String,
    pub dom_id: String,
    pub label: String,
}

impl FieldDescriptor {
    pub fn is_toggle(&self) -> bool {
        self.tag == FieldTag::Input && matches!(self.input_type.as_str(), "checkbox" | "radio")
    }
}

/// The fillable-field inventory of one step, as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub fields: Vec<FieldDescriptor>,
    /// Locator of the control the scanner used to leave this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance: Option<String>,
}

impl PageSnapshot {
    pub fn field_selectors(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.selector.as_str()).collect()
    }

    /// Same fields at the same location: the flow did not move.
    pub fn same_step_as(&self, other: &PageSnapshot) -> bool {
        self.url == other.url && self.field_selectors() == other.field_selectors()
    }
}

/// Recorded steps in replay order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flow {
    pub steps: Vec<PageSnapshot>,
}

impl Flow {
    pub fn new(steps: Vec<PageSnapshot>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Stable key for persisting a mapping alongside this flow.
    pub fn fingerprint(&self) -> String {
        use sha1::{Digest, Sha1};

        let mut hasher = Sha1::new();
        for step in &self.steps {
            hasher.update(step.url.as_bytes());
            hasher.update([0]);
            for selector in step.field_selectors() {
                hasher.update(selector.as_bytes());
                hasher.update([0]);
            }
            hasher.update([1]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Selector to column name. Selectors not present are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, selector: impl Into<String>, column: impl Into<String>) {
        self.0.insert(selector.into(), column.into());
    }

    pub fn with(mut self, selector: impl Into<String>, column: impl Into<String>) -> Self {
        self.insert(selector, column);
        self
    }

    pub fn column_for(&self, selector: &str) -> Option<&str> {
        self.0.get(selector).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tag every field of a step with its mapped column.
    pub fn apply(&self, step: &PageSnapshot) -> Vec<MappedField> {
        step.fields
            .iter()
            .map(|field| MappedField {
                map_to: self.column_for(&field.selector).map(str::to_string),
                field: field.clone(),
            })
            .collect()
    }

    /// Pre-fill a mapping by matching column names against field name, id or label.
    pub fn suggest<'a>(
        fields: impl IntoIterator<Item = &'a FieldDescriptor>,
        header: &[String],
    ) -> Self {
        let mut mapping = Self::new();
        for field in fields {
            let candidates = [&field.name, &field.dom_id, &field.label];
            let hit = header.iter().find(|column| {
                candidates
                    .iter()
                    .any(|c| !c.is_empty() && c.trim().eq_ignore_ascii_case(column.trim()))
            });
            if let Some(column) = hit {
                mapping.insert(field.selector.clone(), column.clone());
            }
        }
        mapping
    }
}

/// A field paired with the column that feeds it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedField {
    #[serde(flatten)]
    pub field: FieldDescriptor,
    #[serde(default)]
    pub map_to: Option<String>,
}

/// One record of the data set, keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRow(BTreeMap<String, String>);

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Rows in submission order.
pub type DataSet = Vec<DataRow>;
