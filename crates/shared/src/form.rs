use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::FormError,
    field::{FieldId, GroupId},
    schema::FormSchema,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Boolean,
    List,
}

/// A field value as it travels over the wire: a JSON string, boolean or
/// array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Checkbox(bool),
    List(Vec<String>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::String,
            FieldValue::Checkbox(_) => FieldType::Boolean,
            FieldValue::List(_) => FieldType::List,
        }
    }
}

impl TryFrom<serde_json::Value> for FieldValue {
    type Error = FormError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(text) => Ok(FieldValue::Text(text)),
            serde_json::Value::Bool(checked) => Ok(FieldValue::Checkbox(checked)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(text) => Ok(text),
                    other => Err(FormError::UnsupportedType(format!("list item {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            other => Err(FormError::UnsupportedType(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        FieldValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A stored field: its declared type never changes, its value may be unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

impl Field {
    pub fn empty(field_type: FieldType) -> Self {
        Self {
            field_type,
            value: None,
        }
    }
}

/// A single write against a form; `None` clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: FieldId,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

/// Grouped read shape of a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormEntry<'a> {
    Single {
        field_id: &'a FieldId,
        field: &'a Field,
    },
    Group {
        group_id: &'a str,
        fields: Vec<(&'a FieldId, &'a Field)>,
    },
}

/// Mapping from exact field address to a typed field.
///
/// Declarations are registered once per group template. Writes are checked
/// against the template's declared type but stored under the exact address,
/// which is how new group instances come into existence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicForm {
    fields: BTreeMap<FieldId, Field>,
}

impl DynamicForm {
    pub fn from_schema(schema: &FormSchema) -> Self {
        Self {
            fields: schema
                .fields
                .iter()
                .map(|decl| (decl.field.clone(), Field::empty(decl.field_type)))
                .collect(),
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = (FieldId, FieldValue)>) -> Self {
        Self {
            fields: values
                .into_iter()
                .map(|(address, value)| {
                    let field = Field {
                        field_type: value.field_type(),
                        value: Some(value),
                    };
                    (address, field)
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, address: &FieldId) -> Option<&Field> {
        self.fields.get(address)
    }

    pub fn value(&self, address: &FieldId) -> Option<&FieldValue> {
        self.fields.get(address).and_then(|field| field.value.as_ref())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldId, &Field)> {
        self.fields.iter()
    }

    pub fn declared_type(&self, address: &FieldId) -> Option<FieldType> {
        if let Some(field) = self.fields.get(address) {
            return Some(field.field_type);
        }
        template_keys(address)
            .into_iter()
            .find_map(|key| self.fields.get(&key))
            .map(|field| field.field_type)
    }

    pub fn set_field_value(
        &mut self,
        address: FieldId,
        value: Option<FieldValue>,
    ) -> Result<(), FormError> {
        let declared = self
            .declared_type(&address)
            .ok_or_else(|| FormError::FieldNotFound(address.clone()))?;
        if let Some(value) = &value {
            if value.field_type() != declared {
                return Err(FormError::FieldTypeMismatch {
                    field: address,
                    expected: declared,
                    actual: value.field_type(),
                });
            }
        }
        self.fields.insert(
            address,
            Field {
                field_type: declared,
                value,
            },
        );
        Ok(())
    }

    /// Deletes one instance of a repeating group.
    ///
    /// The first instance, or a group left with exactly two addresses, is
    /// cleared in place so an empty instance stays available for re-entry.
    /// Any other instance is removed outright.
    pub fn delete_group(&mut self, group: &GroupId) {
        let in_group = self
            .fields
            .keys()
            .filter(|address| address.group_id() == Some(group.id.as_str()))
            .count();

        if group.instance() == 0 || in_group == 2 {
            for (address, field) in self.fields.iter_mut() {
                if address.belongs_to(group) {
                    field.value = None;
                }
            }
        } else {
            self.fields.retain(|address, _| !address.belongs_to(group));
        }
    }

    pub fn group_values(&self, group_id: &str) -> Vec<(&FieldId, &Field)> {
        self.fields
            .iter()
            .filter(|(address, _)| address.group_id() == Some(group_id))
            .collect()
    }

    pub fn all(&self) -> Vec<FormEntry<'_>> {
        let mut seen_groups = HashSet::new();
        let mut entries = Vec::new();
        for (field_id, field) in &self.fields {
            match field_id.group_id() {
                None => entries.push(FormEntry::Single { field_id, field }),
                Some(group_id) => {
                    if seen_groups.insert(group_id) {
                        entries.push(FormEntry::Group {
                            group_id,
                            fields: self.group_values(group_id),
                        });
                    }
                }
            }
        }
        entries
    }
}

/// Addresses the first instance of `address` can be stored under: each
/// position either unset or zero.
fn template_keys(address: &FieldId) -> [FieldId; 4] {
    let unset = address.schema_key();
    let zeroed_group = FieldId {
        group: unset
            .group
            .as_ref()
            .map(|group| GroupId::at(group.id.clone(), 0)),
        ..unset.clone()
    };
    [
        unset.clone(),
        unset.with_position(0),
        zeroed_group.clone(),
        zeroed_group.with_position(0),
    ]
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
