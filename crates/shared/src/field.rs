//! Structured keys addressing a form field, optionally inside a positioned
//! instance of a repeating group.
//!
//! The string form is `group[pos].field[pos]`, where both the group segment
//! and the positions are optional. `Display` prints positions without leading
//! zeros, so it inverts `parse` for every canonical address.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FormError;

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)(?:\[(\d+)\])?$").expect("segment pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId {
    pub id: String,
    pub position: Option<u32>,
}

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
        }
    }

    pub fn at(id: impl Into<String>, position: u32) -> Self {
        Self {
            id: id.into(),
            position: Some(position),
        }
    }

    pub fn parse(input: &str) -> Result<Self, FormError> {
        let (id, position) = parse_segment(input, input)?;
        Ok(Self { id, position })
    }

    /// Unset and zero positions address the same (first) instance.
    pub fn instance(&self) -> u32 {
        self.position.unwrap_or(0)
    }

    pub fn same_instance(&self, other: &GroupId) -> bool {
        self.id == other.id && self.instance() == other.instance()
    }

    fn template(&self) -> GroupId {
        GroupId {
            id: self.id.clone(),
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldId {
    pub group: Option<GroupId>,
    pub id: String,
    pub position: Option<u32>,
}

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            group: None,
            id: id.into(),
            position: None,
        }
    }

    pub fn in_group(group: GroupId, id: impl Into<String>) -> Self {
        Self {
            group: Some(group),
            id: id.into(),
            position: None,
        }
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn parse(input: &str) -> Result<Self, FormError> {
        let segments: Vec<&str> = input.split('.').collect();
        match segments.as_slice() {
            [field] => {
                let (id, position) = parse_segment(field, input)?;
                Ok(Self {
                    group: None,
                    id,
                    position,
                })
            }
            [group, field] => {
                let (group_id, group_position) = parse_segment(group, input)?;
                let (id, position) = parse_segment(field, input)?;
                Ok(Self {
                    group: Some(GroupId {
                        id: group_id,
                        position: group_position,
                    }),
                    id,
                    position,
                })
            }
            _ => Err(FormError::ParseFieldFailed(input.to_string())),
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group.as_ref().map(|group| group.id.as_str())
    }

    /// Key used to find the declared field: every position cleared, so all
    /// instances of a group share the declaration of their template.
    pub fn schema_key(&self) -> FieldId {
        FieldId {
            group: self.group.as_ref().map(GroupId::template),
            id: self.id.clone(),
            position: None,
        }
    }

    pub fn is_template(&self) -> bool {
        self.position.unwrap_or(0) == 0
            && self.group.as_ref().map_or(true, |group| group.instance() == 0)
    }

    pub fn belongs_to(&self, group: &GroupId) -> bool {
        self.group
            .as_ref()
            .is_some_and(|own| own.same_instance(group))
    }
}

fn parse_segment(segment: &str, input: &str) -> Result<(String, Option<u32>), FormError> {
    let fail = || FormError::ParseFieldFailed(input.to_string());
    let captures = SEGMENT.captures(segment).ok_or_else(fail)?;
    let position = captures
        .get(2)
        .map(|digits| digits.as_str().parse::<u32>())
        .transpose()
        .map_err(|_| fail())?;
    Ok((captures[1].to_string(), position))
}

fn write_segment(f: &mut fmt::Formatter<'_>, id: &str, position: Option<u32>) -> fmt::Result {
    match position {
        Some(position) => write!(f, "{id}[{position}]"),
        None => f.write_str(id),
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segment(f, &self.id, self.position)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(group) = &self.group {
            write!(f, "{group}.")?;
        }
        write_segment(f, &self.id, self.position)
    }
}

impl FromStr for GroupId {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for FieldId {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GroupId {
    type Error = FormError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<String> for FieldId {
    type Error = FormError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GroupId> for String {
    fn from(value: GroupId) -> Self {
        value.to_string()
    }
}

impl From<FieldId> for String {
    fn from(value: FieldId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
#[path = "tests/field_tests.rs"]
mod tests;
