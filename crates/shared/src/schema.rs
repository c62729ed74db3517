use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::CallType,
    field::{FieldId, GroupId},
    form::FieldType,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub field: FieldId,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("declaration {0} must not carry a non-zero position")]
    PositionedDeclaration(FieldId),
    #[error("declaration {0} conflicts with an earlier declaration of another type")]
    ConflictingDeclaration(FieldId),
}

impl FormSchema {
    pub fn declare(mut self, field: FieldId, field_type: FieldType) -> Self {
        self.fields.push(FieldDeclaration { field, field_type });
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut declared: HashMap<FieldId, FieldType> = HashMap::new();
        for decl in &self.fields {
            if !decl.field.is_template() {
                return Err(SchemaError::PositionedDeclaration(decl.field.clone()));
            }
            let previous = declared.insert(decl.field.schema_key(), decl.field_type);
            if previous.is_some_and(|previous| previous != decl.field_type) {
                return Err(SchemaError::ConflictingDeclaration(decl.field.clone()));
            }
        }
        Ok(())
    }
}

/// Schemas of the three forms a request of one call type carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSchemas {
    #[serde(default)]
    pub general: FormSchema,
    #[serde(default)]
    pub institution: FormSchema,
    #[serde(default)]
    pub scoring: FormSchema,
}

impl FormSchemas {
    pub fn validate(&self) -> Result<(), SchemaError> {
        self.general.validate()?;
        self.institution.validate()?;
        self.scoring.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSchemas {
    pub ta: FormSchemas,
    pub va: FormSchemas,
}

impl RequestSchemas {
    pub fn for_call_type(&self, call_type: CallType) -> &FormSchemas {
        match call_type {
            CallType::Ta => &self.ta,
            CallType::Va => &self.va,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        self.ta.validate()?;
        self.va.validate()
    }
}

fn field(id: &str) -> FieldId {
    FieldId::new(id)
}

fn team_group(schema: FormSchema) -> FormSchema {
    let member = |id: &str| FieldId::in_group(GroupId::at("team", 0), id);
    schema
        .declare(member("name"), FieldType::String)
        .declare(member("email"), FieldType::String)
        .declare(member("affiliation"), FieldType::String)
}

impl Default for RequestSchemas {
    fn default() -> Self {
        let ta = FormSchemas {
            general: team_group(
                FormSchema::default()
                    .declare(field("title"), FieldType::String)
                    .declare(field("summary"), FieldType::String)
                    .declare(field("start_date"), FieldType::String)
                    .declare(field("duration_days"), FieldType::String)
                    .declare(field("open_access"), FieldType::Boolean)
                    .declare(field("keywords"), FieldType::List),
            ),
            institution: FormSchema::default()
                .declare(field("facility"), FieldType::String)
                .declare(field("feasible"), FieldType::Boolean)
                .declare(field("comments"), FieldType::String),
            scoring: FormSchema::default()
                .declare(field("scientific_quality"), FieldType::String)
                .declare(field("feasibility"), FieldType::String)
                .declare(field("recommended"), FieldType::Boolean)
                .declare(field("remarks"), FieldType::String),
        };
        let va = FormSchemas {
            general: team_group(
                FormSchema::default()
                    .declare(field("title"), FieldType::String)
                    .declare(field("summary"), FieldType::String)
                    .declare(field("datasets"), FieldType::List),
            ),
            institution: FormSchema::default()
                .declare(field("data_available"), FieldType::Boolean)
                .declare(field("comments"), FieldType::String),
            scoring: FormSchema::default(),
        };
        Self { ta, va }
    }
}
