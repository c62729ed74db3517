use serde::{Deserialize, Serialize};

use crate::{
    domain::{CallId, InstitutionId, ScoringId},
    field::{FieldId, GroupId},
    form::{FieldUpdate, FieldValue},
};

/// Commands accepted by the request flows. The target request id travels
/// next to the command, not inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    CreateRequest {
        call_id: CallId,
    },
    /// Writes the general form, or an institution's form when
    /// `institution_id` is set.
    SetFieldValue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        institution_id: Option<InstitutionId>,
        field: FieldId,
        #[serde(default)]
        value: Option<FieldValue>,
    },
    DeleteFieldGroup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        institution_id: Option<InstitutionId>,
        group: GroupId,
    },
    AddInstitutionForm {
        institution_id: InstitutionId,
    },
    DeleteInstitutionForm {
        institution_id: InstitutionId,
    },
    SubmitRequest,
    DeleteRequest,
    CloseRequest,
    ApproveRequest,
    UndoRequestApprove,
    WithdrawRequest,
    Score {
        scoring_id: ScoringId,
        fields: Vec<FieldUpdate>,
    },
    CreateScore,
    DeleteScore {
        scoring_id: ScoringId,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateRequest { .. } => "create_request",
            Command::SetFieldValue { .. } => "set_field_value",
            Command::DeleteFieldGroup { .. } => "delete_field_group",
            Command::AddInstitutionForm { .. } => "add_institution_form",
            Command::DeleteInstitutionForm { .. } => "delete_institution_form",
            Command::SubmitRequest => "submit_request",
            Command::DeleteRequest => "delete_request",
            Command::CloseRequest => "close_request",
            Command::ApproveRequest => "approve_request",
            Command::UndoRequestApprove => "undo_request_approve",
            Command::WithdrawRequest => "withdraw_request",
            Command::Score { .. } => "score",
            Command::CreateScore => "create_score",
            Command::DeleteScore { .. } => "delete_score",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_value_reads_address_grammar() {
        let raw = serde_json::json!({
            "type": "set_field_value",
            "payload": { "field": "team[2].name", "value": "Ada" }
        });
        let command: Command = serde_json::from_value(raw).expect("command");
        let Command::SetFieldValue {
            institution_id,
            field,
            value,
        } = command
        else {
            panic!("unexpected command");
        };
        assert_eq!(institution_id, None);
        assert_eq!(field.to_string(), "team[2].name");
        assert_eq!(value, Some(FieldValue::Text("Ada".into())));
    }

    #[test]
    fn unit_commands_need_no_payload() {
        let command: Command =
            serde_json::from_value(serde_json::json!({ "type": "submit_request" }))
                .expect("command");
        assert_eq!(command, Command::SubmitRequest);
    }

    #[test]
    fn numeric_values_are_rejected() {
        let raw = serde_json::json!({
            "type": "set_field_value",
            "payload": { "field": "title", "value": 12 }
        });
        let err = serde_json::from_value::<Command>(raw).expect_err("should fail");
        assert!(err.to_string().contains("unsupported field value"));
    }

    #[test]
    fn malformed_address_is_rejected() {
        let raw = serde_json::json!({
            "type": "delete_field_group",
            "payload": { "group": "team[x]" }
        });
        let err = serde_json::from_value::<Command>(raw).expect_err("should fail");
        assert!(err.to_string().contains("cannot parse field address"));
    }
}
