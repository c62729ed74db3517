use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(CallId);
id_newtype!(RequestId);
id_newtype!(InstitutionId);
id_newtype!(InstitutionFormId);
id_newtype!(CoordinatorId);
id_newtype!(ScoringId);

impl From<UserId> for CoordinatorId {
    fn from(value: UserId) -> Self {
        Self(value.0)
    }
}

impl ScoringId {
    /// Scoring ids are derived from the request and the scorer, so allocating
    /// the same scorer twice lands on the same row.
    pub fn for_scorer(request_id: RequestId, scorer_id: UserId) -> Self {
        Self(Uuid::new_v5(&request_id.0, scorer_id.0.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Ta,
    Va,
}

impl CallType {
    pub fn as_str(self) -> &'static str {
        match self {
            CallType::Ta => "ta",
            CallType::Va => "va",
        }
    }
}

impl std::str::FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ta" => Ok(CallType::Ta),
            "va" => Ok(CallType::Va),
            other => Err(format!("unknown call type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub name: String,
    pub call_type: CallType,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.start <= now && now < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
}

/// The authenticated user a command originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    pub id: CoordinatorId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorer {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub country_code: String,
}

/// Reference to the authorization resource registered for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(pub String);
