//! Member model (member directory record)

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Library member as supplied by the member directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i64,
    /// Identifier used at the desk (student number)
    pub external_id: String,
    pub name: String,
    pub is_active: bool,
}

/// Member registration used to seed the memory store
#[derive(Debug, Clone, Deserialize)]
pub struct NewMember {
    pub external_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Open-loan index of a member, in issue order
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpenLoans {
    pub member_id: i64,
    pub external_id: String,
    pub loan_ids: Vec<i64>,
}

fn default_true() -> bool {
    true
}
