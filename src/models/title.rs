//! Title model (catalog entry with physical copy counts)

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A catalog title as seen by the circulation core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub author: Option<String>,
    /// Physical copies owned (>= 1)
    pub total_copies: i32,
    /// Copies on the shelf (0 ..= total_copies)
    pub available_copies: i32,
    pub is_active: bool,
}

impl Title {
    /// Copies currently checked out
    pub fn on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn is_consistent(&self) -> bool {
        self.total_copies >= 1 && (0..=self.total_copies).contains(&self.available_copies)
    }
}

/// Title registration used to seed the memory store
#[derive(Debug, Clone, Deserialize)]
pub struct NewTitle {
    pub name: String,
    pub author: Option<String>,
    pub total_copies: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Catalog maintenance request: change the number of owned copies
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResizeTitle {
    pub total_copies: i32,
}

fn default_true() -> bool {
    true
}
