//! Circulation statistics

use serde::Serialize;
use utoipa::ToSchema;

/// Aggregate snapshot of the loan collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CirculationStats {
    /// Open loans not yet past due
    pub active_count: i64,
    /// Open loans past due
    pub overdue_count: i64,
    /// Active titles in the catalog
    pub total_active_titles: i64,
    /// Active members in the directory
    pub total_active_members: i64,
    pub top_borrowed: Vec<BorrowedTitle>,
}

/// Entry of the most-borrowed ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BorrowedTitle {
    pub title_id: i64,
    /// Loans ever issued against the title
    pub count: i64,
    pub name: Option<String>,
    pub author: Option<String>,
}
