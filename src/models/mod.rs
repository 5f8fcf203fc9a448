//! Data models for the circulation core

pub mod loan;
pub mod member;
pub mod principal;
pub mod stats;
pub mod title;

// Re-export commonly used types
pub use loan::{Fine, Loan, LoanFilter, LoanPage, LoanQuery, LoanStatus, NewLoan};
pub use member::{Member, NewMember, OpenLoans};
pub use principal::{Claims, Principal, Role};
pub use stats::{BorrowedTitle, CirculationStats};
pub use title::{NewTitle, ResizeTitle, Title};
