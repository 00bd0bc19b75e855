mod access;
mod aggregation;
mod errors;
mod fine_service;
mod inventory;
mod lending_service;
mod overdue_report;
mod queries;

pub use aggregation::summarize;
pub use errors::{LendingError, Result};
pub use fine_service::pay_fine;
pub use inventory::{register_copy, title_availability, withdraw_copy};
pub use lending_service::{
    ServiceDependencies, checkout, checkout_title, mark_lost, renew_loan, return_loan,
};
pub use overdue_report::{OverdueLoan, overdue_report};
pub use queries::{LoanDetails, get_loan, list_loans, unpaid_fines};
