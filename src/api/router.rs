use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, checkout, checkout_title, get_loan, list_loans, mark_lost, overdue_report,
    pay_fine, register_copy, renew_loan, return_loan, summary, title_availability, unpaid_fines,
    withdraw_copy,
};

/// Creates the API router with all lending and fine ledger endpoints
///
/// Lending (Write operations):
/// - POST /loans - Check out a copy
/// - POST /titles/:id/checkout - Check out any available copy of a title
/// - POST /loans/:id/return - Return a loan
/// - POST /loans/:id/renew - Renew a loan
/// - POST /loans/:id/lost - Mark a loan lost
/// - POST /loans/:id/payments - Pay a fine
///
/// Inventory:
/// - POST /copies - Register a copy
/// - POST /copies/:id/withdraw - Withdraw a copy
/// - GET /titles/:id/availability - Copy counts for a title
///
/// Queries (Read operations):
/// - GET /loans/:id - Loan details with payments and balance
/// - GET /borrowers/:id/loans - A borrower's loans
/// - GET /borrowers/:id/fines - A borrower's unpaid fines
/// - GET /summary - Role-scoped dashboard counts
/// - GET /overdue - Overdue loans
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Lending
        .route("/loans", post(checkout))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/return", post(return_loan))
        .route("/loans/:id/renew", post(renew_loan))
        .route("/loans/:id/lost", post(mark_lost))
        .route("/loans/:id/payments", post(pay_fine))
        .route("/titles/:id/checkout", post(checkout_title))
        // Inventory
        .route("/copies", post(register_copy))
        .route("/copies/:id/withdraw", post(withdraw_copy))
        .route("/titles/:id/availability", get(title_availability))
        // Borrower views and dashboards
        .route("/borrowers/:id/loans", get(list_loans))
        .route("/borrowers/:id/fines", get(unpaid_fines))
        .route("/summary", get(summary))
        .route("/overdue", get(overdue_report))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
