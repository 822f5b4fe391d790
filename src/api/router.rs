use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, create_loan, delete_loan, get_loan_by_id, index, list_loans, return_book,
};

/// Creates the API router with all loan endpoints
///
/// - GET    /                  - Entry point with links
/// - GET    /loans             - List loans (optional bookId, memberId, status filters)
/// - POST   /loans             - Borrow a book
/// - GET    /loans/:id         - Get loan details
/// - DELETE /loans/:id         - Delete a loan record
/// - POST   /loans/:id/return  - Return a book
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/loans", get(list_loans).post(create_loan))
        .route("/loans/:id", get(get_loan_by_id).delete(delete_loan))
        .route("/loans/:id/return", post(return_book))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
