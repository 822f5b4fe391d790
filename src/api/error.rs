use crate::application::loan::LoanApplicationError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub struct ApiError(LoanApplicationError);

impl From<LoanApplicationError> for ApiError {
    fn from(err: LoanApplicationError) -> Self {
        ApiError(err)
    }
}

/// リクエストボディの解析失敗は`INVALID_REQUEST`として返す
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LoanApplicationError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(LoanApplicationError::InvalidRequest(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            LoanApplicationError::BookNotFound
            | LoanApplicationError::MemberNotFound
            | LoanApplicationError::LoanNotFound => StatusCode::NOT_FOUND,
            LoanApplicationError::BookUnavailable => StatusCode::CONFLICT,
            LoanApplicationError::AlreadyReturned | LoanApplicationError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            LoanApplicationError::LedgerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self.0 {
            // 404 Not Found
            LoanApplicationError::BookNotFound => ("BOOK_NOT_FOUND", "Book not found".to_string()),
            LoanApplicationError::MemberNotFound => {
                ("MEMBER_NOT_FOUND", "Member not found".to_string())
            }
            LoanApplicationError::LoanNotFound => ("LOAN_NOT_FOUND", "Loan not found".to_string()),

            // 409 Conflict
            LoanApplicationError::BookUnavailable => {
                ("BOOK_UNAVAILABLE", "Book is not available".to_string())
            }

            // 400 Bad Request
            LoanApplicationError::AlreadyReturned => {
                ("ALREADY_RETURNED", "Loan already returned".to_string())
            }
            LoanApplicationError::InvalidRequest(msg) => ("INVALID_REQUEST", msg),

            // 500 Internal Server Error
            // 詳細はログのみに残し、クライアントには一般的なメッセージを返す
            LoanApplicationError::LedgerError(e) => {
                tracing::error!("Loan ledger error: {}", e);
                (
                    "INTERNAL_ERROR",
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse::new(code, message));
        (status, body).into_response()
    }
}
