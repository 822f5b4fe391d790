use crate::application::loan::{
    LoanApplicationError, ServiceDependencies, borrow_book as execute_borrow_book,
    delete_loan as execute_delete_loan, get_loan as execute_get_loan,
    list_loans as execute_list_loans, return_book as execute_return_book,
};
use crate::domain::{
    commands::{DeleteLoan, ReturnBook},
    value_objects::LoanId,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode, header},
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use std::sync::Arc;

use super::{
    error::ApiError,
    types::{
        BorrowBookRequest, DeletedResponse, IndexLinks, IndexResponse, ListLoansQuery,
        LoanListResponse, LoanResponse,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

/// パスの貸出IDを解釈する
///
/// UUIDでないIDの貸出は存在しないため404とする。
fn parse_loan_id(raw: &str) -> Result<LoanId, ApiError> {
    LoanId::parse(raw).ok_or_else(|| ApiError::from(LoanApplicationError::LoanNotFound))
}

// ============================================================================
// Command handlers (POST / DELETE)
// ============================================================================

/// POST /loans - 書籍を貸し出す
///
/// 成功時は201と`Location`ヘッダーを返す。
/// - 書籍・会員が存在しない: 404
/// - 書籍が貸出中: 409
pub async fn create_loan(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): WithRejection<Json<BorrowBookRequest>, ApiError>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<LoanResponse>), ApiError> {
    let cmd = req.to_command(Utc::now())?;

    let loan = execute_borrow_book(&state.service_deps, cmd).await?;
    let location = format!("/loans/{}", loan.loan_id.value());

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(LoanResponse::from(loan)),
    ))
}

/// POST /loans/:id/return - 書籍を返却する
///
/// - 貸出が存在しない: 404
/// - 既に返却済み: 400
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let cmd = ReturnBook {
        loan_id: parse_loan_id(&loan_id)?,
        returned_at: Utc::now(),
    };

    let loan = execute_return_book(&state.service_deps, cmd).await?;

    Ok(Json(LoanResponse::from(loan)))
}

/// DELETE /loans/:id - 貸出記録を削除する
pub async fn delete_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let cmd = DeleteLoan {
        loan_id: parse_loan_id(&loan_id)?,
        deleted_at: Utc::now(),
    };

    let loan = execute_delete_loan(&state.service_deps, cmd).await?;

    Ok(Json(DeletedResponse {
        success: true,
        id: loan.loan_id.value(),
    }))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /loans/:id - 貸出詳細をIDで取得
pub async fn get_loan_by_id(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = execute_get_loan(&state.service_deps, parse_loan_id(&loan_id)?).await?;

    Ok(Json(LoanResponse::from(loan)))
}

/// GET /loans - 貸出一覧取得
///
/// クエリパラメータ（すべて任意）:
/// - bookId: 書籍IDでフィルタリング
/// - memberId: 会員IDでフィルタリング
/// - status: open / closed
pub async fn list_loans(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<ListLoansQuery>, ApiError>,
) -> Result<Json<LoanListResponse>, ApiError> {
    let filter = query.to_filter()?;

    let loans = execute_list_loans(&state.service_deps, filter).await?;

    Ok(Json(LoanListResponse {
        items: loans.into_iter().map(LoanResponse::from).collect(),
    }))
}

/// GET / - エンドポイント一覧
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: "Library API".to_string(),
        links: IndexLinks {
            loans: "/loans".to_string(),
            health: "/health".to_string(),
        },
    })
}
