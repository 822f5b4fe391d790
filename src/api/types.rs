use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::loan::LoanApplicationError;
use crate::domain::{
    BookId, Loan, LoanStatus, MemberId,
    commands::BorrowBook,
};
use crate::ports::LoanFilter;

/// 貸出作成リクエスト（POST /loans）
///
/// 必須項目の欠落を400で返すため、各項目は`Option`で受け取る。
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowBookRequest {
    pub book_id: Option<String>,
    pub member_id: Option<String>,
}

impl BorrowBookRequest {
    /// コマンドへ変換する
    ///
    /// UUIDとして解釈できないIDは存在し得ない。書籍IDは即座に`BookNotFound`とし、
    /// 会員IDは nil UUID に置き換えて台帳に渡す（v4 では生成されない）。
    /// これにより書籍の存在・可用性の判定が会員の判定より先に行われる。
    pub fn to_command(
        &self,
        borrowed_at: DateTime<Utc>,
    ) -> Result<BorrowBook, LoanApplicationError> {
        let (Some(book_id), Some(member_id)) = (&self.book_id, &self.member_id) else {
            return Err(LoanApplicationError::InvalidRequest(
                "bookId and memberId required".to_string(),
            ));
        };

        let book_id = BookId::parse(book_id).ok_or(LoanApplicationError::BookNotFound)?;
        let member_id =
            MemberId::parse(member_id).unwrap_or_else(|| MemberId::from_uuid(Uuid::nil()));

        Ok(BorrowBook {
            book_id,
            member_id,
            borrowed_at,
        })
    }
}

/// 貸出一覧取得のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLoansQuery {
    pub book_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    /// open または closed
    pub status: Option<String>,
}

impl ListLoansQuery {
    pub fn to_filter(&self) -> Result<LoanFilter, LoanApplicationError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<LoanStatus>)
            .transpose()
            .map_err(LoanApplicationError::InvalidRequest)?;

        Ok(LoanFilter {
            book_id: self.book_id.map(BookId::from_uuid),
            member_id: self.member_id.map(MemberId::from_uuid),
            status,
        })
    }
}

/// 貸出レスポンス
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            id: loan.loan_id.value(),
            book_id: loan.book_id.value(),
            member_id: loan.member_id.value(),
            borrowed_at: loan.borrowed_at,
            returned_at: loan.returned_at,
            status: loan.status(),
        }
    }
}

/// 貸出一覧レスポンス（GET /loans）
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanListResponse {
    pub items: Vec<LoanResponse>,
}

/// 削除レスポンス（DELETE /loans/:id）
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub id: Uuid,
}

/// ルートのリンク一覧（GET /）
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub message: String,
    pub links: IndexLinks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexLinks {
    pub loans: String,
    pub health: String,
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrow_request_requires_both_ids() {
        let req = BorrowBookRequest {
            book_id: Some(Uuid::new_v4().to_string()),
            member_id: None,
        };
        let result = req.to_command(Utc::now());
        assert!(matches!(
            result,
            Err(LoanApplicationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_borrow_request_unknown_book_format_is_not_found() {
        let req = BorrowBookRequest {
            book_id: Some("no-such-book".to_string()),
            member_id: Some("no-such-member".to_string()),
        };
        assert!(matches!(
            req.to_command(Utc::now()),
            Err(LoanApplicationError::BookNotFound)
        ));
    }

    #[test]
    fn test_borrow_request_unknown_member_format_defers_to_ledger() {
        let book_uuid = Uuid::new_v4();
        let req = BorrowBookRequest {
            book_id: Some(book_uuid.to_string()),
            member_id: Some("no-such-member".to_string()),
        };

        let cmd = req.to_command(Utc::now()).unwrap();
        assert_eq!(cmd.book_id, BookId::from_uuid(book_uuid));
        assert_eq!(cmd.member_id, MemberId::from_uuid(Uuid::nil()));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let query = ListLoansQuery {
            status: Some("lost".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            query.to_filter(),
            Err(LoanApplicationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_loan_response_shape_is_camel_case() {
        let loan = crate::domain::loan::open_loan(BookId::new(), MemberId::new(), Utc::now());
        let json = serde_json::to_value(LoanResponse::from(loan)).unwrap();

        assert!(json.get("bookId").is_some());
        assert!(json.get("memberId").is_some());
        assert!(json.get("borrowedAt").is_some());
        assert!(json["returnedAt"].is_null());
        assert_eq!(json["status"], "open");
    }
}
