use crate::domain::LoanError;
use crate::ports::LedgerError;
use thiserror::Error;

/// 貸出管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LoanApplicationError {
    /// 書籍が存在しない
    #[error("Book not found")]
    BookNotFound,

    /// 会員が存在しない
    #[error("Member not found")]
    MemberNotFound,

    /// 書籍が貸出中
    #[error("Book is not available")]
    BookUnavailable,

    /// 貸出が見つからない
    #[error("Loan not found")]
    LoanNotFound,

    /// 既に返却済み
    #[error("Loan already returned")]
    AlreadyReturned,

    /// リクエストの必須項目が欠けている、または不正
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 台帳（ストア）の障害
    #[error("Loan ledger error")]
    LedgerError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<LoanError> for LoanApplicationError {
    fn from(err: LoanError) -> Self {
        match err {
            LoanError::BookNotFound => LoanApplicationError::BookNotFound,
            LoanError::MemberNotFound => LoanApplicationError::MemberNotFound,
            LoanError::BookUnavailable => LoanApplicationError::BookUnavailable,
            LoanError::LoanNotFound => LoanApplicationError::LoanNotFound,
            LoanError::AlreadyReturned => LoanApplicationError::AlreadyReturned,
        }
    }
}

impl From<LedgerError> for LoanApplicationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rule(rule) => rule.into(),
            LedgerError::Store(source) => LoanApplicationError::LedgerError(source),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LoanApplicationError>;
