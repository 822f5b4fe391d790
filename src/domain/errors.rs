use thiserror::Error;

/// 貸出台帳のビジネスルール違反
///
/// いずれも利用者が対処可能な結果であり、自動リトライの対象ではない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoanError {
    /// 書籍が存在しない
    #[error("Book not found")]
    BookNotFound,

    /// 会員が存在しない
    #[error("Member not found")]
    MemberNotFound,

    /// 書籍が貸出中
    #[error("Book is not available")]
    BookUnavailable,

    /// 貸出が存在しない
    #[error("Loan not found")]
    LoanNotFound,

    /// 既に返却済み
    #[error("Loan already returned")]
    AlreadyReturned,
}

impl LoanError {
    /// エラー種別の識別子（APIレスポンスの`code`）
    pub fn code(&self) -> &'static str {
        match self {
            LoanError::BookNotFound => "BOOK_NOT_FOUND",
            LoanError::MemberNotFound => "MEMBER_NOT_FOUND",
            LoanError::BookUnavailable => "BOOK_UNAVAILABLE",
            LoanError::LoanNotFound => "LOAN_NOT_FOUND",
            LoanError::AlreadyReturned => "ALREADY_RETURNED",
        }
    }
}
