use crate::domain::{
    BookId, Loan, LoanError, LoanStatus, MemberId,
    commands::{BorrowBook, DeleteLoan, ReturnBook},
    value_objects::LoanId,
};
use async_trait::async_trait;
use thiserror::Error;

/// 台帳操作のエラー
///
/// ビジネスルール違反（`Rule`）とストア障害（`Store`）を区別する。
/// どちらの場合もトランザクションはロールバック済みで、
/// ストアは「操作が行われなかった」状態に保たれる。
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Rule(#[from] LoanError),

    #[error("Loan store error")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LedgerError::Store(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// 貸出一覧の絞り込み条件
///
/// すべて未指定の場合は全件を返す。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub book_id: Option<BookId>,
    pub member_id: Option<MemberId>,
    pub status: Option<LoanStatus>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.book_id.is_none_or(|id| loan.book_id == id)
            && self.member_id.is_none_or(|id| loan.member_id == id)
            && self.status.is_none_or(|status| loan.status() == status)
    }
}

/// 貸出台帳ポート
///
/// 貸出・返却・削除はそれぞれ1つのトランザクションとして実行され、
/// `books.available`と貸出中の貸出の有無を常に一致させる。
///
/// 行ロックの取得順序は実装間で共通：
/// - 貸出: 書籍 → 会員
/// - 返却・削除: 貸出 → 書籍
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// 書籍を貸し出す
    ///
    /// 書籍行を排他ロックしてから可用性を確認するため、
    /// 同じ書籍への同時貸出は直列化され、後続は`BookUnavailable`で失敗する。
    async fn borrow_book(&self, cmd: BorrowBook) -> Result<Loan>;

    /// 書籍を返却する
    async fn return_book(&self, cmd: ReturnBook) -> Result<Loan>;

    /// 貸出記録を削除する
    ///
    /// 貸出中の記録を削除する場合は同じトランザクション内で書籍を貸出可能に戻す。
    async fn delete_loan(&self, cmd: DeleteLoan) -> Result<Loan>;

    /// IDで貸出を取得する
    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 条件に一致する貸出を貸出日時の降順で取得する
    async fn list(&self, filter: LoanFilter) -> Result<Vec<Loan>>;
}
