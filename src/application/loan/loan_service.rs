use crate::domain::{Loan, commands::*, value_objects::*};
use crate::ports::*;
use std::sync::Arc;

use super::errors::{LoanApplicationError, Result};

/// サービスの依存関係
///
/// 振る舞いは持たず、各ユースケース関数に引数として渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub loan_ledger: Arc<dyn LoanLedger>,
}

/// 台帳エラーをアプリケーションエラーに変換し、結果をログに残す
///
/// ビジネスルール違反は想定内の結果なので`warn`、ストア障害は`error`。
fn log_failure(operation: &str, err: LedgerError) -> LoanApplicationError {
    match &err {
        LedgerError::Rule(rule) => {
            tracing::warn!(operation, code = rule.code(), "Loan operation rejected");
        }
        LedgerError::Store(source) => {
            tracing::error!(operation, error = %source, "Loan ledger failure");
        }
    }
    err.into()
}

/// 書籍を貸し出す
///
/// ビジネスルール（台帳のトランザクション内で検証）：
/// - 書籍が存在すること
/// - 書籍が貸出可能であること
/// - 会員が存在すること
///
/// 失敗時は貸出記録も可用性フラグも変更されない。
/// ストア障害の場合も全体がロールバック済みのため、呼び出し側は安全に再試行できる。
pub async fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<Loan> {
    let loan = deps
        .loan_ledger
        .borrow_book(cmd)
        .await
        .map_err(|e| log_failure("borrow_book", e))?;

    tracing::info!(
        loan_id = %loan.loan_id.value(),
        book_id = %loan.book_id.value(),
        member_id = %loan.member_id.value(),
        "Book borrowed"
    );

    Ok(loan)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 貸出が存在すること
/// - 貸出が返却済みでないこと
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<Loan> {
    let loan = deps
        .loan_ledger
        .return_book(cmd)
        .await
        .map_err(|e| log_failure("return_book", e))?;

    tracing::info!(
        loan_id = %loan.loan_id.value(),
        book_id = %loan.book_id.value(),
        "Book returned"
    );

    Ok(loan)
}

/// 貸出記録を削除する（管理操作）
pub async fn delete_loan(deps: &ServiceDependencies, cmd: DeleteLoan) -> Result<Loan> {
    let loan = deps
        .loan_ledger
        .delete_loan(cmd)
        .await
        .map_err(|e| log_failure("delete_loan", e))?;

    tracing::info!(
        loan_id = %loan.loan_id.value(),
        was_open = loan.is_open(),
        "Loan deleted"
    );

    Ok(loan)
}

/// IDで貸出を取得する
pub async fn get_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    deps.loan_ledger
        .get_by_id(loan_id)
        .await
        .map_err(|e| log_failure("get_loan", e))?
        .ok_or(LoanApplicationError::LoanNotFound)
}

/// 貸出一覧を取得する
pub async fn list_loans(deps: &ServiceDependencies, filter: LoanFilter) -> Result<Vec<Loan>> {
    deps.loan_ledger
        .list(filter)
        .await
        .map_err(|e| log_failure("list_loans", e))
}
