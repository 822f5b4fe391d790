use crate::domain::{
    BookId, Loan, LoanError, LoanId, MemberId,
    commands::{BorrowBook, DeleteLoan, ReturnBook},
    loan::{close_loan, ensure_book_borrowable, ensure_member_exists, open_loan},
};
use crate::ports::loan_ledger::{
    LedgerError, LoanFilter, LoanLedger as LoanLedgerTrait, Result,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

const LOAN_COLUMNS: &str = "id, book_id, member_id, borrowed_at, returned_at";

/// Map a `loans` row to the Loan aggregate
fn map_row_to_loan(row: &PgRow) -> Loan {
    Loan {
        loan_id: LoanId::from_uuid(row.get("id")),
        book_id: BookId::from_uuid(row.get("book_id")),
        member_id: MemberId::from_uuid(row.get("member_id")),
        borrowed_at: row.get("borrowed_at"),
        returned_at: row.get("returned_at"),
    }
}

/// PostgreSQL implementation of LoanLedger
///
/// Every state-changing operation runs in a single transaction and takes
/// row locks with `SELECT ... FOR UPDATE`. The pooled connection is held for
/// the whole transaction and goes back to the pool when the transaction is
/// committed, rolled back, or dropped.
pub struct LoanLedger {
    pool: PgPool,
}

impl LoanLedger {
    /// Create a new LoanLedger with a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Commit on success, roll back on any failure
    ///
    /// A failed rollback is only logged; the connection is discarded by sqlx
    /// and the server aborts the transaction on its own.
    async fn finish<T>(tx: Transaction<'_, Postgres>, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(LedgerError::store)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn borrow_in_tx(tx: &mut Transaction<'_, Postgres>, cmd: &BorrowBook) -> Result<Loan> {
        // 1. Lock the book row first; concurrent borrows of the same book queue here
        let available: Option<bool> =
            sqlx::query_scalar("SELECT available FROM books WHERE id = $1 FOR UPDATE")
                .bind(cmd.book_id.value())
                .fetch_optional(&mut **tx)
                .await
                .map_err(LedgerError::store)?;

        ensure_book_borrowable(available)?;

        // 2. Then the member row (book -> member lock order)
        let member: Option<PgRow> = sqlx::query("SELECT id FROM members WHERE id = $1 FOR UPDATE")
            .bind(cmd.member_id.value())
            .fetch_optional(&mut **tx)
            .await
            .map_err(LedgerError::store)?;

        ensure_member_exists(member.is_some())?;

        let loan = open_loan(cmd.book_id, cmd.member_id, cmd.borrowed_at);

        sqlx::query(
            r#"
            INSERT INTO loans (id, book_id, member_id, borrowed_at, returned_at)
            VALUES ($1, $2, $3, $4, NULL)
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.book_id.value())
        .bind(loan.member_id.value())
        .bind(loan.borrowed_at)
        .execute(&mut **tx)
        .await
        .map_err(LedgerError::store)?;

        Self::set_book_available(tx, loan.book_id, false, cmd.borrowed_at).await?;

        Ok(loan)
    }

    async fn return_in_tx(tx: &mut Transaction<'_, Postgres>, cmd: &ReturnBook) -> Result<Loan> {
        let current = Self::lock_loan(tx, cmd.loan_id).await?;
        let loan = close_loan(current, cmd.returned_at)?;

        sqlx::query("UPDATE loans SET returned_at = $2 WHERE id = $1")
            .bind(loan.loan_id.value())
            .bind(loan.returned_at)
            .execute(&mut **tx)
            .await
            .map_err(LedgerError::store)?;

        Self::set_book_available(tx, loan.book_id, true, cmd.returned_at).await?;

        Ok(loan)
    }

    async fn delete_in_tx(tx: &mut Transaction<'_, Postgres>, cmd: &DeleteLoan) -> Result<Loan> {
        let loan = Self::lock_loan(tx, cmd.loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound)?;

        if loan.is_open() {
            Self::set_book_available(tx, loan.book_id, true, cmd.deleted_at).await?;
        }

        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(loan.loan_id.value())
            .execute(&mut **tx)
            .await
            .map_err(LedgerError::store)?;

        Ok(loan)
    }

    async fn lock_loan(
        tx: &mut Transaction<'_, Postgres>,
        loan_id: LoanId,
    ) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id.value())
        .fetch_optional(&mut **tx)
        .await
        .map_err(LedgerError::store)?;

        Ok(row.as_ref().map(map_row_to_loan))
    }

    async fn set_book_available(
        tx: &mut Transaction<'_, Postgres>,
        book_id: BookId,
        available: bool,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE books SET available = $2, updated_at = $3 WHERE id = $1")
            .bind(book_id.value())
            .bind(available)
            .bind(at)
            .execute(&mut **tx)
            .await
            .map_err(LedgerError::store)?;

        Ok(())
    }

    async fn fetch_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(loan_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(LedgerError::store)?;

        Ok(row.as_ref().map(map_row_to_loan))
    }
}

/// The row written by a committed transaction must be readable afterwards.
/// A miss is a store fault, never a business rule.
fn committed(loan_id: LoanId, loan: Option<Loan>) -> Result<Loan> {
    loan.ok_or_else(|| {
        LedgerError::Store(
            format!("committed loan {} missing on re-read", loan_id.value()).into(),
        )
    })
}

#[async_trait]
impl LoanLedgerTrait for LoanLedger {
    /// Borrow a book inside one transaction
    ///
    /// The created loan is re-read after commit so the caller sees exactly
    /// what other transactions see (timestamps at database precision).
    async fn borrow_book(&self, cmd: BorrowBook) -> Result<Loan> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let outcome = Self::borrow_in_tx(&mut tx, &cmd).await;
        let loan = Self::finish(tx, outcome).await?;

        committed(loan.loan_id, self.fetch_loan(loan.loan_id).await?)
    }

    async fn return_book(&self, cmd: ReturnBook) -> Result<Loan> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let outcome = Self::return_in_tx(&mut tx, &cmd).await;
        let loan = Self::finish(tx, outcome).await?;

        committed(loan.loan_id, self.fetch_loan(loan.loan_id).await?)
    }

    async fn delete_loan(&self, cmd: DeleteLoan) -> Result<Loan> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::store)?;
        let outcome = Self::delete_in_tx(&mut tx, &cmd).await;
        Self::finish(tx, outcome).await
    }

    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        self.fetch_loan(loan_id).await
    }

    /// Filters are optional; a NULL parameter disables its predicate
    async fn list(&self, filter: LoanFilter) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM loans
            WHERE ($1::uuid IS NULL OR book_id = $1)
              AND ($2::uuid IS NULL OR member_id = $2)
              AND ($3::text IS NULL
                   OR ($3 = 'open' AND returned_at IS NULL)
                   OR ($3 = 'closed' AND returned_at IS NOT NULL))
            ORDER BY borrowed_at DESC
            "#,
            LOAN_COLUMNS
        ))
        .bind(filter.book_id.map(|id| id.value()))
        .bind(filter.member_id.map(|id| id.value()))
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(LedgerError::store)?;

        Ok(rows.iter().map(map_row_to_loan).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_committed_loan_is_returned() {
        let loan = open_loan(BookId::new(), MemberId::new(), Utc::now());

        let result = committed(loan.loan_id, Some(loan.clone()));

        assert_eq!(result.unwrap(), loan);
    }

    #[test]
    fn test_missing_committed_loan_is_a_store_error() {
        let result = committed(LoanId::new(), None);

        assert!(matches!(result, Err(LedgerError::Store(_))));
    }
}
