use crate::domain::{
    Author, AuthorId, Book, BookId, Loan, LoanError, LoanId, Member, MemberId,
    commands::{BorrowBook, DeleteLoan, ReturnBook},
    loan::{close_loan, ensure_book_borrowable, ensure_member_exists, open_loan},
};
use crate::ports::loan_ledger::{LoanFilter, LoanLedger as LoanLedgerTrait, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

/// One async mutex per row id, created on first use
///
/// Holding the guard is the in-process equivalent of `SELECT ... FOR UPDATE`.
/// An entry lives only while some task holds or waits on it, so lookups of
/// ids that do not exist leave the map as they found it.
struct RowLocks<K> {
    locks: Mutex<HashMap<K, Arc<RowMutex<()>>>>,
}

impl<K: Eq + Hash + Copy> RowLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, Arc<RowMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock(&self, key: K) -> RowGuard<'_, K> {
        let row = Arc::clone(self.entries().entry(key).or_default());

        // Built before waiting so a cancelled waiter still cleans up
        let mut row_guard = RowGuard {
            owner: self,
            key,
            row,
            guard: None,
        };
        row_guard.guard = Some(Arc::clone(&row_guard.row).lock_owned().await);
        row_guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Releases the row and drops its map entry when it was the last user
struct RowGuard<'a, K: Eq + Hash + Copy> {
    owner: &'a RowLocks<K>,
    key: K,
    row: Arc<RowMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Copy> Drop for RowGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Clones are only taken under the map lock: the map and `self.row`
        // are the last two references when nobody else is waiting.
        let mut entries = self.owner.entries();
        if Arc::strong_count(&self.row) == 2 {
            entries.remove(&self.key);
        }
    }
}

#[derive(Default)]
struct Tables {
    authors: HashMap<AuthorId, Author>,
    books: HashMap<BookId, Book>,
    members: HashMap<MemberId, Member>,
    loans: HashMap<LoanId, Loan>,
}

/// In-process implementation of LoanLedger
///
/// Table data sits behind a short-lived `std::sync::Mutex` that is never held
/// across an `.await`. Conflicting operations are serialized by per-row async
/// locks taken in a fixed order (borrow: book -> member, return/delete:
/// loan -> book), so operations on different books run in parallel.
/// All writes of one operation are applied under a single table guard.
pub struct LoanLedger {
    tables: Mutex<Tables>,
    book_locks: RowLocks<BookId>,
    member_locks: RowLocks<MemberId>,
    loan_locks: RowLocks<LoanId>,
}

impl LoanLedger {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            book_locks: RowLocks::new(),
            member_locks: RowLocks::new(),
            loan_locks: RowLocks::new(),
        }
    }

    /// Ledger pre-populated with two authors, two books and one member
    pub fn seeded() -> Self {
        let ledger = Self::new();

        let austen = ledger.add_author("Jane Austen");
        let orwell = ledger.add_author("George Orwell");
        ledger.add_book("Pride and Prejudice", austen);
        ledger.add_book("1984", orwell);
        ledger.add_member("Alice");

        ledger
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an author
    pub fn add_author(&self, name: &str) -> AuthorId {
        let now = Utc::now();
        let author = Author {
            author_id: AuthorId::new(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let author_id = author.author_id;
        self.tables().authors.insert(author_id, author);
        author_id
    }

    /// Register a new, available book
    pub fn add_book(&self, title: &str, author_id: AuthorId) -> BookId {
        let now = Utc::now();
        let book = Book {
            book_id: BookId::new(),
            title: title.to_string(),
            author_id,
            available: true,
            created_at: now,
            updated_at: now,
        };
        let book_id = book.book_id;
        self.tables().books.insert(book_id, book);
        book_id
    }

    /// Register a member
    pub fn add_member(&self, name: &str) -> MemberId {
        let now = Utc::now();
        let member = Member {
            member_id: MemberId::new(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let member_id = member.member_id;
        self.tables().members.insert(member_id, member);
        member_id
    }

    pub fn authors(&self) -> Vec<Author> {
        self.tables().authors.values().cloned().collect()
    }

    pub fn books(&self) -> Vec<Book> {
        self.tables().books.values().cloned().collect()
    }

    pub fn members(&self) -> Vec<Member> {
        self.tables().members.values().cloned().collect()
    }

    pub fn book(&self, book_id: BookId) -> Option<Book> {
        self.tables().books.get(&book_id).cloned()
    }

    fn set_book_available(
        tables: &mut Tables,
        book_id: BookId,
        available: bool,
        at: chrono::DateTime<Utc>,
    ) {
        if let Some(book) = tables.books.get_mut(&book_id) {
            book.available = available;
            book.updated_at = at;
        }
    }
}

impl Default for LoanLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoanLedgerTrait for LoanLedger {
    async fn borrow_book(&self, cmd: BorrowBook) -> Result<Loan> {
        let _book_lock = self.book_locks.lock(cmd.book_id).await;

        let available = self.tables().books.get(&cmd.book_id).map(|b| b.available);
        ensure_book_borrowable(available)?;

        let _member_lock = self.member_locks.lock(cmd.member_id).await;

        let mut tables = self.tables();
        ensure_member_exists(tables.members.contains_key(&cmd.member_id))?;

        let loan = open_loan(cmd.book_id, cmd.member_id, cmd.borrowed_at);
        tables.loans.insert(loan.loan_id, loan.clone());
        Self::set_book_available(&mut tables, loan.book_id, false, cmd.borrowed_at);

        Ok(loan)
    }

    async fn return_book(&self, cmd: ReturnBook) -> Result<Loan> {
        let _loan_lock = self.loan_locks.lock(cmd.loan_id).await;

        let current = self.tables().loans.get(&cmd.loan_id).cloned();
        let loan = close_loan(current, cmd.returned_at)?;

        let _book_lock = self.book_locks.lock(loan.book_id).await;

        let mut tables = self.tables();
        tables.loans.insert(loan.loan_id, loan.clone());
        Self::set_book_available(&mut tables, loan.book_id, true, cmd.returned_at);

        Ok(loan)
    }

    async fn delete_loan(&self, cmd: DeleteLoan) -> Result<Loan> {
        let _loan_lock = self.loan_locks.lock(cmd.loan_id).await;

        let loan = self
            .tables()
            .loans
            .get(&cmd.loan_id)
            .cloned()
            .ok_or(LoanError::LoanNotFound)?;

        let _book_lock = self.book_locks.lock(loan.book_id).await;

        let mut tables = self.tables();
        tables.loans.remove(&loan.loan_id);
        if loan.is_open() {
            Self::set_book_available(&mut tables, loan.book_id, true, cmd.deleted_at);
        }

        Ok(loan)
    }

    async fn get_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.tables().loans.get(&loan_id).cloned())
    }

    async fn list(&self, filter: LoanFilter) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .tables()
            .loans
            .values()
            .filter(|loan| filter.matches(loan))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
        Ok(loans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoanStatus;
    use crate::ports::loan_ledger::LedgerError;
    use futures::FutureExt;

    fn borrow_cmd(book_id: BookId, member_id: MemberId) -> BorrowBook {
        BorrowBook {
            book_id,
            member_id,
            borrowed_at: Utc::now(),
        }
    }

    #[test]
    fn test_seeded_ledger_contents() {
        let ledger = LoanLedger::seeded();
        assert_eq!(ledger.authors().len(), 2);
        assert_eq!(ledger.books().len(), 2);
        assert_eq!(ledger.members().len(), 1);
        assert!(ledger.books().iter().all(|b| b.available));
    }

    #[tokio::test]
    async fn test_borrow_flips_availability() {
        let ledger = LoanLedger::new();
        let author_id = ledger.add_author("Author");
        let book_id = ledger.add_book("Title", author_id);
        let member_id = ledger.add_member("Member");

        let loan = ledger
            .borrow_book(borrow_cmd(book_id, member_id))
            .await
            .unwrap();

        assert!(loan.is_open());
        assert!(!ledger.book(book_id).unwrap().available);
        assert_eq!(
            ledger.get_by_id(loan.loan_id).await.unwrap(),
            Some(loan.clone())
        );
    }

    #[tokio::test]
    async fn test_member_not_found_leaves_book_available() {
        let ledger = LoanLedger::new();
        let author_id = ledger.add_author("Author");
        let book_id = ledger.add_book("Title", author_id);

        let result = ledger.borrow_book(borrow_cmd(book_id, MemberId::new())).await;

        assert!(matches!(
            result,
            Err(LedgerError::Rule(LoanError::MemberNotFound))
        ));
        assert!(ledger.book(book_id).unwrap().available);
        assert!(ledger.list(LoanFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_open_loan_releases_book() {
        let ledger = LoanLedger::new();
        let author_id = ledger.add_author("Author");
        let book_id = ledger.add_book("Title", author_id);
        let member_id = ledger.add_member("Member");
        let loan = ledger
            .borrow_book(borrow_cmd(book_id, member_id))
            .await
            .unwrap();

        let deleted = ledger
            .delete_loan(DeleteLoan {
                loan_id: loan.loan_id,
                deleted_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(deleted.loan_id, loan.loan_id);
        assert!(ledger.book(book_id).unwrap().available);
        assert!(ledger.get_by_id(loan.loan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_locks_are_released_for_unknown_ids() {
        let ledger = LoanLedger::new();
        let author_id = ledger.add_author("Author");
        let book_id = ledger.add_book("Title", author_id);
        let member_id = ledger.add_member("Member");

        for _ in 0..100 {
            let borrowed = ledger
                .borrow_book(borrow_cmd(BookId::new(), member_id))
                .await;
            assert!(matches!(
                borrowed,
                Err(LedgerError::Rule(LoanError::BookNotFound))
            ));

            let returned = ledger
                .return_book(ReturnBook {
                    loan_id: LoanId::new(),
                    returned_at: Utc::now(),
                })
                .await;
            assert!(matches!(
                returned,
                Err(LedgerError::Rule(LoanError::LoanNotFound))
            ));
        }

        let loan = ledger
            .borrow_book(borrow_cmd(book_id, member_id))
            .await
            .unwrap();
        ledger
            .return_book(ReturnBook {
                loan_id: loan.loan_id,
                returned_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(ledger.book_locks.len(), 0);
        assert_eq!(ledger.member_locks.len(), 0);
        assert_eq!(ledger.loan_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_row_lock_entry_survives_while_contended() {
        let locks: RowLocks<BookId> = RowLocks::new();
        let book_id = BookId::new();

        let first = locks.lock(book_id).await;
        let waiter = locks.lock(book_id);
        tokio::pin!(waiter);

        // 待機中の取得は保持者が解放するまで完了しない
        assert!(waiter.as_mut().now_or_never().is_none());
        drop(first);
        assert_eq!(locks.len(), 1);

        let second = waiter.await;
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_list_orders_by_borrowed_at_desc() {
        let ledger = LoanLedger::new();
        let author_id = ledger.add_author("Author");
        let first_book = ledger.add_book("First", author_id);
        let second_book = ledger.add_book("Second", author_id);
        let member_id = ledger.add_member("Member");
        let earlier = Utc::now() - chrono::Duration::hours(1);

        let older = ledger
            .borrow_book(BorrowBook {
                book_id: first_book,
                member_id,
                borrowed_at: earlier,
            })
            .await
            .unwrap();
        let newer = ledger
            .borrow_book(borrow_cmd(second_book, member_id))
            .await
            .unwrap();

        let loans = ledger.list(LoanFilter::default()).await.unwrap();
        assert_eq!(loans, vec![newer, older.clone()]);

        let open_for_first = ledger
            .list(LoanFilter {
                book_id: Some(first_book),
                status: Some(LoanStatus::Open),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open_for_first, vec![older]);
    }
}
