use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, LoanError, LoanId, MemberId};

/// 貸出の状態
///
/// `Open`（貸出中）から`Closed`（返却済み）への遷移のみ存在する。
/// `Closed`は終端状態で、再び貸出中に戻ることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Open,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Open => "open",
            LoanStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(LoanStatus::Open),
            "closed" => Ok(LoanStatus::Closed),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan集約 - 1冊の書籍の1回の貸出
///
/// `returned_at`が未設定の間は貸出中（open）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn status(&self) -> LoanStatus {
        if self.is_open() {
            LoanStatus::Open
        } else {
            LoanStatus::Closed
        }
    }
}

/// 純粋関数：ロック済みの書籍行が貸出可能か判定する
///
/// `available`はロック取得後に読んだ書籍行の値。行が存在しなければ`None`。
pub fn ensure_book_borrowable(available: Option<bool>) -> Result<(), LoanError> {
    match available {
        None => Err(LoanError::BookNotFound),
        Some(false) => Err(LoanError::BookUnavailable),
        Some(true) => Ok(()),
    }
}

/// 純粋関数：会員行の存在を確認する
pub fn ensure_member_exists(exists: bool) -> Result<(), LoanError> {
    if exists {
        Ok(())
    } else {
        Err(LoanError::MemberNotFound)
    }
}

/// 純粋関数：新しい貸出を開始する
///
/// 書籍と会員のチェックを通過した後にのみ呼ぶこと。
pub fn open_loan(book_id: BookId, member_id: MemberId, borrowed_at: DateTime<Utc>) -> Loan {
    Loan {
        loan_id: LoanId::new(),
        book_id,
        member_id,
        borrowed_at,
        returned_at: None,
    }
}

/// 純粋関数：貸出を返却済みにする
///
/// ビジネスルール：
/// - 存在しない貸出は返却できない
/// - 返却は1回のみ（返却済みは再返却不可）
pub fn close_loan(loan: Option<Loan>, returned_at: DateTime<Utc>) -> Result<Loan, LoanError> {
    let loan = loan.ok_or(LoanError::LoanNotFound)?;

    if !loan.is_open() {
        return Err(LoanError::AlreadyReturned);
    }

    Ok(Loan {
        returned_at: Some(returned_at),
        ..loan
    })
}
