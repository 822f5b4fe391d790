pub mod loan_ledger;

// パブリックに型を再エクスポート
pub use loan_ledger::LoanLedger as PostgresLoanLedger;
