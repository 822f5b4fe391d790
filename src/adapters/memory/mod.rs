pub mod loan_ledger;

pub use loan_ledger::LoanLedger as InMemoryLoanLedger;
