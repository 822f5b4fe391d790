mod errors;
mod loan_service;

pub use errors::{LoanApplicationError, Result};
pub use loan_service::{
    ServiceDependencies, borrow_book, delete_loan, get_loan, list_loans, return_book,
};
