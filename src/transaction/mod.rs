//! Transaction management for the application.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model, `TransactionKind` tag and `TransactionBuilder`
//! - Database functions for storing and querying transactions and the
//!   balance aggregate
//! - The single-transaction creation service and the HTTP endpoints

mod core;
mod create;
mod list;

pub use core::{
    Balance, Transaction, TransactionBuilder, TransactionKind, count_transactions,
    create_transaction, create_transaction_table, get_all_transactions, get_balance,
    map_transaction_row,
};
pub use create::{TransactionRequest, create_transaction_endpoint, create_transaction_service};
pub use list::get_transactions_endpoint;
