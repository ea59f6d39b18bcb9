//! Bulk import of transactions from CSV files.
//!
//! This module contains:
//! - The row parser that extracts pending transactions from CSV text
//! - The import service that reconciles categories and persists rows in
//!   batches
//! - The multipart upload endpoint

mod csv;
mod import_transactions;

pub use csv::{PendingTransaction, parse_import_rows};
pub use import_transactions::{import_from_file, import_transactions_endpoint};
