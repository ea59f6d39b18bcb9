//! The API endpoint URIs.

/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route to import transactions from CSV files.
pub const IMPORT: &str = "/api/transactions/import";
