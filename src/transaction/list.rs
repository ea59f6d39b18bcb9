//! The transaction listing endpoint.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    transaction::{Balance, Transaction, get_all_transactions, get_balance},
};

/// The response body for the transaction listing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionListResponse {
    /// Every transaction in the store, oldest first.
    pub transactions: Vec<Transaction>,
    /// The income/outcome/total aggregate over all transactions.
    pub balance: Balance,
}

/// A route handler that returns all transactions along with the balance
/// aggregate.
pub async fn get_transactions_endpoint(
    State(state): State<AppState>,
) -> Result<Json<TransactionListResponse>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions = get_all_transactions(&connection)?;
    let balance = get_balance(&connection)?;

    Ok(Json(TransactionListResponse {
        transactions,
        balance,
    }))
}
