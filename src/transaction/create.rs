//! The single-transaction creation service and its HTTP endpoint.

use axum::{Json, extract::State, http::StatusCode};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    category::{CategoryTitle, find_or_create_category},
    transaction::{Transaction, TransactionKind, create_transaction, get_balance},
};

/// The fields a client submits to create one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// A text description of what the transaction is for.
    pub title: String,
    /// The kind tag as entered by the client. Validated by the service, not
    /// the deserializer, so an unknown tag surfaces as
    /// [Error::InvalidOperation] rather than a generic decode failure.
    pub kind: String,
    /// The magnitude of money moved.
    pub amount: f64,
    /// The title of the category to file the transaction under.
    pub category: String,
}

/// Validate and create one transaction.
///
/// Validation order, first violation wins:
/// 1. `kind` must be exactly `income` or `outcome`.
/// 2. An outcome must not exceed the current balance.
/// 3. The category title must be non-empty; the category is created if no
///    category has the title yet.
///
/// The balance read, category upsert and transaction insert run inside one
/// SQL transaction, so concurrent outcome creations cannot both pass the
/// balance check against a stale total.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidOperation] if `kind` is not an accepted tag,
/// - [Error::InsufficientBalance] if an outcome exceeds the balance,
/// - [Error::EmptyCategoryTitle] if the category title is empty,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction_service(
    request: TransactionRequest,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let kind: TransactionKind = request.kind.parse()?;

    let sql_transaction = connection.unchecked_transaction()?;

    if kind == TransactionKind::Outcome {
        let balance = get_balance(&sql_transaction)?;

        if balance.total < request.amount {
            return Err(Error::InsufficientBalance);
        }
    }

    let category_title = CategoryTitle::new(&request.category)?;
    let category = find_or_create_category(&category_title, &sql_transaction)?;

    let transaction = create_transaction(
        Transaction::build(&request.title, kind, request.amount).category_id(Some(category.id)),
        &sql_transaction,
    )?;

    sql_transaction.commit()?;

    Ok(transaction)
}

/// A route handler for creating a new transaction from a JSON request body.
pub async fn create_transaction_endpoint(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = create_transaction_service(request, &connection)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}
