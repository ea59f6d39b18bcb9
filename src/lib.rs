//! Cashbook is a small REST service for tracking income and outcome
//! transactions grouped by category.
//!
//! The service keeps a running balance (total income minus total outcome),
//! refuses outcome transactions that would overdraw it, and supports bulk
//! import of transactions from CSV files.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::Serialize;
use tokio::signal;

mod app_state;
mod category;
mod database_id;
mod db;
mod endpoints;
mod import;
mod routing;
mod transaction;

pub use app_state::AppState;
pub use db::initialize as initialize_db;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down
/// gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A transaction was requested with a kind outside `income`/`outcome`.
    ///
    /// Carries the rejected kind string for error reporting.
    #[error("invalid operation {0:?}, expected \"income\" or \"outcome\"")]
    InvalidOperation(String),

    /// An outcome transaction was requested with an amount larger than the
    /// current balance.
    #[error("insufficient balance to cover the requested outcome")]
    InsufficientBalance,

    /// An empty string was used to create a category title.
    #[error("category title cannot be empty")]
    EmptyCategoryTitle,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The uploaded file is not a CSV.
    #[error("file is not a CSV")]
    NotCsv,

    /// The multipart form could not be parsed as a CSV file upload.
    #[error("could not parse multipart form: {0}")]
    MultipartError(String),

    /// A file could not be read or written during an import.
    #[error("import file error: {0}")]
    Io(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

/// The JSON body returned for failed requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Always the string `"error"`.
    status: &'static str,
    /// A human-readable description of the failure.
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status_code, message) = match &self {
            Error::InvalidOperation(_)
            | Error::InsufficientBalance
            | Error::NotCsv
            | Error::MultipartError(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::EmptyCategoryTitle => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            Error::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal error occurred".to_owned(),
                )
            }
        };

        (
            status_code,
            Json(ErrorBody {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}
