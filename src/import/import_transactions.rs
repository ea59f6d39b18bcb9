//! The bulk import service and its HTTP endpoint.
//!
//! An import runs through a fixed sequence: parse the whole file, reconcile
//! the referenced category titles in one batch, persist every accepted row in
//! one batch, then delete the source file. Category reconciliation needs the
//! complete title set, so nothing is persisted until the file has been fully
//! parsed.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
};
use rusqlite::Connection;
use time::OffsetDateTime;
use tokio::fs;

use crate::{
    AppState, Error,
    category::reconcile_categories,
    database_id::DatabaseId,
    import::csv::{PendingTransaction, parse_import_rows},
    transaction::{Transaction, map_transaction_row},
};

/// Import transactions from the CSV file at `path`.
///
/// Rows that cannot be turned into a transaction are dropped, they never
/// fail the import. Accepted rows are persisted in row order, each
/// referencing the category row whose title matches the row's category cell;
/// categories are created on demand, exactly one per unique unseen title.
///
/// Unlike [crate::transaction::create_transaction_service], the import
/// performs no balance-sufficiency check: outcome rows are accepted
/// regardless of the running balance.
///
/// The source file is deleted on every exit path, including parse and
/// persistence failures. A deletion failure is logged and does not fail the
/// import.
///
/// # Errors
/// This function will return an [Error::Io] if the file cannot be read, an
/// [Error::DatabaseLockError] if the connection mutex is poisoned, or an
/// [Error::SqlError] if persistence fails.
pub async fn import_from_file(
    path: &Path,
    db_connection: &Mutex<Connection>,
) -> Result<Vec<Transaction>, Error> {
    let result = import_file_inner(path, db_connection).await;

    if let Err(error) = fs::remove_file(path).await {
        tracing::warn!("could not remove import file {}: {error}", path.display());
    }

    result
}

async fn import_file_inner(
    path: &Path,
    db_connection: &Mutex<Connection>,
) -> Result<Vec<Transaction>, Error> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|error| Error::Io(error.to_string()))?;

    let rows = parse_import_rows(&text);

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let connection = db_connection.lock().map_err(|_| Error::DatabaseLockError)?;

    import_pending_rows(&rows, &connection)
}

/// Persist `rows` in one batch, resolving category references first.
///
/// Everything runs inside one SQL transaction: the batch either lands fully
/// or not at all.
fn import_pending_rows(
    rows: &[PendingTransaction],
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let sql_transaction = connection.unchecked_transaction()?;

    let titles: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.category_title.as_deref())
        .collect();
    let categories = reconcile_categories(&titles, &sql_transaction)?;
    let category_ids: HashMap<&str, DatabaseId> = categories
        .iter()
        .map(|category| (category.title.as_ref(), category.id))
        .collect();

    let mut imported = Vec::with_capacity(rows.len());

    {
        // Prepare the insert statement once for reuse across the batch.
        let mut statement = sql_transaction.prepare(
            "INSERT INTO \"transaction\" (title, kind, amount, category_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, title, kind, amount, category_id, created_at, updated_at",
        )?;

        for row in rows {
            let category_id = row
                .category_title
                .as_deref()
                .and_then(|title| category_ids.get(title).copied());
            let now = OffsetDateTime::now_utc();

            let transaction = statement.query_row(
                (&row.title, row.kind, row.amount, category_id, now, now),
                map_transaction_row,
            )?;

            imported.push(transaction);
        }
    }

    sql_transaction.commit()?;

    Ok(imported)
}

/// A route handler for importing transactions from uploaded CSV files.
///
/// Each uploaded file is written to the application's upload directory and
/// run through [import_from_file], which removes it again when done.
pub async fn import_transactions_endpoint(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<Transaction>>), Error> {
    let mut imported = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.to_string()))?
    {
        let csv_data = parse_multipart_field(field).await?;
        let path = upload_file_path(&state.upload_dir);

        fs::write(&path, &csv_data)
            .await
            .map_err(|error| Error::Io(error.to_string()))?;

        let transactions = import_from_file(&path, &state.db_connection).await?;
        imported.extend(transactions);
    }

    Ok((StatusCode::CREATED, Json(imported)))
}

fn upload_file_path(upload_dir: &Path) -> PathBuf {
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos();

    upload_dir.join(format!("import-{stamp}.csv"))
}

async fn parse_multipart_field(field: Field<'_>) -> Result<String, Error> {
    if field.content_type() != Some("text/csv") {
        return Err(Error::NotCsv);
    }

    let file_name = field.file_name().unwrap_or("<unnamed>").to_owned();

    let data = field.text().await.map_err(|error| {
        tracing::error!("Could not read data from multipart form field: {error}");
        Error::MultipartError("Could not read data from multipart form field.".to_owned())
    })?;

    tracing::debug!("Received file '{}' that is {} bytes", file_name, data.len());

    Ok(data)
}

#[cfg(test)]
mod import_from_file_tests {
    use std::{path::PathBuf, sync::Mutex};

    use rusqlite::Connection;
    use tempfile::TempDir;

    use crate::{
        Error,
        category::{CategoryTitle, create_category, find_category_by_title},
        db::initialize,
        transaction::{
            Transaction, TransactionKind, count_transactions, create_transaction, get_balance,
        },
    };

    use super::import_from_file;

    const VALID_CSV: &str = "title, kind, amount, category\n\
        Loan, income, 1500.00, Food\n\
        Website Hosting, outcome, 50.00, Food\n\
        Ice cream, outcome, 3.50, Rent";

    fn get_test_connection() -> Mutex<Connection> {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        Mutex::new(conn)
    }

    fn write_import_file(directory: &TempDir, content: &str) -> PathBuf {
        let path = directory.path().join("transactions.csv");
        std::fs::write(&path, content).expect("Could not write import file");
        path
    }

    #[tokio::test]
    async fn imports_rows_in_order() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, VALID_CSV);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        let want_titles = ["Loan", "Website Hosting", "Ice cream"];
        let got_titles: Vec<&str> = imported
            .iter()
            .map(|transaction| transaction.title.as_str())
            .collect();
        assert_eq!(want_titles.as_slice(), got_titles);
        assert_eq!(imported[0].kind, TransactionKind::Income);
        assert_eq!(imported[0].amount, 1500.0);
    }

    #[tokio::test]
    async fn deduplicates_new_categories() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, VALID_CSV);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        let conn = connection.lock().unwrap();
        let category_count: i64 = conn
            .query_row("SELECT COUNT(id) FROM category;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(category_count, 2, "want only Food and Rent created");

        let food = find_category_by_title("Food", &conn).unwrap().unwrap();
        let rent = find_category_by_title("Rent", &conn).unwrap().unwrap();
        assert_eq!(imported[0].category_id, Some(food.id));
        assert_eq!(imported[1].category_id, Some(food.id));
        assert_eq!(imported[2].category_id, Some(rent.id));
    }

    #[tokio::test]
    async fn reuses_existing_categories() {
        let connection = get_test_connection();
        let existing = {
            let conn = connection.lock().unwrap();
            create_category(CategoryTitle::new_unchecked("Food"), &conn).unwrap()
        };
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, VALID_CSV);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        assert_eq!(imported[0].category_id, Some(existing.id));

        let conn = connection.lock().unwrap();
        let category_count: i64 = conn
            .query_row("SELECT COUNT(id) FROM category;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(category_count, 2);
    }

    #[tokio::test]
    async fn drops_malformed_rows_without_failing() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let csv = "title, kind, amount, category\n\
            Loan, income, , Salary\n\
            Ice cream, outcome, 3.50, Food";
        let path = write_import_file(&directory, csv);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Import should not fail on malformed rows");

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].title, "Ice cream");
    }

    #[tokio::test]
    async fn does_not_check_balance_for_outcome_rows() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let csv = "title, kind, amount, category\n\
            Big purchase, outcome, 9999.00, Misc";
        let path = write_import_file(&directory, csv);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Import must not enforce the balance check");

        assert_eq!(imported.len(), 1);
        let balance = get_balance(&connection.lock().unwrap()).unwrap();
        assert_eq!(balance.total, -9999.0);
    }

    #[tokio::test]
    async fn balance_reflects_imported_outcome() {
        let connection = get_test_connection();
        {
            let conn = connection.lock().unwrap();
            create_transaction(
                Transaction::build("Opening", TransactionKind::Income, 1000.0),
                &conn,
            )
            .unwrap();
        }
        let directory = TempDir::new().unwrap();
        let csv = "title, kind, amount, category\n\
            Rent, outcome, 500.00, Housing";
        let path = write_import_file(&directory, csv);

        import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        let balance = get_balance(&connection.lock().unwrap()).unwrap();
        assert_eq!(balance.total, 500.0);
    }

    #[tokio::test]
    async fn uncategorized_row_is_kept_with_no_reference() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let csv = "title, kind, amount, category\n\
            Loan, income, 100.00,";
        let path = write_import_file(&directory, csv);

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].category_id, None);
    }

    #[tokio::test]
    async fn removes_source_file_on_success() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, VALID_CSV);

        import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        assert!(!path.exists(), "import file should be deleted");
    }

    #[tokio::test]
    async fn removes_source_file_on_persistence_failure() {
        // No tables are created, so persistence fails with an SQL error.
        let connection = Mutex::new(Connection::open_in_memory().unwrap());
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, VALID_CSV);

        let result = import_from_file(&path, &connection).await;

        assert!(matches!(result, Err(Error::SqlError(_))));
        assert!(!path.exists(), "import file should be deleted on failure");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let path = directory.path().join("does-not-exist.csv");

        let result = import_from_file(&path, &connection).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(count_transactions(&connection.lock().unwrap()).unwrap(), 0);
    }

    #[tokio::test]
    async fn header_only_file_imports_nothing() {
        let connection = get_test_connection();
        let directory = TempDir::new().unwrap();
        let path = write_import_file(&directory, "title, kind, amount, category\n");

        let imported = import_from_file(&path, &connection)
            .await
            .expect("Could not import transactions");

        assert!(imported.is_empty());
        assert_eq!(count_transactions(&connection.lock().unwrap()).unwrap(), 0);
    }
}
