//! Row extraction for transaction import files.
//!
//! Import files are comma-separated text with a header row and the columns
//! `title, kind, amount, category` in that order. Columns are matched by
//! position, not by header name.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::transaction::TransactionKind;

/// One accepted import row, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    /// A text description of what the transaction is for.
    pub title: String,
    /// Whether the transaction is income or outcome.
    pub kind: TransactionKind,
    /// The magnitude of money moved.
    pub amount: f64,
    /// The category title from the row, `None` if the cell was empty.
    pub category_title: Option<String>,
}

/// Extract the pending transactions from CSV `text`, in row order.
///
/// The header row is skipped and every cell is trimmed. Rows that cannot be
/// turned into a transaction — a missing or empty title, kind or amount, an
/// unknown kind tag, or a non-numeric amount — are dropped with a debug log
/// and never fail the parse.
pub fn parse_import_rows(text: &str) -> Vec<PendingTransaction> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        // Line 1 is the header.
        let line = index + 2;

        let record = match record {
            Ok(record) => record,
            Err(error) => {
                tracing::debug!("dropping unreadable row on line {line}: {error}");
                continue;
            }
        };

        match parse_record(&record) {
            Some(row) => rows.push(row),
            None => tracing::debug!("dropping malformed row on line {line}: {record:?}"),
        }
    }

    rows
}

fn parse_record(record: &StringRecord) -> Option<PendingTransaction> {
    let title = record.get(0).unwrap_or_default();
    let kind = record.get(1).unwrap_or_default();
    let amount = record.get(2).unwrap_or_default();
    let category = record.get(3).unwrap_or_default();

    if title.is_empty() || kind.is_empty() || amount.is_empty() {
        return None;
    }

    let kind = kind.parse::<TransactionKind>().ok()?;
    let amount = amount.parse::<f64>().ok()?;

    Some(PendingTransaction {
        title: title.to_owned(),
        kind,
        amount,
        category_title: (!category.is_empty()).then(|| category.to_owned()),
    })
}

#[cfg(test)]
mod parse_import_rows_tests {
    use crate::transaction::TransactionKind;

    use super::{PendingTransaction, parse_import_rows};

    const VALID_CSV: &str = "title, kind, amount, category\n\
        Loan, income, 1500.00, Salary\n\
        Website Hosting, outcome, 50.00, Others\n\
        Ice cream, outcome, 3.50, Food";

    #[test]
    fn parses_rows_in_order() {
        let want = vec![
            PendingTransaction {
                title: "Loan".to_owned(),
                kind: TransactionKind::Income,
                amount: 1500.0,
                category_title: Some("Salary".to_owned()),
            },
            PendingTransaction {
                title: "Website Hosting".to_owned(),
                kind: TransactionKind::Outcome,
                amount: 50.0,
                category_title: Some("Others".to_owned()),
            },
            PendingTransaction {
                title: "Ice cream".to_owned(),
                kind: TransactionKind::Outcome,
                amount: 3.5,
                category_title: Some("Food".to_owned()),
            },
        ];

        let got = parse_import_rows(VALID_CSV);

        assert_eq!(want, got);
    }

    #[test]
    fn skips_header_row() {
        let rows = parse_import_rows("title, kind, amount, category\n");

        assert!(rows.is_empty());
    }

    #[test]
    fn drops_row_with_empty_amount() {
        let csv = "title, kind, amount, category\n\
            Loan, income, , Salary\n\
            Ice cream, outcome, 3.50, Food";

        let rows = parse_import_rows(csv);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Ice cream");
    }

    #[test]
    fn drops_row_with_missing_title() {
        let csv = "title, kind, amount, category\n\
            , income, 100.00, Salary";

        assert!(parse_import_rows(csv).is_empty());
    }

    #[test]
    fn drops_row_with_unknown_kind() {
        let csv = "title, kind, amount, category\n\
            Swap, transfer, 100.00, Misc\n\
            Loan, income, 100.00, Salary";

        let rows = parse_import_rows(csv);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, TransactionKind::Income);
    }

    #[test]
    fn drops_row_with_non_numeric_amount() {
        let csv = "title, kind, amount, category\n\
            Loan, income, lots, Salary";

        assert!(parse_import_rows(csv).is_empty());
    }

    #[test]
    fn kind_matching_is_case_sensitive() {
        let csv = "title, kind, amount, category\n\
            Loan, Income, 100.00, Salary";

        assert!(parse_import_rows(csv).is_empty());
    }

    #[test]
    fn empty_category_cell_leaves_row_uncategorized() {
        let csv = "title, kind, amount, category\n\
            Loan, income, 100.00,";

        let rows = parse_import_rows(csv);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_title, None);
    }

    #[test]
    fn row_with_missing_trailing_cells_is_accepted() {
        let csv = "title, kind, amount, category\n\
            Loan, income, 100.00";

        let rows = parse_import_rows(csv);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category_title, None);
    }

    #[test]
    fn cells_are_trimmed() {
        let csv = "title, kind, amount, category\n\
            \tLoan ,  income ,  100.00 ,  Salary ";

        let rows = parse_import_rows(csv);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Loan");
        assert_eq!(rows[0].amount, 100.0);
        assert_eq!(rows[0].category_title, Some("Salary".to_owned()));
    }

    #[test]
    fn empty_input_yields_no_rows() {
        assert!(parse_import_rows("").is_empty());
    }
}
