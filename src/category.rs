//! This file defines the `Category` type, its database queries and the
//! category-resolution logic shared by transaction creation and CSV import.
//! A category groups transactions and is unique by title.

use std::collections::HashSet;
use std::fmt::Display;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, database_id::DatabaseId};

/// The title of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryTitle(String);

impl CategoryTitle {
    /// Create a category title.
    ///
    /// # Errors
    ///
    /// This function will return an error if `title` is an empty string.
    pub fn new(title: &str) -> Result<Self, Error> {
        if title.is_empty() {
            Err(Error::EmptyCategoryTitle)
        } else {
            Ok(Self(title.to_string()))
        }
    }

    /// Create a category title without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(title: &str) -> Self {
        Self(title.to_string())
    }
}

impl AsRef<str> for CategoryTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A grouping for income and outcome transactions, e.g., 'Groceries',
/// 'Rent', 'Wages'.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Category {
    /// The id of the category.
    pub id: DatabaseId,

    /// The title of the category.
    pub title: CategoryTitle,

    /// When the category row was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the category row was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Create a category in the database.
///
/// The insert tolerates a concurrent insert of the same title: on a title
/// conflict the existing row is fetched and returned, so two racing callers
/// converge on one category row.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn create_category(title: CategoryTitle, connection: &Connection) -> Result<Category, Error> {
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO category (title, created_at, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(title) DO NOTHING;",
        (title.as_ref(), now, now),
    )?;

    find_category_by_title(title.as_ref(), connection)?.ok_or(Error::NotFound)
}

/// Retrieve the category with `title`, or `None` if no category has it.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn find_category_by_title(
    title: &str,
    connection: &Connection,
) -> Result<Option<Category>, Error> {
    connection
        .prepare(
            "SELECT id, title, created_at, updated_at FROM category WHERE title = :title;",
        )?
        .query_row(&[(":title", title)], map_category_row)
        .optional()
        .map_err(|error| error.into())
}

/// Retrieve every category whose title is in `titles`.
///
/// Titles with no matching category are simply absent from the result.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn find_categories_by_titles(
    titles: &[&str],
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    if titles.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; titles.len()].join(", ");
    let query = format!(
        "SELECT id, title, created_at, updated_at FROM category WHERE title IN ({placeholders});"
    );

    connection
        .prepare(&query)?
        .query_map(rusqlite::params_from_iter(titles.iter()), map_category_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Resolve a single category title to a category row, creating the row if no
/// category has the title yet.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn find_or_create_category(
    title: &CategoryTitle,
    connection: &Connection,
) -> Result<Category, Error> {
    match find_category_by_title(title.as_ref(), connection)? {
        Some(category) => Ok(category),
        None => create_category(title.clone(), connection),
    }
}

/// Resolve a batch of category titles to category rows.
///
/// Issues one membership query for the whole title set, then creates exactly
/// one category per unique title with no existing match. `titles` may contain
/// duplicates. Returns the union of pre-existing and newly created
/// categories.
///
/// # Errors
/// This function will return an [Error::EmptyCategoryTitle] if a title is
/// empty, or an [Error::SqlError] if there is an SQL error.
pub fn reconcile_categories(
    titles: &[&str],
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    let mut categories = find_categories_by_titles(titles, connection)?;
    let mut known: HashSet<String> = categories
        .iter()
        .map(|category| category.title.to_string())
        .collect();

    for &title in titles {
        if known.contains(title) {
            continue;
        }

        let category = create_category(CategoryTitle::new(title)?, connection)?;
        known.insert(title.to_owned());
        categories.push(category);
    }

    Ok(categories)
}

/// Create the category table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        (),
    )?;

    Ok(())
}

fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_title: String = row.get(1)?;
    let title = CategoryTitle::new_unchecked(&raw_title);
    let created_at = row.get(2)?;
    let updated_at = row.get(3)?;

    Ok(Category {
        id,
        title,
        created_at,
        updated_at,
    })
}
