//! Database models matching the PostgreSQL schema

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

/// Cash balance granted to every newly registered account.
pub const STARTING_CASH: f64 = 10_000.0;

/// Registered account. `cash` is mutated only by trades.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// bcrypt hash, never exposed in responses.
    #[serde(skip_serializing)]
    pub hash: String,
    pub cash: f64,
    pub created_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            hash: row.try_get("hash")?,
            cash: row.try_get("cash")?,
            created_at: row.try_get("created_at").ok(),
        })
    }
}

/// One lot of shares a user currently holds.
///
/// There is one row per (user, symbol, price): buying the same symbol at a
/// different price opens a second lot instead of averaging the cost basis.
/// `shares` stays above zero while the row exists; a sell that empties the lot
/// deletes it. `price` is the last trade price, untouched by portfolio reads.
#[derive(Debug, Clone, Serialize)]
pub struct Holding {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: f64,
    pub date: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for Holding {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            shares: row.try_get("shares")?,
            price: row.try_get("price")?,
            date: row.try_get("date").ok(),
        })
    }
}

/// Append-only audit record of one buy or sell.
///
/// `shares` is signed: positive for buys, negative for sells.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: f64,
    pub date: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            symbol: row.try_get("symbol")?,
            name: row.try_get("name")?,
            shares: row.try_get("shares")?,
            price: row.try_get("price")?,
            date: row.try_get("date").ok(),
        })
    }
}

/// New audit row to append; id and date are assigned by the database.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: f64,
}
