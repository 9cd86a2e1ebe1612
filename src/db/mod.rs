//! Database module for PostgreSQL operations using SQLx
//! Uses runtime query checking (no compile-time DATABASE_URL needed)

mod models;

pub use models::*;

use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("username already exists")]
    UsernameTaken,
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("Database pool created with max 10 connections");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema on a fresh database.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                hash TEXT NOT NULL,
                cash DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                shares BIGINT NOT NULL CHECK (shares > 0),
                price DOUBLE PRECISION NOT NULL,
                date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                shares BIGINT NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // ==========================================
    // User Operations
    // ==========================================

    /// Insert a new user with the seed cash balance.
    pub async fn create_user(&self, username: &str, hash: &str) -> Result<User, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, hash, cash)
            VALUES ($1, $2, $3)
            RETURNING id, username, hash, cash, created_at
            "#,
        )
        .bind(username)
        .bind(hash)
        .bind(STARTING_CASH)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(err) if err.is_unique_violation() => DbError::UsernameTaken,
            e => DbError::Sqlx(e),
        })?;

        Ok(User::from_row(&row)?)
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, hash, cash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(User::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn user_by_id(&self, user_id: i64) -> Result<User, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, hash, cash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(User::from_row(&row)?),
            None => Err(DbError::NotFound),
        }
    }

    // ==========================================
    // Portfolio Operations
    // ==========================================

    pub async fn holdings_for_user(&self, user_id: i64) -> Result<Vec<Holding>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, symbol, name, shares, price, date
            FROM portfolio
            WHERE user_id = $1
            ORDER BY symbol, id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut holdings = Vec::new();
        for row in rows {
            holdings.push(Holding::from_row(&row)?);
        }
        Ok(holdings)
    }

    // ==========================================
    // Trade Statements
    //
    // Each statement takes an explicit executor so the ledger can run the
    // whole trade inside one transaction. The user row is locked first;
    // every later statement touches rows owned by that user only.
    // ==========================================

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        Ok(self.pool.begin().await?)
    }

    /// Read the user's cash balance and lock the row for the transaction.
    pub async fn cash_for_update<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        user_id: i64,
    ) -> Result<f64, DbError> {
        let cash: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT cash FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        cash.ok_or(DbError::NotFound)
    }

    /// Find the lot a buy folds into: same user, symbol AND price.
    pub async fn lot_for_update<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        user_id: i64,
        symbol: &str,
        price: f64,
    ) -> Result<Option<Holding>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, symbol, name, shares, price, date
            FROM portfolio
            WHERE user_id = $1 AND symbol = $2 AND price = $3
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(price)
        .fetch_optional(conn)
        .await?;

        match row {
            Some(row) => Ok(Some(Holding::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Find the lot a sell draws from: same user and symbol, any price,
    /// oldest row first.
    pub async fn oldest_holding_for_update<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        user_id: i64,
        symbol: &str,
    ) -> Result<Option<Holding>, DbError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, symbol, name, shares, price, date
            FROM portfolio
            WHERE user_id = $1 AND symbol = $2
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(conn)
        .await?;

        match row {
            Some(row) => Ok(Some(Holding::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn insert_holding<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        user_id: i64,
        symbol: &str,
        name: &str,
        shares: i64,
        price: f64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO portfolio (user_id, symbol, name, shares, price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(name)
        .bind(shares)
        .bind(price)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn add_shares<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        holding_id: i64,
        shares: i64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE portfolio
            SET shares = shares + $2, date = NOW()
            WHERE id = $1
            "#,
        )
        .bind(holding_id)
        .bind(shares)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn reduce_holding<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        holding_id: i64,
        shares_left: i64,
        price: f64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE portfolio
            SET shares = $2, price = $3
            WHERE id = $1
            "#,
        )
        .bind(holding_id)
        .bind(shares_left)
        .bind(price)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn delete_holding<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        holding_id: i64,
    ) -> Result<(), DbError> {
        sqlx::query("DELETE FROM portfolio WHERE id = $1")
            .bind(holding_id)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn set_cash<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        user_id: i64,
        cash: f64,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET cash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(cash)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Append one row to the audit log and return it.
    pub async fn insert_transaction<'e>(
        &self,
        conn: impl PgExecutor<'e>,
        entry: &NewTransaction,
    ) -> Result<TransactionRecord, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (user_id, symbol, name, shares, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, symbol, name, shares, price, date
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.symbol)
        .bind(&entry.name)
        .bind(entry.shares)
        .bind(entry.price)
        .fetch_one(conn)
        .await?;

        Ok(TransactionRecord::from_row(&row)?)
    }
}
