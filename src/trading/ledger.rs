//! Trade ledger updater.
//!
//! A trade touches three tables: the user's cash balance, the portfolio
//! lot, and the append-only transactions log. All three writes run inside
//! a single database transaction with the user row locked first, so a
//! failure at any point leaves no partial state and two concurrent trades
//! for the same user serialize instead of losing an update.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::db::{Database, DbError, NewTransaction, TransactionRecord};
use crate::quotes::Quote;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("shares must be at least 1")]
    InvalidShareCount,
    #[error("cash balance not enough")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("you don't have this stock")]
    NoSuchHolding { symbol: String },
    #[error("insufficient share count")]
    InsufficientShares { held: i64, requested: i64 },
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Outcome of a completed trade, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub total: f64,
    pub cash_after: f64,
    pub transaction: TransactionRecord,
}

/// Effect of a buy against the current balance.
#[derive(Debug, PartialEq)]
struct BuyPlan {
    total_cost: f64,
    cash_after: f64,
}

fn plan_buy(cash: f64, shares: i64, price: f64) -> Result<BuyPlan, TradeError> {
    if shares < 1 {
        return Err(TradeError::InvalidShareCount);
    }
    let total_cost = price * shares as f64;
    if total_cost > cash {
        return Err(TradeError::InsufficientFunds {
            needed: total_cost,
            available: cash,
        });
    }
    Ok(BuyPlan {
        total_cost,
        cash_after: cash - total_cost,
    })
}

/// What happens to the lot after a sell.
#[derive(Debug, PartialEq)]
enum SellDisposition {
    /// Lot keeps this many shares.
    Reduce { shares_left: i64 },
    /// Lot is emptied and its row deleted.
    Close,
}

#[derive(Debug, PartialEq)]
struct SellPlan {
    proceeds: f64,
    cash_after: f64,
    disposition: SellDisposition,
}

fn plan_sell(cash: f64, held: i64, shares: i64, price: f64) -> Result<SellPlan, TradeError> {
    if shares < 1 {
        return Err(TradeError::InvalidShareCount);
    }
    if held < shares {
        return Err(TradeError::InsufficientShares {
            held,
            requested: shares,
        });
    }
    let proceeds = price * shares as f64;
    let shares_left = held - shares;
    Ok(SellPlan {
        proceeds,
        cash_after: cash + proceeds,
        disposition: if shares_left == 0 {
            SellDisposition::Close
        } else {
            SellDisposition::Reduce { shares_left }
        },
    })
}

#[derive(Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Buy `shares` of the quoted stock at the quoted price.
    ///
    /// A lot already holding this symbol at this exact price grows;
    /// otherwise a new lot is opened.
    pub async fn buy(
        &self,
        user_id: i64,
        quote: &Quote,
        shares: i64,
    ) -> Result<TradeReceipt, TradeError> {
        let mut tx = self.db.begin().await?;

        let cash = self.db.cash_for_update(&mut *tx, user_id).await?;
        let plan = plan_buy(cash, shares, quote.price)?;

        match self
            .db
            .lot_for_update(&mut *tx, user_id, &quote.symbol, quote.price)
            .await?
        {
            Some(lot) => self.db.add_shares(&mut *tx, lot.id, shares).await?,
            None => {
                self.db
                    .insert_holding(
                        &mut *tx,
                        user_id,
                        &quote.symbol,
                        &quote.name,
                        shares,
                        quote.price,
                    )
                    .await?
            }
        }

        self.db.set_cash(&mut *tx, user_id, plan.cash_after).await?;
        let transaction = self
            .db
            .insert_transaction(
                &mut *tx,
                &NewTransaction {
                    user_id,
                    symbol: quote.symbol.clone(),
                    name: quote.name.clone(),
                    shares,
                    price: quote.price,
                },
            )
            .await?;

        tx.commit().await.map_err(DbError::from)?;

        debug!(
            "user {} bought {} {} @ {}, cash {} -> {}",
            user_id, shares, quote.symbol, quote.price, cash, plan.cash_after
        );

        Ok(TradeReceipt {
            symbol: quote.symbol.clone(),
            shares,
            price: quote.price,
            total: plan.total_cost,
            cash_after: plan.cash_after,
            transaction,
        })
    }

    /// Sell `shares` of the quoted stock at the quoted price.
    ///
    /// The sell draws from the oldest lot matching the symbol alone,
    /// regardless of the price it was bought at. An emptied lot is
    /// deleted; a reduced one keeps the sale price.
    pub async fn sell(
        &self,
        user_id: i64,
        quote: &Quote,
        shares: i64,
    ) -> Result<TradeReceipt, TradeError> {
        let mut tx = self.db.begin().await?;

        let cash = self.db.cash_for_update(&mut *tx, user_id).await?;
        let lot = self
            .db
            .oldest_holding_for_update(&mut *tx, user_id, &quote.symbol)
            .await?
            .ok_or_else(|| TradeError::NoSuchHolding {
                symbol: quote.symbol.clone(),
            })?;

        let plan = plan_sell(cash, lot.shares, shares, quote.price)?;

        match plan.disposition {
            SellDisposition::Close => self.db.delete_holding(&mut *tx, lot.id).await?,
            SellDisposition::Reduce { shares_left } => {
                self.db
                    .reduce_holding(&mut *tx, lot.id, shares_left, quote.price)
                    .await?
            }
        }

        self.db.set_cash(&mut *tx, user_id, plan.cash_after).await?;
        let transaction = self
            .db
            .insert_transaction(
                &mut *tx,
                &NewTransaction {
                    user_id,
                    symbol: quote.symbol.clone(),
                    name: quote.name.clone(),
                    shares: -shares,
                    price: quote.price,
                },
            )
            .await?;

        tx.commit().await.map_err(DbError::from)?;

        debug!(
            "user {} sold {} {} @ {}, cash {} -> {}",
            user_id, shares, quote.symbol, quote.price, cash, plan.cash_after
        );

        Ok(TradeReceipt {
            symbol: quote.symbol.clone(),
            shares,
            price: quote.price,
            total: plan.proceeds,
            cash_after: plan.cash_after,
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_deducts_exact_cost() {
        let plan = plan_buy(10_000.0, 10, 150.0).unwrap();
        assert_eq!(plan.total_cost, 1_500.0);
        assert_eq!(plan.cash_after, 8_500.0);
    }

    #[test]
    fn buy_spending_full_balance_is_allowed() {
        let plan = plan_buy(1_500.0, 10, 150.0).unwrap();
        assert_eq!(plan.cash_after, 0.0);
    }

    #[test]
    fn buy_rejects_insufficient_funds() {
        let err = plan_buy(1_000.0, 10, 150.0).unwrap_err();
        match err {
            TradeError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 1_500.0);
                assert_eq!(available, 1_000.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn buy_rejects_non_positive_share_count() {
        assert!(matches!(
            plan_buy(10_000.0, 0, 150.0),
            Err(TradeError::InvalidShareCount)
        ));
        assert!(matches!(
            plan_buy(10_000.0, -5, 150.0),
            Err(TradeError::InvalidShareCount)
        ));
    }

    #[test]
    fn partial_sell_credits_proceeds_and_keeps_lot() {
        // After buying 10 @ 150 out of 10,000: cash 8,500. Sell 5 @ 160.
        let plan = plan_sell(8_500.0, 10, 5, 160.0).unwrap();
        assert_eq!(plan.proceeds, 800.0);
        assert_eq!(plan.cash_after, 9_300.0);
        assert_eq!(plan.disposition, SellDisposition::Reduce { shares_left: 5 });
    }

    #[test]
    fn selling_every_share_closes_the_lot() {
        let plan = plan_sell(9_300.0, 5, 5, 160.0).unwrap();
        assert_eq!(plan.cash_after, 9_300.0 + 800.0);
        assert_eq!(plan.disposition, SellDisposition::Close);
    }

    #[test]
    fn sell_rejects_more_shares_than_held() {
        let err = plan_sell(8_500.0, 10, 11, 160.0).unwrap_err();
        match err {
            TradeError::InsufficientShares { held, requested } => {
                assert_eq!(held, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sell_rejects_non_positive_share_count() {
        assert!(matches!(
            plan_sell(8_500.0, 10, 0, 160.0),
            Err(TradeError::InvalidShareCount)
        ));
    }
}
