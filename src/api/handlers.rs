//! API request handlers
//!
//! Every handler receives the shared state explicitly and resolves the
//! calling user from the session cookie; there is no request-global
//! mutable state.

use crate::api::error::ApiError;
use crate::session;
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

// ==========================================
// Request Types
// ==========================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    #[serde(default)]
    symbol: String,
    shares: Option<i64>,
}

// ==========================================
// Helpers
// ==========================================

/// Resolve the calling user from the session cookie.
fn current_user_id(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    session::session_token(headers)
        .and_then(|token| state.sessions.user_id(&token))
        .ok_or_else(|| ApiError::Auth("login required".to_string()))
}

fn require_symbol(symbol: &str) -> Result<&str, ApiError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::Validation("must provide symbol".to_string()));
    }
    Ok(symbol)
}

fn require_shares(shares: Option<i64>) -> Result<i64, ApiError> {
    let shares = shares.ok_or_else(|| ApiError::Validation("must provide shares".to_string()))?;
    if shares < 1 {
        return Err(ApiError::Validation(
            "shares must be at least 1".to_string(),
        ));
    }
    Ok(shares)
}

/// Dollar amount with thousands separators, e.g. 1500 -> "$1,500.00".
fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as i64;
    let sign = if amount < 0.0 { "-" } else { "" };
    format!(
        "{}${}.{:02}",
        sign,
        group_thousands(cents / 100),
        cents % 100
    )
}

fn group_thousands(dollars: i64) -> String {
    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// ==========================================
// Health Handler
// ==========================================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "finance_backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ==========================================
// Account Handlers
// ==========================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("must provide username".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("must provide password".to_string()));
    }
    if req.password_confirm.is_empty() {
        return Err(ApiError::Validation(
            "must provide password confirmation".to_string(),
        ));
    }
    if req.password != req.password_confirm {
        return Err(ApiError::BusinessRule("must match password".to_string()));
    }

    let hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST).map_err(|e| {
        warn!("password hashing failed: {}", e);
        ApiError::Internal("internal server error".to_string())
    })?;

    // Duplicate usernames are caught by the unique constraint rather than
    // a racy select-then-insert.
    let user = state.db.create_user(username, &hash).await?;
    info!("registered user {}", user.username);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Account created successfully.",
        })),
    )
        .into_response())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("must provide username".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("must provide password".to_string()));
    }

    let user = state
        .db
        .user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::Auth("invalid username and/or password".to_string()))?;

    if !bcrypt::verify(&req.password, &user.hash).unwrap_or(false) {
        return Err(ApiError::Auth(
            "invalid username and/or password".to_string(),
        ));
    }

    let token = state.sessions.create(user.id);
    info!("user {} logged in", user.username);

    let mut response = Json(serde_json::json!({
        "success": true,
        "user": user,
    }))
    .into_response();
    let cookie = HeaderValue::from_str(&session::session_cookie(&token))
        .map_err(|_| ApiError::Internal("internal server error".to_string()))?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session::session_token(&headers) {
        state.sessions.destroy(&token);
    }

    let mut response = Json(serde_json::json!({
        "success": true,
        "message": "Logged out.",
    }))
    .into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static(session::EXPIRED_COOKIE),
    );
    response
}

// ==========================================
// Quote Handler
// ==========================================

pub async fn quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<QuoteRequest>,
) -> Result<Response, ApiError> {
    current_user_id(&state, &headers)?;
    let symbol = require_symbol(&req.symbol)?;

    let quote = state.quotes.lookup(symbol).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "quote": quote,
    }))
    .into_response())
}

// ==========================================
// Trade Handlers
// ==========================================

pub async fn buy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Response, ApiError> {
    let user_id = current_user_id(&state, &headers)?;
    let symbol = require_symbol(&req.symbol)?;
    let shares = require_shares(req.shares)?;

    let quote = state.quotes.lookup(symbol).await?;
    let receipt = state.ledger.buy(user_id, &quote, shares).await?;
    info!(
        "user {} bought {} {} for {}",
        user_id,
        receipt.shares,
        receipt.symbol,
        format_usd(receipt.total)
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!(
            "Successfully purchased {} {} for {}.",
            receipt.shares,
            receipt.symbol,
            format_usd(receipt.total)
        ),
        "receipt": receipt,
    }))
    .into_response())
}

pub async fn sell(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TradeRequest>,
) -> Result<Response, ApiError> {
    let user_id = current_user_id(&state, &headers)?;
    let symbol = require_symbol(&req.symbol)?;
    let shares = require_shares(req.shares)?;

    let quote = state.quotes.lookup(symbol).await?;
    let receipt = state.ledger.sell(user_id, &quote, shares).await?;
    info!(
        "user {} sold {} {} for {}",
        user_id,
        receipt.shares,
        receipt.symbol,
        format_usd(receipt.total)
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!(
            "Successfully sold {} {} for {}.",
            receipt.shares,
            receipt.symbol,
            format_usd(receipt.total)
        ),
        "receipt": receipt,
    }))
    .into_response())
}

// ==========================================
// Portfolio Handler
// ==========================================

pub async fn index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_id = current_user_id(&state, &headers)?;
    let user = state.db.user_by_id(user_id).await?;
    let holdings = state.db.holdings_for_user(user_id).await?;

    let mut positions = Vec::with_capacity(holdings.len());
    let mut holdings_value = 0.0;
    for holding in holdings {
        // Live price is display-only; the stored price keeps the last trade.
        let live_price = match state.quotes.lookup(&holding.symbol).await {
            Ok(quote) => quote.price,
            Err(err) => {
                warn!("quote refresh failed for {}: {}", holding.symbol, err);
                holding.price
            }
        };
        let value = live_price * holding.shares as f64;
        holdings_value += value;

        positions.push(serde_json::json!({
            "symbol": holding.symbol,
            "name": holding.name,
            "shares": holding.shares,
            "price": holding.price,
            "live_price": live_price,
            "value": value,
            "date": holding.date,
        }));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "cash": user.cash,
        "holdings": positions,
        "total": user.cash + holdings_value,
    }))
    .into_response())
}

// ==========================================
// History Handler
// ==========================================

pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    current_user_id(&state, &headers)?;

    // The audit rows are written by every trade; the listing endpoint is
    // not built yet.
    Ok((
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "success": false,
            "error": "TODO",
        })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_dollar_amounts_with_separators() {
        assert_eq!(format_usd(1_500.0), "$1,500.00");
        assert_eq!(format_usd(0.5), "$0.50");
        assert_eq!(format_usd(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_usd(-42.0), "-$42.00");
        assert_eq!(format_usd(999.0), "$999.00");
    }

    #[test]
    fn symbol_validation_trims_and_rejects_empty() {
        assert_eq!(require_symbol(" aapl ").unwrap(), "aapl");
        assert!(require_symbol("   ").is_err());
        assert!(require_symbol("").is_err());
    }

    #[test]
    fn share_validation_distinguishes_missing_from_invalid() {
        assert_eq!(require_shares(Some(10)).unwrap(), 10);

        let missing = require_shares(None).unwrap_err();
        assert_eq!(missing.to_string(), "must provide shares");

        let invalid = require_shares(Some(0)).unwrap_err();
        assert_eq!(invalid.to_string(), "shares must be at least 1");
    }
}
