//! User-facing failure taxonomy.
//!
//! Every variant maps to one status code and a JSON body of the shape
//! `{"success": false, "error": ...}`. Internal details are logged
//! server-side and never echoed to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{debug, error};

use crate::db::DbError;
use crate::quotes::QuoteError;
use crate::trading::TradeError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request field.
    #[error("{0}")]
    Validation(String),
    /// Request was well-formed but violates an account rule.
    #[error("{0}")]
    BusinessRule(String),
    /// Bad credentials or no session.
    #[error("{0}")]
    Auth(String),
    /// The named thing does not exist. Unknown symbols land here and,
    /// like the rest of the taxonomy's 4xx cases, answer with 400.
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BusinessRule(_) | ApiError::NotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UsernameTaken => ApiError::BusinessRule("username already exists".to_string()),
            DbError::NotFound => ApiError::NotFound("no such record".to_string()),
            DbError::Sqlx(e) => {
                error!("database failure: {}", e);
                ApiError::Internal("internal server error".to_string())
            }
        }
    }
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::InvalidShareCount => ApiError::Validation(err.to_string()),
            TradeError::InsufficientFunds { needed, available } => {
                debug!("trade rejected: costs {:.2}, balance {:.2}", needed, available);
                ApiError::BusinessRule(err.to_string())
            }
            TradeError::InsufficientShares { held, requested } => {
                debug!("trade rejected: holds {}, asked to sell {}", held, requested);
                ApiError::BusinessRule(err.to_string())
            }
            TradeError::NoSuchHolding { ref symbol } => {
                debug!("trade rejected: no {} holding", symbol);
                ApiError::BusinessRule(err.to_string())
            }
            TradeError::Db(e) => ApiError::from(e),
        }
    }
}

impl From<QuoteError> for ApiError {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::UnknownSymbol(_) => ApiError::NotFound("symbol is invalid".to_string()),
            QuoteError::Request(e) => {
                error!("quote provider request failed: {}", e);
                ApiError::Internal("internal server error".to_string())
            }
            QuoteError::Parse(e) => {
                error!("quote provider returned garbage: {}", e);
                ApiError::Internal("internal server error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(
            ApiError::Validation("must provide symbol".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BusinessRule("cash balance not enough".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth("login required".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("symbol is invalid".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn trade_errors_keep_their_user_facing_messages() {
        let err = ApiError::from(TradeError::InsufficientFunds {
            needed: 1_500.0,
            available: 1_000.0,
        });
        assert_eq!(err.to_string(), "cash balance not enough");

        let err = ApiError::from(TradeError::NoSuchHolding {
            symbol: "AAPL".into(),
        });
        assert_eq!(err.to_string(), "you don't have this stock");
    }

    #[test]
    fn unknown_symbols_surface_as_invalid_symbol() {
        let err = ApiError::from(QuoteError::UnknownSymbol("ZZZZ".into()));
        assert_eq!(err.to_string(), "symbol is invalid");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
