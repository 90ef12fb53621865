//! Marketplace boundary: feed submission, competitive pricing and catalog
//! lookup types, plus the HTTP client that talks to the pricing gateway.
//!
//! Feed submission is asynchronous upstream: a successful [`FeedAck`] means
//! the marketplace accepted the feed, not that the price is live.

pub mod http;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Classification;

pub use http::HttpMarketplaceClient;

/// Price change as sent to the marketplace feed endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPriceUpdate {
    /// Seller SKU.
    pub sku: String,
    /// Marketplace ASIN.
    pub asin: String,
    /// New listing price.
    pub price: Decimal,
    /// Price being replaced, when known.
    pub previous_price: Option<Decimal>,
    /// Listing classification the feed format requires.
    pub classification: Classification,
}

/// Receipt for an accepted feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeedAck {
    /// Marketplace feed identifier.
    #[serde(default)]
    pub feed_id: Option<String>,
    /// Processing status reported at acceptance (e.g. `"IN_QUEUE"`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Category of a failed feed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeedFailureKind {
    /// No credentials were available to sign the request.
    MissingCredentials,
    /// The marketplace rejected the credentials.
    AuthenticationFailed,
    /// The marketplace quota was exceeded.
    RateLimited,
    /// The marketplace rejected the feed contents.
    InvalidRequest,
    /// Anything else, including transport failures.
    UnknownUpstream,
}

impl FeedFailureKind {
    /// Message shown to the seller.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => {
                "Marketplace credentials are not configured. Ask an administrator to connect the seller account."
            }
            Self::AuthenticationFailed => {
                "The marketplace rejected our credentials. Reconnect the seller account and try again."
            }
            Self::RateLimited => {
                "The marketplace is throttling price updates. Wait a few minutes before trying again."
            }
            Self::InvalidRequest => {
                "The marketplace rejected this price update. Check the listing in Seller Central."
            }
            Self::UnknownUpstream => {
                "The marketplace returned an unexpected error. Try again or update the price in Seller Central."
            }
        }
    }

    /// Whether the seller should finish the change in the seller console.
    #[must_use]
    pub const fn manual_intervention_recommended(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::InvalidRequest | Self::UnknownUpstream
        )
    }

    /// Whether retrying later (not immediately) is expected to help.
    #[must_use]
    pub const fn retry_later(&self) -> bool {
        matches!(self, Self::RateLimited | Self::UnknownUpstream)
    }

    /// Maps an upstream HTTP status to a category.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed,
            429 => Self::RateLimited,
            400 | 404 | 409 | 422 => Self::InvalidRequest,
            _ => Self::UnknownUpstream,
        }
    }
}

impl fmt::Display for FeedFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingCredentials => "missing_credentials",
            Self::AuthenticationFailed => "authentication_failed",
            Self::RateLimited => "rate_limited",
            Self::InvalidRequest => "invalid_request",
            Self::UnknownUpstream => "unknown_upstream",
        };
        f.write_str(s)
    }
}

/// Failed feed submission with its category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FeedError {
    /// Failure category.
    pub kind: FeedFailureKind,
    /// Upstream or transport detail.
    pub message: String,
}

impl FeedError {
    /// Creates a categorized feed error.
    #[must_use]
    pub fn new(kind: FeedFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Failure of a pricing or catalog read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered with no data. Retryable.
    #[error("provider returned no data")]
    Empty,
    /// The provider could not be reached or answered with an error status.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// The provider answered with a body we could not decode.
    #[error("could not decode provider response: {0}")]
    Decode(String),
}
