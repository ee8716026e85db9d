//! Snapshot provider contract.
//!
//! A [`MarketDataSource`] returns the top-N coins by market capitalization as
//! validated [`MarketRecord`]s, or a [`FetchError`] saying why it could not.
//! Callers never see partially validated batches.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{MarketRecord, ValidationError};

/// Fetch failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport failure or non-success HTTP status.
    Network,
    /// Body was not an array of items, or an item failed validation.
    Validation,
    /// The request itself was unusable (for example `n == 0`).
    InvalidRequest,
}

/// Structured fetch error.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
    item: Option<(usize, ValidationError)>,
}

impl FetchError {
    /// Transport failure worth retrying on the next cycle.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            message: message.into(),
            retryable: true,
            item: None,
        }
    }

    /// Transport-level rejection that will not clear on its own (for example 401).
    pub fn non_retryable_network(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::network(message)
        }
    }

    /// Body that is not an array of market items.
    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Validation,
            message: message.into(),
            retryable: false,
            item: None,
        }
    }

    /// First invalid item in a batch, by position.
    pub fn invalid_item(index: usize, error: ValidationError) -> Self {
        Self {
            kind: FetchErrorKind::Validation,
            message: format!("item {index} failed validation: {error}"),
            retryable: false,
            item: Some((index, error)),
        }
    }

    /// Request rejected before it was sent.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
            item: None,
        }
    }

    /// Failure classification.
    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a later cycle may succeed without intervention.
    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Validation failure of the offending item, if any.
    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.item.as_ref().map(|(_, error)| error)
    }

    /// Position of the offending item in the provider batch.
    pub fn item_index(&self) -> Option<usize> {
        self.item.as_ref().map(|(index, _)| *index)
    }

    /// Stable machine-readable code, for example `fetch.network`.
    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::Validation => "fetch.validation",
            FetchErrorKind::InvalidRequest => "fetch.invalid_request",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Boxed future returned by [`MarketDataSource::fetch_top_n`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<MarketRecord>, FetchError>> + Send + 'a>>;

/// Ranked snapshot provider.
///
/// Implementations must be idempotent: calling `fetch_top_n` repeatedly has no
/// effect beyond the outbound request.
pub trait MarketDataSource: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the top `n` coins by market cap, descending, page 1.
    fn fetch_top_n(&self, n: usize) -> FetchFuture<'_>;
}
