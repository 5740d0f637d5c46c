//! Data provider trait and structured error types.
//!
//! The DailyRecordProvider trait abstracts over where raw rows come from (the
//! NSE endpoint, a CSV export on disk) so the pipeline can be driven by a
//! mock in tests.

use thiserror::Error;

use crate::domain::RawRecord;

/// Structured error types for data operations.
///
/// These are designed to be displayable in both CLI and library contexts.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("upstream returned HTTP {status} for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no EQ rows for {symbol} between {from} and {to}")]
    NoRows {
        symbol: String,
        from: String,
        to: String,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Coarse classification of a [`DataError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The provider call failed or produced no usable rows.
    Upstream,
    /// Rows arrived but none could be turned into a valid record.
    Validation,
    /// The caller asked for something malformed.
    InvalidQuery,
    /// Local cache or storage trouble.
    Cache,
    Internal,
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::NetworkUnreachable(_)
            | DataError::HttpStatus { .. }
            | DataError::ResponseFormatChanged(_)
            | DataError::SourceUnavailable(_)
            | DataError::NoRows { .. } => ErrorKind::Upstream,
            DataError::ValidationError(_) => ErrorKind::Validation,
            DataError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            DataError::CacheError(_) | DataError::ParquetError(_) => ErrorKind::Cache,
            DataError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn is_upstream(&self) -> bool {
        self.kind() == ErrorKind::Upstream
    }
}

/// Source of daily price/volume/deliverable rows.
///
/// Implementations make exactly one attempt per call. The cache layer sits
/// above this trait; providers don't know about it.
pub trait DailyRecordProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch raw rows for `symbol` between `from` and `to` inclusive.
    ///
    /// Both dates use the provider convention `DD-MM-YYYY`.
    fn get_daily_records(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<RawRecord>, DataError>;
}

impl<P: DailyRecordProvider + ?Sized> DailyRecordProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_daily_records(
        &self,
        symbol: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<RawRecord>, DataError> {
        (**self).get_daily_records(symbol, from, to)
    }
}
