//! DeliveryLab Core: daily price, volume and delivery data for one NSE equity.
//!
//! - Domain types (query keys, raw provider rows, normalized series)
//! - Providers: the NSE historical endpoint and offline CSV exports
//! - Normalization pipeline (EQ filter, numeric cleanup, sort, derived columns)
//! - Fetch session with in-memory TTL cache, optional Parquet tier and
//!   single-flight loading
//! - TOML configuration and display formatting

pub mod config;
pub mod data;
pub mod domain;
pub mod format;

pub use config::DashboardConfig;
pub use data::{DataError, FetchSession, FetchSource};
pub use domain::{NormalizedRecord, NormalizedSeries, QueryKey, QuickRange};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the session can be shared across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::QueryKey>();
        require_sync::<domain::QueryKey>();
        require_send::<domain::NormalizedSeries>();
        require_sync::<domain::NormalizedSeries>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        require_send::<data::FetchSession<data::NseProvider>>();
        require_sync::<data::FetchSession<data::NseProvider>>();
        require_send::<data::FetchSession<Box<dyn data::DailyRecordProvider>>>();
        require_sync::<data::FetchSession<Box<dyn data::DailyRecordProvider>>>();
        require_send::<data::DiskCache>();
        require_sync::<data::DiskCache>();
    }
}
