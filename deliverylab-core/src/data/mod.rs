//! Data acquisition, normalization and caching

pub mod cache;
pub mod csv_import;
pub mod disk_cache;
pub mod normalize;
pub mod nse;
pub mod provider;
pub mod session;

pub use cache::SeriesCache;
pub use csv_import::CsvImportProvider;
pub use disk_cache::{DiskCache, DiskCacheMeta, DiskEntry};
pub use normalize::{normalize, normalize_records};
pub use nse::NseProvider;
pub use provider::{DailyRecordProvider, DataError, ErrorKind};
pub use session::{FetchSession, FetchSource, FetchStats};
