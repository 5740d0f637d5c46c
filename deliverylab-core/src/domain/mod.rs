//! Domain types for DeliveryLab.

pub mod query;
pub mod record;

pub use query::{QueryKey, QuickRange, PROVIDER_DATE_FORMAT};
pub use record::{NormalizedRecord, NormalizedSeries, RawRecord};
