//! notamboard: NOTAM map synchronization, filtering and weather-minima checks for
//! an aeronautical operations dashboard.

pub mod config;
pub mod dashboard;
pub mod filters;
pub mod flights;
pub mod gateway;
pub mod geometry;
pub mod log_format;
pub mod map;
pub mod metrics;
pub mod minima;
pub mod notams;
pub mod stats;
pub mod weather;

pub use dashboard::{Dashboard, DashboardSnapshot, OpStatus};
pub use filters::FilterState;
pub use gateway::{CredentialProvider, GatewayError, NotamGateway};
pub use minima::{MinimaCheck, MinimaThreshold, WeatherReport, evaluate};
pub use notams::NotamRecord;

/// `git describe` of the build, or the crate version outside a git checkout
pub fn version() -> &'static str {
    option_env!("VERGEN_GIT_DESCRIBE").unwrap_or(env!("CARGO_PKG_VERSION"))
}
