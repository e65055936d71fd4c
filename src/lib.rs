//! Join boundary geometry with measurement tables, and pivot long-format
//! measurements into stacked series, ready for a choropleth or a stacked
//! bar/area chart.
//!
//! Both transformations are pure: [`resolve::resolve`] and
//! [`series::build_series`] take fully materialized inputs and return fresh
//! results together with a list of [`diagnostics::Diagnostic`]s for
//! anything they had to skip or guess.

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod resolve;
pub mod scale;
pub mod series;
pub mod session;
pub mod value;

pub use config::Config;
pub use error::TransformError;
pub use session::Session;
