//! Revenue and cost metrics over a product / period / cost entity graph.
//!
//! [`GraphStore`] holds the entities, [`MetricsService`] runs the operation
//! catalog against any [`GraphSource`], and [`derived`] turns the aggregates
//! into margins, allocations and distributions.

pub mod config;
pub mod derived;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod query;
pub mod records;
pub mod report;
pub mod schema;
pub mod source;
pub mod timeline;

#[cfg(feature = "python")]
mod python;

pub use config::MetricsConfig;
pub use error::{ErrorKind, MetricsError, MetricsResult};
pub use graph::{GraphStore, GraphStoreBuilder};
pub use model::{display_name, parse_quarter, CostBehavior, QuarterValue, TimePeriod};
pub use query::{CostFilter, MetricsService};
pub use report::ExecutiveSummary;
pub use source::{ConnectionStatus, GraphConnection, GraphSource, Traversal};
