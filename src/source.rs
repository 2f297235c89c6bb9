use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{error, info};

use crate::config::MetricsConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::graph::GraphStore;

/// Parameterized read queries a data source must answer.
///
/// `None` filters mean "no restriction".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Traversal {
    /// Columns: product
    Products,
    /// Columns: stream, product
    RevenueStreams,
    /// Columns: product, period_id, year, month, quarter, volume, price
    RevenuePairs { product: Option<String> },
    /// Columns: product, period_id, year, month, quarter, volume
    Volumes { product: Option<String> },
    /// Columns: category, product, behavior, product_linked, period_id,
    /// year, month, quarter, amount
    Costs {
        product: Option<String>,
        category: Option<String>,
    },
}

/// A graph-query-capable data source returning ordered row sets.
pub trait GraphSource {
    fn run(&self, traversal: &Traversal) -> MetricsResult<DataFrame>;
}

impl<T: GraphSource + ?Sized> GraphSource for &T {
    fn run(&self, traversal: &Traversal) -> MetricsResult<DataFrame> {
        (**self).run(traversal)
    }
}

impl GraphSource for GraphStore {
    fn run(&self, traversal: &Traversal) -> MetricsResult<DataFrame> {
        match traversal {
            Traversal::Products => self.products_frame(),
            Traversal::RevenueStreams => self.streams_frame(),
            Traversal::RevenuePairs { product } => self.revenue_pairs_frame(product.as_deref()),
            Traversal::Volumes { product } => self.volumes_frame(product.as_deref()),
            Traversal::Costs { product, category } => {
                self.costs_frame(product.as_deref(), category.as_deref())
            }
        }
    }
}

/// Snapshot of the connection state for status indicators.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub error_message: Option<String>,
    pub data_dir: PathBuf,
    pub database: String,
}

/// Explicitly constructed handle to the entity graph.
///
/// Opening never fails: a load failure is remembered and every subsequent
/// traversal reports it as [`MetricsError::Connection`].
#[derive(Debug)]
pub struct GraphConnection {
    store: Result<GraphStore, String>,
    data_dir: PathBuf,
    database: String,
}

impl GraphConnection {
    pub fn open(config: &MetricsConfig) -> Self {
        let store = match GraphStore::load_dir(&config.data_dir) {
            Ok(store) => {
                info!(
                    data_dir = %config.data_dir.display(),
                    database = %config.database,
                    "connected to metrics graph"
                );
                Ok(store)
            }
            Err(err) => {
                let message = format!("Failed to open metrics graph: {err}");
                error!(data_dir = %config.data_dir.display(), error = %err, "{message}");
                Err(message)
            }
        };
        Self {
            store,
            data_dir: config.data_dir.clone(),
            database: config.database.clone(),
        }
    }

    /// Wrap an already built store.
    pub fn from_store(store: GraphStore, config: &MetricsConfig) -> Self {
        Self {
            store: Ok(store),
            data_dir: config.data_dir.clone(),
            database: config.database.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_ok()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            error_message: self.store.as_ref().err().cloned(),
            data_dir: self.data_dir.clone(),
            database: self.database.clone(),
        }
    }

    pub fn close(self) {
        if self.is_connected() {
            info!(data_dir = %self.data_dir.display(), "closed metrics graph");
        }
    }
}

impl GraphSource for GraphConnection {
    fn run(&self, traversal: &Traversal) -> MetricsResult<DataFrame> {
        match &self.store {
            Ok(store) => store.run(traversal),
            Err(message) => Err(MetricsError::Connection(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_directory_yields_disconnected_status() {
        let config = MetricsConfig {
            data_dir: PathBuf::from("/nonexistent/goldenberry/data"),
            ..MetricsConfig::default()
        };
        let connection = GraphConnection::open(&config);
        let status = connection.status();
        assert!(!status.connected);
        assert!(status
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("Data directory not found")));

        let err = connection.run(&Traversal::Products).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn wrapped_store_answers_traversals() {
        let mut b = GraphStore::builder();
        b.product("Goldenberries");
        let connection = GraphConnection::from_store(b.build(), &MetricsConfig::default());
        assert!(connection.status().connected);
        let df = connection.run(&Traversal::Products).unwrap();
        assert_eq!(df.height(), 1);
    }
}
