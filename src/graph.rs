use std::collections::HashMap;
use std::path::Path;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{MetricsError, MetricsResult};
use crate::model::{parse_quarter, CostBehavior, QuarterValue, TimePeriod};
use crate::schema::{
    cost, cost_structure, facts, files, period, price, product, stream, volume,
};

/// Node payloads of the entity graph.
#[derive(Debug, Clone)]
enum Node {
    Product(String),
    RevenueStream(String),
    Period { id: String, period: TimePeriod },
    Price(f64),
    Volume(f64),
    CostStructure(String),
    Cost { amount: f64, behavior: CostBehavior },
}

/// Edge labels of the entity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    SellsProduct,
    PricedForProduct,
    PricedInPeriod,
    VolumeForProduct,
    OccursInPeriod,
    CostForStructure,
    CostForProduct,
    IncurredInPeriod,
}

/// Read-only entity graph of products, periods, prices, volumes and costs.
///
/// Built once (from CSV files or through [`GraphStoreBuilder`]) and then only
/// traversed. Every traversal returns a polars DataFrame whose columns are
/// named in [`crate::schema::facts`].
#[derive(Debug, Default)]
pub struct GraphStore {
    graph: DiGraph<Node, Relation>,
    /// Map from product name → NodeIndex for fast lookup.
    products: HashMap<String, NodeIndex>,
    periods: HashMap<String, NodeIndex>,
    structures: HashMap<String, NodeIndex>,
    product_order: Vec<NodeIndex>,
    stream_order: Vec<NodeIndex>,
    cost_order: Vec<NodeIndex>,
}

impl GraphStore {
    pub fn builder() -> GraphStoreBuilder {
        GraphStoreBuilder::default()
    }

    pub fn product_count(&self) -> usize {
        self.product_order.len()
    }

    /// Load a store from a directory of CSV files.
    ///
    /// Required files: products.csv, time_periods.csv, prices.csv,
    /// volumes.csv, cost_structures.csv, costs.csv.
    /// Optional: revenue_streams.csv.
    /// Every file is read with all columns as strings and parsed here, so
    /// errors name the offending row.
    pub fn load_dir(dir: &Path) -> MetricsResult<Self> {
        if !dir.is_dir() {
            return Err(MetricsError::Connection(format!(
                "Data directory not found: {}",
                dir.display()
            )));
        }

        let mut builder = GraphStore::builder();

        let products = read_csv_as_strings(dir, files::PRODUCTS)?;
        require_columns(&products, files::PRODUCTS, &[product::NAME])?;
        for (i, name) in products.column(product::NAME)?.str()?.into_iter().enumerate() {
            let name = required_cell(name, files::PRODUCTS, product::NAME, i)?;
            builder.product(name);
        }

        let periods = read_csv_as_strings(dir, files::TIME_PERIODS)?;
        require_columns(
            &periods,
            files::TIME_PERIODS,
            &[period::PERIOD_ID, period::YEAR, period::MONTH],
        )?;
        let ids = periods.column(period::PERIOD_ID)?.str()?;
        let years = periods.column(period::YEAR)?.str()?;
        let months = periods.column(period::MONTH)?.str()?;
        let quarters = match periods.column(period::QUARTER) {
            Ok(column) => Some(column.str()?),
            Err(_) => None,
        };
        for i in 0..periods.height() {
            let id = required_cell(ids.get(i), files::TIME_PERIODS, period::PERIOD_ID, i)?;
            let year: i32 = parse_cell(years.get(i), files::TIME_PERIODS, period::YEAR, i)?;
            let month: u32 = parse_cell(months.get(i), files::TIME_PERIODS, period::MONTH, i)?;
            let time_period = match quarters {
                Some(q) => {
                    let quarter = parse_quarter(&QuarterValue::from(q.get(i)));
                    TimePeriod::with_quarter(year, month, quarter)?
                }
                None => TimePeriod::new(year, month)?,
            };
            builder.period(id, time_period)?;
        }

        let stream_path = dir.join(files::REVENUE_STREAMS);
        if stream_path.exists() {
            let streams = read_csv_as_strings(dir, files::REVENUE_STREAMS)?;
            require_columns(
                &streams,
                files::REVENUE_STREAMS,
                &[stream::STREAM_ID, stream::PRODUCT],
            )?;
            let ids = streams.column(stream::STREAM_ID)?.str()?;
            let names = streams.column(stream::PRODUCT)?.str()?;
            for i in 0..streams.height() {
                let id = required_cell(ids.get(i), files::REVENUE_STREAMS, stream::STREAM_ID, i)?;
                let name = required_cell(names.get(i), files::REVENUE_STREAMS, stream::PRODUCT, i)?;
                builder.revenue_stream(id, name)?;
            }
        }

        let prices = read_csv_as_strings(dir, files::PRICES)?;
        require_columns(
            &prices,
            files::PRICES,
            &[price::PRODUCT, price::PERIOD_ID, price::PRICE],
        )?;
        let names = prices.column(price::PRODUCT)?.str()?;
        let period_ids = prices.column(price::PERIOD_ID)?.str()?;
        let values = prices.column(price::PRICE)?.str()?;
        for i in 0..prices.height() {
            let name = required_cell(names.get(i), files::PRICES, price::PRODUCT, i)?;
            let period_id = required_cell(period_ids.get(i), files::PRICES, price::PERIOD_ID, i)?;
            let value: f64 = parse_cell(values.get(i), files::PRICES, price::PRICE, i)?;
            builder.price(name, period_id, value)?;
        }

        let volumes = read_csv_as_strings(dir, files::VOLUMES)?;
        require_columns(
            &volumes,
            files::VOLUMES,
            &[volume::PRODUCT, volume::PERIOD_ID, volume::VOLUME],
        )?;
        let names = volumes.column(volume::PRODUCT)?.str()?;
        let period_ids = volumes.column(volume::PERIOD_ID)?.str()?;
        let values = volumes.column(volume::VOLUME)?.str()?;
        for i in 0..volumes.height() {
            let name = required_cell(names.get(i), files::VOLUMES, volume::PRODUCT, i)?;
            let period_id = required_cell(period_ids.get(i), files::VOLUMES, volume::PERIOD_ID, i)?;
            let value: f64 = parse_cell(values.get(i), files::VOLUMES, volume::VOLUME, i)?;
            builder.volume(name, period_id, value)?;
        }

        let structures = read_csv_as_strings(dir, files::COST_STRUCTURES)?;
        require_columns(&structures, files::COST_STRUCTURES, &[cost_structure::NAME])?;
        for (i, name) in structures
            .column(cost_structure::NAME)?
            .str()?
            .into_iter()
            .enumerate()
        {
            let name = required_cell(name, files::COST_STRUCTURES, cost_structure::NAME, i)?;
            builder.cost_structure(name);
        }

        let costs = read_csv_as_strings(dir, files::COSTS)?;
        require_columns(
            &costs,
            files::COSTS,
            &[cost::STRUCTURE, cost::AMOUNT, cost::COST_BEHAVIOR],
        )?;
        let structure_names = costs.column(cost::STRUCTURE)?.str()?;
        let amounts = costs.column(cost::AMOUNT)?.str()?;
        let behaviors = costs.column(cost::COST_BEHAVIOR)?.str()?;
        let cost_products = match costs.column(cost::PRODUCT) {
            Ok(column) => Some(column.str()?),
            Err(_) => None,
        };
        let cost_periods = match costs.column(cost::PERIOD_ID) {
            Ok(column) => Some(column.str()?),
            Err(_) => None,
        };
        for i in 0..costs.height() {
            let structure =
                required_cell(structure_names.get(i), files::COSTS, cost::STRUCTURE, i)?;
            let amount: f64 = parse_cell(amounts.get(i), files::COSTS, cost::AMOUNT, i)?;
            let behavior: CostBehavior = behaviors.get(i).unwrap_or("").parse()?;
            let linked_product = cost_products.and_then(|c| optional_cell(c.get(i)));
            let period_id = cost_periods.and_then(|c| optional_cell(c.get(i)));
            builder.cost(structure, linked_product, period_id, amount, behavior)?;
        }

        let store = builder.build();
        info!(
            dir = %dir.display(),
            products = store.product_count(),
            nodes = store.graph.node_count(),
            edges = store.graph.edge_count(),
            "loaded entity graph"
        );
        Ok(store)
    }

    // ── Traversals ──────────────────────────────────────────────────────────

    /// All products in load order.
    ///
    /// Columns: product
    pub fn products_frame(&self) -> MetricsResult<DataFrame> {
        let names: Vec<&str> = self
            .product_order
            .iter()
            .filter_map(|idx| self.product_name(*idx))
            .collect();
        let df = DataFrame::new(vec![Column::new(facts::PRODUCT.into(), &names)])?;
        Ok(df)
    }

    /// Revenue streams and the product each one sells.
    ///
    /// Columns: stream, product
    pub fn streams_frame(&self) -> MetricsResult<DataFrame> {
        let mut streams = Vec::new();
        let mut products = Vec::new();
        for &idx in &self.stream_order {
            let Node::RevenueStream(id) = &self.graph[idx] else {
                continue;
            };
            let sold = self
                .target(idx, Relation::SellsProduct)
                .and_then(|p| self.product_name(p));
            streams.push(id.as_str());
            products.push(sold);
        }
        let df = DataFrame::new(vec![
            Column::new(facts::STREAM.into(), &streams),
            Column::new(facts::PRODUCT.into(), &products),
        ])?;
        Ok(df)
    }

    /// Every (volume, price) pair of the same product recorded in the same
    /// period. Several records for one period pair up as a cross product.
    ///
    /// Columns: product, period_id, year, month, quarter, volume, price
    pub fn revenue_pairs_frame(&self, product_filter: Option<&str>) -> MetricsResult<DataFrame> {
        let mut rows = PeriodRows::default();
        let mut volumes = Vec::new();
        let mut prices = Vec::new();

        for product_idx in self.filtered_products(product_filter) {
            let name = self.product_name(product_idx).unwrap_or_default();
            let priced: Vec<(NodeIndex, f64)> = self
                .sources(product_idx, Relation::PricedForProduct)
                .into_iter()
                .filter_map(|p| match self.graph[p] {
                    Node::Price(value) => self
                        .target(p, Relation::PricedInPeriod)
                        .map(|period_idx| (period_idx, value)),
                    _ => None,
                })
                .collect();

            for volume_idx in self.sources(product_idx, Relation::VolumeForProduct) {
                let Node::Volume(amount) = self.graph[volume_idx] else {
                    continue;
                };
                let Some(period_idx) = self.target(volume_idx, Relation::OccursInPeriod) else {
                    continue;
                };
                for (_, value) in priced.iter().filter(|(p, _)| *p == period_idx) {
                    rows.push(name, self.period(period_idx));
                    volumes.push(amount);
                    prices.push(*value);
                }
            }
        }

        let mut columns = rows.into_columns();
        columns.push(Column::new(facts::VOLUME.into(), &volumes));
        columns.push(Column::new(facts::PRICE.into(), &prices));
        let df = DataFrame::new(columns)?;
        debug!(rows = df.height(), product = ?product_filter, "traversed revenue pairs");
        Ok(df)
    }

    /// Every volume record, whether or not a price exists for its period.
    ///
    /// Columns: product, period_id, year, month, quarter, volume
    pub fn volumes_frame(&self, product_filter: Option<&str>) -> MetricsResult<DataFrame> {
        let mut rows = PeriodRows::default();
        let mut volumes = Vec::new();

        for product_idx in self.filtered_products(product_filter) {
            let name = self.product_name(product_idx).unwrap_or_default();
            for volume_idx in self.sources(product_idx, Relation::VolumeForProduct) {
                let Node::Volume(amount) = self.graph[volume_idx] else {
                    continue;
                };
                let period_idx = self.target(volume_idx, Relation::OccursInPeriod);
                rows.push(name, period_idx.and_then(|p| self.period(p)));
                volumes.push(amount);
            }
        }

        let mut columns = rows.into_columns();
        columns.push(Column::new(facts::VOLUME.into(), &volumes));
        let df = DataFrame::new(columns)?;
        debug!(rows = df.height(), product = ?product_filter, "traversed volumes");
        Ok(df)
    }

    /// Every cost record with its category, optional product link and period.
    ///
    /// Columns: category, product (nullable), behavior, product_linked,
    /// period_id, year, month, quarter (nullable), amount
    pub fn costs_frame(
        &self,
        product_filter: Option<&str>,
        category_filter: Option<&str>,
    ) -> MetricsResult<DataFrame> {
        let mut categories: Vec<&str> = Vec::new();
        let mut products: Vec<Option<&str>> = Vec::new();
        let mut behaviors: Vec<&str> = Vec::new();
        let mut linked: Vec<bool> = Vec::new();
        let mut rows = PeriodRows::default();
        let mut amounts = Vec::new();

        for &cost_idx in &self.cost_order {
            let Node::Cost { amount, behavior } = self.graph[cost_idx] else {
                continue;
            };
            let category = self
                .target(cost_idx, Relation::CostForStructure)
                .and_then(|s| match &self.graph[s] {
                    Node::CostStructure(name) => Some(name.as_str()),
                    _ => None,
                })
                .unwrap_or_default();
            let product_name = self
                .target(cost_idx, Relation::CostForProduct)
                .and_then(|p| self.product_name(p));

            if product_filter.is_some_and(|wanted| product_name != Some(wanted)) {
                continue;
            }
            if category_filter.is_some_and(|wanted| category != wanted) {
                continue;
            }

            categories.push(category);
            products.push(product_name);
            behaviors.push(behavior.as_str());
            linked.push(product_name.is_some());
            let period_idx = self.target(cost_idx, Relation::IncurredInPeriod);
            rows.push_period_only(period_idx.and_then(|p| self.period(p)));
            amounts.push(amount);
        }

        let mut columns = vec![
            Column::new(facts::CATEGORY.into(), &categories),
            Column::new(facts::PRODUCT.into(), &products),
            Column::new(facts::BEHAVIOR.into(), &behaviors),
            Column::new(facts::PRODUCT_LINKED.into(), &linked),
        ];
        columns.extend(rows.into_period_columns());
        columns.push(Column::new(facts::AMOUNT.into(), &amounts));
        let df = DataFrame::new(columns)?;
        debug!(
            rows = df.height(),
            product = ?product_filter,
            category = ?category_filter,
            "traversed costs"
        );
        Ok(df)
    }

    // ── Graph helpers ───────────────────────────────────────────────────────

    fn filtered_products(&self, product_filter: Option<&str>) -> Vec<NodeIndex> {
        match product_filter {
            Some(name) => self.products.get(name).copied().into_iter().collect(),
            None => self.product_order.clone(),
        }
    }

    fn product_name(&self, idx: NodeIndex) -> Option<&str> {
        match &self.graph[idx] {
            Node::Product(name) => Some(name.as_str()),
            _ => None,
        }
    }

    fn period(&self, idx: NodeIndex) -> Option<(&str, &TimePeriod)> {
        match &self.graph[idx] {
            Node::Period { id, period } => Some((id.as_str(), period)),
            _ => None,
        }
    }

    /// First node reached from `node` over an outgoing `relation` edge.
    fn target(&self, node: NodeIndex, relation: Relation) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .find(|e| *e.weight() == relation)
            .map(|e| e.target())
    }

    /// Nodes pointing at `node` over `relation`, in insertion order.
    fn sources(&self, node: NodeIndex, relation: Relation) -> Vec<NodeIndex> {
        let mut found: Vec<NodeIndex> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .filter(|e| *e.weight() == relation)
            .map(|e| e.source())
            .collect();
        found.sort_unstable();
        found
    }
}

/// Accumulates the product + period columns shared by several traversals.
#[derive(Default)]
struct PeriodRows<'a> {
    products: Vec<&'a str>,
    period_ids: Vec<Option<&'a str>>,
    years: Vec<Option<i32>>,
    months: Vec<Option<i32>>,
    quarters: Vec<Option<i32>>,
}

impl<'a> PeriodRows<'a> {
    fn push(&mut self, product: &'a str, period: Option<(&'a str, &'a TimePeriod)>) {
        self.products.push(product);
        self.push_period_only(period);
    }

    fn push_period_only(&mut self, period: Option<(&'a str, &'a TimePeriod)>) {
        self.period_ids.push(period.map(|(id, _)| id));
        self.years.push(period.map(|(_, p)| p.year));
        self.months.push(period.map(|(_, p)| p.month as i32));
        self.quarters.push(period.map(|(_, p)| p.quarter as i32));
    }

    fn into_columns(self) -> Vec<Column> {
        let mut columns = vec![Column::new(facts::PRODUCT.into(), &self.products)];
        columns.extend(self.into_period_columns());
        columns
    }

    fn into_period_columns(self) -> Vec<Column> {
        vec![
            Column::new(facts::PERIOD_ID.into(), &self.period_ids),
            Column::new(facts::YEAR.into(), &self.years),
            Column::new(facts::MONTH.into(), &self.months),
            Column::new(facts::QUARTER.into(), &self.quarters),
        ]
    }
}

/// Incrementally assembles a [`GraphStore`].
///
/// Products and periods must be registered before the records that point at
/// them; cost structures are created on first reference.
#[derive(Debug, Default)]
pub struct GraphStoreBuilder {
    store: GraphStore,
    period_keys: HashMap<(i32, u32), String>,
}

impl GraphStoreBuilder {
    pub fn product(&mut self, name: &str) -> &mut Self {
        let store = &mut self.store;
        if !store.products.contains_key(name) {
            let idx = store.graph.add_node(Node::Product(name.to_string()));
            store.products.insert(name.to_string(), idx);
            store.product_order.push(idx);
        }
        self
    }

    pub fn period(&mut self, id: &str, period: TimePeriod) -> MetricsResult<&mut Self> {
        if self.store.periods.contains_key(id) {
            return Err(MetricsError::InvalidData(format!(
                "Duplicate time period id: {id}"
            )));
        }
        if let Some(existing) = self.period_keys.get(&(period.year, period.month)) {
            return Err(MetricsError::InvalidData(format!(
                "Time periods '{existing}' and '{id}' both cover {}-{:02}",
                period.year, period.month
            )));
        }
        self.period_keys
            .insert((period.year, period.month), id.to_string());
        let idx = self.store.graph.add_node(Node::Period {
            id: id.to_string(),
            period,
        });
        self.store.periods.insert(id.to_string(), idx);
        Ok(self)
    }

    pub fn revenue_stream(&mut self, id: &str, product: &str) -> MetricsResult<&mut Self> {
        let product_idx = self.product_idx(product)?;
        let store = &mut self.store;
        let idx = store.graph.add_node(Node::RevenueStream(id.to_string()));
        store.graph.add_edge(idx, product_idx, Relation::SellsProduct);
        store.stream_order.push(idx);
        Ok(self)
    }

    pub fn price(
        &mut self,
        product: &str,
        period_id: &str,
        value: f64,
    ) -> MetricsResult<&mut Self> {
        let product_idx = self.product_idx(product)?;
        let period_idx = self.period_idx(period_id)?;
        let graph = &mut self.store.graph;
        let idx = graph.add_node(Node::Price(value));
        graph.add_edge(idx, product_idx, Relation::PricedForProduct);
        graph.add_edge(idx, period_idx, Relation::PricedInPeriod);
        Ok(self)
    }

    pub fn volume(
        &mut self,
        product: &str,
        period_id: &str,
        amount: f64,
    ) -> MetricsResult<&mut Self> {
        let product_idx = self.product_idx(product)?;
        let period_idx = self.period_idx(period_id)?;
        let graph = &mut self.store.graph;
        let idx = graph.add_node(Node::Volume(amount));
        graph.add_edge(idx, product_idx, Relation::VolumeForProduct);
        graph.add_edge(idx, period_idx, Relation::OccursInPeriod);
        Ok(self)
    }

    pub fn cost_structure(&mut self, name: &str) -> &mut Self {
        self.structure_idx(name);
        self
    }

    pub fn cost(
        &mut self,
        structure: &str,
        product: Option<&str>,
        period_id: Option<&str>,
        amount: f64,
        behavior: CostBehavior,
    ) -> MetricsResult<&mut Self> {
        let product_idx = product.map(|p| self.product_idx(p)).transpose()?;
        let period_idx = period_id.map(|p| self.period_idx(p)).transpose()?;
        if behavior == CostBehavior::Fixed {
            if let Some(name) = product {
                warn!(
                    structure,
                    product = name,
                    "fixed cost is linked to a product; it will count as product-attributable"
                );
            }
        }

        let structure_idx = self.structure_idx(structure);
        let store = &mut self.store;
        let idx = store.graph.add_node(Node::Cost { amount, behavior });
        store
            .graph
            .add_edge(idx, structure_idx, Relation::CostForStructure);
        if let Some(p) = product_idx {
            store.graph.add_edge(idx, p, Relation::CostForProduct);
        }
        if let Some(p) = period_idx {
            store.graph.add_edge(idx, p, Relation::IncurredInPeriod);
        }
        store.cost_order.push(idx);
        Ok(self)
    }

    pub fn build(self) -> GraphStore {
        self.store
    }

    fn structure_idx(&mut self, name: &str) -> NodeIndex {
        let store = &mut self.store;
        if let Some(idx) = store.structures.get(name) {
            return *idx;
        }
        let idx = store.graph.add_node(Node::CostStructure(name.to_string()));
        store.structures.insert(name.to_string(), idx);
        idx
    }

    fn product_idx(&self, name: &str) -> MetricsResult<NodeIndex> {
        self.store
            .products
            .get(name)
            .copied()
            .ok_or_else(|| MetricsError::InvalidData(format!("Unknown product: {name}")))
    }

    fn period_idx(&self, id: &str) -> MetricsResult<NodeIndex> {
        self.store
            .periods
            .get(id)
            .copied()
            .ok_or_else(|| MetricsError::InvalidData(format!("Unknown time period: {id}")))
    }
}

// ── CSV helpers ─────────────────────────────────────────────────────────────

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
fn read_csv_as_strings(dir: &Path, filename: &str) -> MetricsResult<DataFrame> {
    let path = dir.join(filename);
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}

fn require_columns(df: &DataFrame, filename: &str, required: &[&str]) -> MetricsResult<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(MetricsError::MissingColumn(format!("{filename}: {col_name}")));
        }
    }
    Ok(())
}

fn optional_cell(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|s| !s.is_empty())
}

fn required_cell<'a>(
    cell: Option<&'a str>,
    filename: &str,
    column: &str,
    row: usize,
) -> MetricsResult<&'a str> {
    optional_cell(cell).ok_or_else(|| {
        MetricsError::InvalidData(format!("{filename}: empty '{column}' at row {row}"))
    })
}

fn parse_cell<T: std::str::FromStr>(
    cell: Option<&str>,
    filename: &str,
    column: &str,
    row: usize,
) -> MetricsResult<T> {
    let raw = required_cell(cell, filename, column, row)?;
    raw.parse().map_err(|_| {
        MetricsError::InvalidData(format!(
            "{filename}: cannot parse '{raw}' in '{column}' at row {row}"
        ))
    })
}
