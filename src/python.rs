use std::collections::HashMap;
use std::path::PathBuf;

use polars::prelude::*;
use pyo3::exceptions::{PyConnectionError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::MetricsConfig;
use crate::derived::{
    profitability_waterfall, CostOverview, PerformanceSummary, ProductCostSummary,
    ProductPerformanceRow, SliceRow,
};
use crate::error::{ErrorKind, MetricsError, MetricsResult};
use crate::logging;
use crate::query::{CostFilter, MetricsService};
use crate::records::{CategoryCost, CategoryCostTotal, ProductMetrics};
use crate::report::ExecutiveSummary;
use crate::schema::{behavior, facts};
use crate::source::GraphConnection;

impl From<MetricsError> for PyErr {
    fn from(err: MetricsError) -> PyErr {
        match err.kind() {
            ErrorKind::Connection => PyConnectionError::new_err(err.to_string()),
            ErrorKind::Query => PyValueError::new_err(err.to_string()),
            ErrorKind::Data => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

#[pyclass]
pub struct MetricsEngine {
    service: MetricsService<GraphConnection>,
    config: MetricsConfig,
}

impl MetricsEngine {
    fn open(config: MetricsConfig) -> Self {
        logging::init(None);
        let connection = GraphConnection::open(&config);
        Self {
            service: MetricsService::new(connection),
            config,
        }
    }
}

#[pymethods]
impl MetricsEngine {
    #[new]
    #[pyo3(signature = (data_dir, database=None))]
    fn new(data_dir: String, database: Option<String>) -> PyResult<Self> {
        let mut config = MetricsConfig {
            data_dir: PathBuf::from(data_dir),
            ..MetricsConfig::default()
        };
        if let Some(name) = database {
            config.database = name;
        }
        config.validate()?;
        Ok(Self::open(config))
    }

    /// Open using defaults plus GOLDENBERRY_DATA_DIR / GOLDENBERRY_DATABASE.
    #[staticmethod]
    fn from_env() -> PyResult<Self> {
        Ok(Self::open(MetricsConfig::from_env()?))
    }

    /// Open using a TOML config file.
    #[staticmethod]
    fn from_config(path: String) -> PyResult<Self> {
        Ok(Self::open(MetricsConfig::load(&PathBuf::from(path))?))
    }

    // ── Connection ──────────────────────────────────────────────────────────

    fn is_connected(&self) -> bool {
        self.service.source().is_connected()
    }

    fn error_message(&self) -> Option<String> {
        self.service.source().status().error_message
    }

    // ── Revenue ─────────────────────────────────────────────────────────────

    fn product_count(&self) -> PyResult<usize> {
        Ok(self.service.product_count()?)
    }

    fn revenue_streams(&self) -> PyResult<Vec<(String, Option<String>)>> {
        Ok(self
            .service
            .revenue_streams()?
            .into_iter()
            .map(|r| (r.stream, r.product))
            .collect())
    }

    fn total_revenue(&self) -> PyResult<f64> {
        Ok(self.service.total_revenue()?)
    }

    fn total_volume(&self) -> PyResult<f64> {
        Ok(self.service.total_volume()?)
    }

    fn average_monthly_revenue(&self) -> PyResult<f64> {
        Ok(self.service.average_monthly_revenue()?)
    }

    fn average_price_per_kg(&self) -> PyResult<f64> {
        Ok(self.service.average_price_per_kg()?)
    }

    fn product_metrics(&self) -> PyResult<PyDataFrame> {
        let df = product_metrics_frame(&self.service.product_metrics()?)?;
        Ok(PyDataFrame(df))
    }

    fn revenue_timeseries(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.service.revenue_timeseries_frame()?))
    }

    fn quarterly_revenue(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.service.quarterly_revenue_frame()?))
    }

    fn product_monthly_performance(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.service.product_monthly_performance_frame()?))
    }

    // ── Costs ───────────────────────────────────────────────────────────────

    fn total_costs(&self) -> PyResult<f64> {
        Ok(self.service.total_costs()?)
    }

    fn variable_costs(&self) -> PyResult<f64> {
        Ok(self.service.variable_costs()?)
    }

    fn fixed_costs(&self) -> PyResult<f64> {
        Ok(self.service.fixed_costs()?)
    }

    #[pyo3(signature = (product=None, category=None))]
    fn cost_timeseries(
        &self,
        product: Option<String>,
        category: Option<String>,
    ) -> PyResult<PyDataFrame> {
        let filter = CostFilter { product, category };
        Ok(PyDataFrame(self.service.cost_timeseries_frame(&filter)?))
    }

    #[pyo3(signature = (product=None, category=None))]
    fn quarterly_costs(
        &self,
        product: Option<String>,
        category: Option<String>,
    ) -> PyResult<PyDataFrame> {
        let filter = CostFilter { product, category };
        Ok(PyDataFrame(self.service.quarterly_costs_frame(&filter)?))
    }

    fn variable_cost_timeseries(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.service.variable_cost_timeseries_frame()?))
    }

    fn fixed_cost_timeseries(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.service.fixed_cost_timeseries_frame()?))
    }

    fn cost_categories(&self) -> PyResult<Vec<String>> {
        Ok(self.service.cost_categories()?)
    }

    fn product_costs(&self, product: &str) -> PyResult<PyDataFrame> {
        let df = category_costs_frame(&self.service.product_costs(product)?)?;
        Ok(PyDataFrame(df))
    }

    fn product_variable_cost(&self, product: &str) -> PyResult<f64> {
        Ok(self.service.product_variable_cost(product)?)
    }

    fn average_cost_per_kg(&self) -> PyResult<f64> {
        Ok(self.service.average_cost_per_kg()?)
    }

    fn cost_totals_by_behavior(&self) -> PyResult<HashMap<String, f64>> {
        let totals = self.service.cost_totals_by_behavior()?;
        Ok(HashMap::from([
            (behavior::VARIABLE.to_string(), totals.variable),
            (behavior::FIXED.to_string(), totals.fixed),
        ]))
    }

    fn cost_totals_by_category(&self) -> PyResult<PyDataFrame> {
        let df = category_totals_frame(&self.service.cost_totals_by_category()?)?;
        Ok(PyDataFrame(df))
    }

    // ── Derived ─────────────────────────────────────────────────────────────

    fn break_even_coverage(&self) -> PyResult<Option<f64>> {
        let perf = self.service.business_performance()?;
        Ok(perf.summary.and_then(|s| s.break_even))
    }

    /// Share of total cost per category after folding small ones into
    /// "Other Costs", as (category, total_cost, share_pct, details) tuples.
    /// Details list each folded category as (category, share_pct, total_cost).
    fn cost_distribution(&self) -> PyResult<Vec<SliceRow>> {
        Ok(self.service.cost_distribution(&self.config)?.into_rows())
    }

    // ── Pages ───────────────────────────────────────────────────────────────

    fn executive_summary(&self) -> PyResult<ExecutiveSummary> {
        Ok(self.service.executive_summary()?)
    }

    fn cost_overview(&self) -> PyResult<CostOverview> {
        Ok(self.service.cost_overview()?)
    }

    /// (summary, per-product rows). The summary is `None` without products.
    fn business_performance(
        &self,
    ) -> PyResult<(Option<PerformanceSummary>, Vec<ProductPerformanceRow>)> {
        let perf = self.service.business_performance()?;
        Ok((perf.summary, perf.products))
    }

    fn product_cost_summary(&self, product: &str) -> PyResult<Option<ProductCostSummary>> {
        Ok(self.service.product_cost_summary(product, &self.config)?)
    }

    /// (label, value, measure) steps from revenue down to net profit.
    fn profitability_waterfall(&self, product: &str) -> PyResult<Vec<(String, f64, String)>> {
        let Some(summary) = self.service.product_cost_summary(product, &self.config)? else {
            return Ok(Vec::new());
        };
        Ok(profitability_waterfall(&summary)
            .into_iter()
            .map(|step| {
                (
                    step.label.to_string(),
                    step.value,
                    step.measure.as_str().to_string(),
                )
            })
            .collect())
    }
}

fn product_metrics_frame(rows: &[ProductMetrics]) -> MetricsResult<DataFrame> {
    let names: Vec<&str> = rows.iter().map(|r| r.product.as_str()).collect();
    let revenue: Vec<f64> = rows.iter().map(|r| r.total_revenue).collect();
    let volume: Vec<f64> = rows.iter().map(|r| r.total_volume).collect();
    let price: Vec<f64> = rows.iter().map(|r| r.avg_price).collect();
    let df = DataFrame::new(vec![
        Column::new("Product".into(), &names),
        Column::new("TotalRevenue".into(), &revenue),
        Column::new("TotalVolume".into(), &volume),
        Column::new("AvgPrice".into(), &price),
    ])?;
    Ok(df)
}

fn category_costs_frame(rows: &[CategoryCost]) -> MetricsResult<DataFrame> {
    let categories: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
    let costs: Vec<f64> = rows.iter().map(|r| r.cost).collect();
    let df = DataFrame::new(vec![
        Column::new(facts::CATEGORY.into(), &categories),
        Column::new(facts::COST.into(), &costs),
    ])?;
    Ok(df)
}

fn category_totals_frame(rows: &[CategoryCostTotal]) -> MetricsResult<DataFrame> {
    let categories: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
    let totals: Vec<f64> = rows.iter().map(|r| r.total_cost).collect();
    let behaviors: Vec<&str> = rows.iter().map(|r| r.behavior.as_str()).collect();
    let df = DataFrame::new(vec![
        Column::new(facts::CATEGORY.into(), &categories),
        Column::new("total_cost".into(), &totals),
        Column::new(facts::BEHAVIOR.into(), &behaviors),
    ])?;
    Ok(df)
}

/// Export frame column names as a Python submodule.
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let columns = PyModule::new(m.py(), "facts")?;
    columns.add("PRODUCT", facts::PRODUCT)?;
    columns.add("STREAM", facts::STREAM)?;
    columns.add("PERIOD_ID", facts::PERIOD_ID)?;
    columns.add("YEAR", facts::YEAR)?;
    columns.add("MONTH", facts::MONTH)?;
    columns.add("QUARTER", facts::QUARTER)?;
    columns.add("VOLUME", facts::VOLUME)?;
    columns.add("PRICE", facts::PRICE)?;
    columns.add("REVENUE", facts::REVENUE)?;
    columns.add("CATEGORY", facts::CATEGORY)?;
    columns.add("BEHAVIOR", facts::BEHAVIOR)?;
    columns.add("COST", facts::COST)?;
    m.add_submodule(&columns)?;

    let behaviors = PyModule::new(m.py(), "behavior")?;
    behaviors.add("VARIABLE", behavior::VARIABLE)?;
    behaviors.add("FIXED", behavior::FIXED)?;
    m.add_submodule(&behaviors)?;

    Ok(())
}

#[pymodule]
fn goldenberry_metrics(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<MetricsEngine>()?;
    m.add_class::<ExecutiveSummary>()?;
    m.add_class::<CostOverview>()?;
    m.add_class::<PerformanceSummary>()?;
    m.add_class::<ProductPerformanceRow>()?;
    m.add_class::<ProductCostSummary>()?;
    add_schema_exports(m)?;
    Ok(())
}
