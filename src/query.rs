//! Operation catalog over the entity graph.
//!
//! Each operation issues one or more traversals against a [`GraphSource`] and
//! aggregates the returned row sets with polars. Transport failures surface as
//! errors; an empty result is never an error and maps to 0.0 or an empty list.

use std::collections::{BTreeSet, HashMap};

use polars::prelude::*;
use tracing::error;

use crate::derived::{coalesce, safe_ratio};
use crate::error::{MetricsError, MetricsResult};
use crate::model::CostBehavior;
use crate::records::{
    CategoryCost, CategoryCostTotal, CostPoint, CostTotalsByBehavior, ProductMetrics,
    ProductMonthlyPerformance, QuarterlyCost, QuarterlyRevenue, RevenuePoint,
    RevenueStreamRecord,
};
use crate::schema::{behavior, facts};
use crate::source::{GraphSource, Traversal};

const VARIABLE_SIGNALS: &str = "variable_signals";

/// Optional restriction of cost queries. `None` means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostFilter {
    pub product: Option<String>,
    pub category: Option<String>,
}

impl CostFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// A present but blank filter is a malformed request.
    fn validate(&self) -> MetricsResult<()> {
        if let Some(product) = &self.product {
            require_name("product", product)?;
        }
        if let Some(category) = &self.category {
            require_name("category", category)?;
        }
        Ok(())
    }

    fn traversal(&self) -> Traversal {
        Traversal::Costs {
            product: self.product.clone(),
            category: self.category.clone(),
        }
    }
}

/// Read-only metrics over a data source.
///
/// Holds no cache: every call reaches the source, so a lost connection is
/// reported on every call instead of serving stale values.
pub struct MetricsService<S> {
    source: S,
}

impl<S: GraphSource> MetricsService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // ── Revenue ─────────────────────────────────────────────────────────────

    pub fn product_count(&self) -> MetricsResult<usize> {
        Ok(self.fetch(&Traversal::Products)?.height())
    }

    pub fn revenue_streams(&self) -> MetricsResult<Vec<RevenueStreamRecord>> {
        let df = self.fetch(&Traversal::RevenueStreams)?;
        let streams = string_values(&df, facts::STREAM)?;
        let products = string_values(&df, facts::PRODUCT)?;
        Ok(streams
            .into_iter()
            .zip(products)
            .map(|(stream, product)| RevenueStreamRecord {
                stream: stream.unwrap_or_default(),
                product,
            })
            .collect())
    }

    /// Σ(volume × price) over every product/period pair.
    pub fn total_revenue(&self) -> MetricsResult<f64> {
        let df = self.revenue_pairs(None)?.collect()?;
        column_sum(&df, facts::REVENUE)
    }

    /// Σ(volume) over every volume record, priced or not.
    pub fn total_volume(&self) -> MetricsResult<f64> {
        let df = self.fetch(&Traversal::Volumes { product: None })?;
        column_sum(&df, facts::VOLUME)
    }

    /// Mean over recorded periods of the revenue within each period.
    pub fn average_monthly_revenue(&self) -> MetricsResult<f64> {
        let df = self
            .revenue_pairs(None)?
            .group_by_stable([col(facts::PERIOD_ID)])
            .agg([col(facts::REVENUE).sum()])
            .collect()?;
        let total = column_sum(&df, facts::REVENUE)?;
        Ok(coalesce(safe_ratio(total, df.height() as f64)))
    }

    /// Total revenue divided by total volume; 0.0 without volume.
    pub fn average_price_per_kg(&self) -> MetricsResult<f64> {
        let revenue = self.total_revenue()?;
        let volume = self.total_volume()?;
        Ok(coalesce(safe_ratio(revenue, volume)))
    }

    /// Per-product totals, highest revenue first. Products without any data
    /// are listed with zeros; ties keep load order.
    pub fn product_metrics(&self) -> MetricsResult<Vec<ProductMetrics>> {
        let products = string_values(&self.fetch(&Traversal::Products)?, facts::PRODUCT)?;

        let revenue = self
            .revenue_pairs(None)?
            .group_by_stable([col(facts::PRODUCT)])
            .agg([col(facts::REVENUE).sum()])
            .collect()?;
        let volume = self
            .fetch(&Traversal::Volumes { product: None })?
            .lazy()
            .group_by_stable([col(facts::PRODUCT)])
            .agg([col(facts::VOLUME).sum()])
            .collect()?;

        let revenue_by_product = keyed_sums(&revenue, facts::PRODUCT, facts::REVENUE)?;
        let volume_by_product = keyed_sums(&volume, facts::PRODUCT, facts::VOLUME)?;

        let mut metrics: Vec<ProductMetrics> = products
            .into_iter()
            .flatten()
            .map(|product| {
                let total_revenue = revenue_by_product.get(&product).copied().unwrap_or(0.0);
                let total_volume = volume_by_product.get(&product).copied().unwrap_or(0.0);
                ProductMetrics {
                    avg_price: coalesce(safe_ratio(total_revenue, total_volume)),
                    product,
                    total_revenue,
                    total_volume,
                }
            })
            .collect();
        metrics.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue));
        Ok(metrics)
    }

    /// Totals for one product through the product-filtered traversals.
    /// `None` when no such product is loaded.
    pub fn product_metrics_for(&self, product: &str) -> MetricsResult<Option<ProductMetrics>> {
        require_name("product", product)?;
        let known = string_values(&self.fetch(&Traversal::Products)?, facts::PRODUCT)?
            .into_iter()
            .flatten()
            .any(|name| name == product);
        if !known {
            return Ok(None);
        }

        let revenue = self.revenue_pairs(Some(product))?.collect()?;
        let volume = self.fetch(&Traversal::Volumes {
            product: Some(product.to_string()),
        })?;
        let total_revenue = column_sum(&revenue, facts::REVENUE)?;
        let total_volume = column_sum(&volume, facts::VOLUME)?;
        Ok(Some(ProductMetrics {
            product: product.to_string(),
            total_revenue,
            total_volume,
            avg_price: coalesce(safe_ratio(total_revenue, total_volume)),
        }))
    }

    /// Polars view of [`Self::revenue_timeseries`].
    pub fn revenue_timeseries_frame(&self) -> MetricsResult<DataFrame> {
        let df = self
            .revenue_pairs(None)?
            .group_by_stable([col(facts::PRODUCT), col(facts::YEAR), col(facts::MONTH)])
            .agg([col(facts::REVENUE).sum()])
            .sort_by_exprs(
                [col(facts::YEAR), col(facts::MONTH), col(facts::PRODUCT)],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        Ok(df)
    }

    /// Monthly revenue per product, chronological then by product.
    pub fn revenue_timeseries(&self) -> MetricsResult<Vec<RevenuePoint>> {
        let df = self.revenue_timeseries_frame()?;
        let products = string_values(&df, facts::PRODUCT)?;
        let years = int_values(&df, facts::YEAR)?;
        let months = int_values(&df, facts::MONTH)?;
        let revenue = float_values(&df, facts::REVENUE)?;
        Ok((0..df.height())
            .map(|i| RevenuePoint {
                product: products[i].clone().unwrap_or_default(),
                year: years[i],
                month: months[i] as u32,
                revenue: revenue[i],
            })
            .collect())
    }

    /// Polars view of [`Self::quarterly_revenue`].
    pub fn quarterly_revenue_frame(&self) -> MetricsResult<DataFrame> {
        let df = self
            .revenue_pairs(None)?
            .group_by_stable([col(facts::PRODUCT), col(facts::YEAR), col(facts::QUARTER)])
            .agg([col(facts::REVENUE).sum()])
            .sort_by_exprs(
                [col(facts::YEAR), col(facts::QUARTER), col(facts::PRODUCT)],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        Ok(df)
    }

    pub fn quarterly_revenue(&self) -> MetricsResult<Vec<QuarterlyRevenue>> {
        let df = self.quarterly_revenue_frame()?;
        let products = string_values(&df, facts::PRODUCT)?;
        let years = int_values(&df, facts::YEAR)?;
        let quarters = int_values(&df, facts::QUARTER)?;
        let revenue = float_values(&df, facts::REVENUE)?;
        Ok((0..df.height())
            .map(|i| QuarterlyRevenue {
                product: products[i].clone().unwrap_or_default(),
                year: years[i],
                quarter: quarters[i].max(0) as u32,
                revenue: revenue[i],
            })
            .collect())
    }

    /// Polars view of [`Self::product_monthly_performance`].
    pub fn product_monthly_performance_frame(&self) -> MetricsResult<DataFrame> {
        let df = self
            .revenue_pairs(None)?
            .group_by_stable([col(facts::PRODUCT), col(facts::YEAR), col(facts::MONTH)])
            .agg([col(facts::REVENUE).sum(), col(facts::VOLUME).sum()])
            .sort_by_exprs(
                [col(facts::YEAR), col(facts::MONTH), col(facts::PRODUCT)],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        Ok(df)
    }

    pub fn product_monthly_performance(&self) -> MetricsResult<Vec<ProductMonthlyPerformance>> {
        let df = self.product_monthly_performance_frame()?;
        let products = string_values(&df, facts::PRODUCT)?;
        let years = int_values(&df, facts::YEAR)?;
        let months = int_values(&df, facts::MONTH)?;
        let revenue = float_values(&df, facts::REVENUE)?;
        let volume = float_values(&df, facts::VOLUME)?;
        Ok((0..df.height())
            .map(|i| ProductMonthlyPerformance {
                product: products[i].clone().unwrap_or_default(),
                year: years[i],
                month: months[i] as u32,
                revenue: revenue[i],
                volume: volume[i],
            })
            .collect())
    }

    // ── Costs ───────────────────────────────────────────────────────────────

    pub fn total_costs(&self) -> MetricsResult<f64> {
        let df = self.costs(&CostFilter::all())?.collect()?;
        column_sum(&df, facts::AMOUNT)
    }

    /// Σ(amount) of costs linked to a product.
    pub fn variable_costs(&self) -> MetricsResult<f64> {
        let df = self
            .costs(&CostFilter::all())?
            .filter(col(facts::PRODUCT_LINKED))
            .collect()?;
        column_sum(&df, facts::AMOUNT)
    }

    /// Σ(amount) of costs not linked to any product.
    pub fn fixed_costs(&self) -> MetricsResult<f64> {
        let df = self
            .costs(&CostFilter::all())?
            .filter(col(facts::PRODUCT_LINKED).not())
            .collect()?;
        column_sum(&df, facts::AMOUNT)
    }

    /// Σ(amount) split by the recorded cost behavior.
    pub fn cost_totals_by_behavior(&self) -> MetricsResult<CostTotalsByBehavior> {
        let df = self
            .costs(&CostFilter::all())?
            .group_by_stable([col(facts::BEHAVIOR)])
            .agg([col(facts::AMOUNT).sum()])
            .collect()?;
        let sums = keyed_sums(&df, facts::BEHAVIOR, facts::AMOUNT)?;
        Ok(CostTotalsByBehavior {
            variable: sums.get(behavior::VARIABLE).copied().unwrap_or(0.0),
            fixed: sums.get(behavior::FIXED).copied().unwrap_or(0.0),
        })
    }

    /// Polars view of [`Self::cost_timeseries`].
    pub fn cost_timeseries_frame(&self, filter: &CostFilter) -> MetricsResult<DataFrame> {
        let lf = self.costs(filter)?;
        monthly_costs(lf)
    }

    /// Monthly cost by product and category, optionally filtered.
    pub fn cost_timeseries(&self, filter: &CostFilter) -> MetricsResult<Vec<CostPoint>> {
        decode_cost_points(&self.cost_timeseries_frame(filter)?)
    }

    /// Polars view of [`Self::quarterly_costs`].
    pub fn quarterly_costs_frame(&self, filter: &CostFilter) -> MetricsResult<DataFrame> {
        let df = self
            .costs(filter)?
            .filter(col(facts::YEAR).is_not_null())
            .group_by_stable([
                col(facts::PRODUCT),
                col(facts::CATEGORY),
                col(facts::YEAR),
                col(facts::QUARTER),
            ])
            .agg([col(facts::AMOUNT).sum().alias(facts::COST)])
            .sort_by_exprs(
                [
                    col(facts::YEAR),
                    col(facts::QUARTER),
                    col(facts::PRODUCT),
                    col(facts::CATEGORY),
                ],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        Ok(df)
    }

    pub fn quarterly_costs(&self, filter: &CostFilter) -> MetricsResult<Vec<QuarterlyCost>> {
        let df = self.quarterly_costs_frame(filter)?;
        let products = string_values(&df, facts::PRODUCT)?;
        let categories = string_values(&df, facts::CATEGORY)?;
        let years = int_values(&df, facts::YEAR)?;
        let quarters = int_values(&df, facts::QUARTER)?;
        let costs = float_values(&df, facts::COST)?;
        Ok((0..df.height())
            .map(|i| QuarterlyCost {
                product: products[i].clone(),
                category: categories[i].clone().unwrap_or_default(),
                year: years[i],
                quarter: quarters[i].max(0) as u32,
                cost: costs[i],
            })
            .collect())
    }

    pub fn variable_cost_timeseries_frame(&self) -> MetricsResult<DataFrame> {
        let lf = self
            .costs(&CostFilter::all())?
            .filter(col(facts::PRODUCT_LINKED));
        monthly_costs(lf)
    }

    /// Monthly product-linked cost by product and category.
    pub fn variable_cost_timeseries(&self) -> MetricsResult<Vec<CostPoint>> {
        decode_cost_points(&self.variable_cost_timeseries_frame()?)
    }

    pub fn fixed_cost_timeseries_frame(&self) -> MetricsResult<DataFrame> {
        let lf = self
            .costs(&CostFilter::all())?
            .filter(col(facts::PRODUCT_LINKED).not());
        monthly_costs(lf)
    }

    /// Monthly overhead by category.
    pub fn fixed_cost_timeseries(&self) -> MetricsResult<Vec<CostPoint>> {
        decode_cost_points(&self.fixed_cost_timeseries_frame()?)
    }

    /// Names of cost structures with at least one cost record, sorted.
    pub fn cost_categories(&self) -> MetricsResult<Vec<String>> {
        let df = self.fetch(&CostFilter::all().traversal())?;
        let names: BTreeSet<String> = string_values(&df, facts::CATEGORY)?
            .into_iter()
            .flatten()
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Cost per category for one product, largest first.
    pub fn product_costs(&self, product: &str) -> MetricsResult<Vec<CategoryCost>> {
        let df = self
            .costs(&CostFilter::all().with_product(product))?
            .group_by_stable([col(facts::CATEGORY)])
            .agg([col(facts::AMOUNT).sum().alias(facts::COST)])
            .sort_by_exprs(
                [col(facts::COST)],
                SortMultipleOptions::default()
                    .with_order_descending(true)
                    .with_maintain_order(true),
            )
            .collect()?;
        let categories = string_values(&df, facts::CATEGORY)?;
        let costs = float_values(&df, facts::COST)?;
        Ok(categories
            .into_iter()
            .zip(costs)
            .map(|(category, cost)| CategoryCost {
                category: category.unwrap_or_default(),
                cost,
            })
            .collect())
    }

    /// Σ(amount) of variable costs linked to `product`.
    pub fn product_variable_cost(&self, product: &str) -> MetricsResult<f64> {
        let df = self
            .costs(&CostFilter::all().with_product(product))?
            .filter(
                col(facts::PRODUCT_LINKED)
                    .and(col(facts::BEHAVIOR).eq(lit(CostBehavior::Variable.as_str()))),
            )
            .collect()?;
        column_sum(&df, facts::AMOUNT)
    }

    /// Product-linked cost divided by volume, counting only product/period
    /// combinations that have both.
    pub fn average_cost_per_kg(&self) -> MetricsResult<f64> {
        let keys = [col(facts::PRODUCT), col(facts::PERIOD_ID)];
        let costs = self
            .costs(&CostFilter::all())?
            .filter(col(facts::PRODUCT_LINKED))
            .group_by_stable(keys.clone())
            .agg([col(facts::AMOUNT).sum().alias(facts::COST)]);
        let volumes = self
            .fetch(&Traversal::Volumes { product: None })?
            .lazy()
            .group_by_stable(keys.clone())
            .agg([col(facts::VOLUME).sum()]);
        let df = costs
            .join(volumes, keys.clone(), keys, JoinArgs::new(JoinType::Inner))
            .collect()?;
        let cost = column_sum(&df, facts::COST)?;
        let volume = column_sum(&df, facts::VOLUME)?;
        Ok(coalesce(safe_ratio(cost, volume)))
    }

    /// Total per category, largest first. A category counts as variable when
    /// any of its records is linked to a product or marked variable.
    pub fn cost_totals_by_category(&self) -> MetricsResult<Vec<CategoryCostTotal>> {
        let variable_signal = col(facts::PRODUCT_LINKED)
            .or(col(facts::BEHAVIOR).eq(lit(CostBehavior::Variable.as_str())))
            .cast(DataType::Int32);
        let df = self
            .costs(&CostFilter::all())?
            .group_by_stable([col(facts::CATEGORY)])
            .agg([
                col(facts::AMOUNT).sum().alias(facts::COST),
                variable_signal.sum().alias(VARIABLE_SIGNALS),
            ])
            .sort_by_exprs(
                [col(facts::COST)],
                SortMultipleOptions::default()
                    .with_order_descending(true)
                    .with_maintain_order(true),
            )
            .collect()?;
        let categories = string_values(&df, facts::CATEGORY)?;
        let totals = float_values(&df, facts::COST)?;
        let signals = int_values(&df, VARIABLE_SIGNALS)?;
        Ok((0..df.height())
            .map(|i| CategoryCostTotal {
                category: categories[i].clone().unwrap_or_default(),
                total_cost: totals[i],
                behavior: if signals[i] > 0 {
                    CostBehavior::Variable
                } else {
                    CostBehavior::Fixed
                },
            })
            .collect())
    }

    // ── Private helpers ─────────────────────────────────────────────────────

    fn fetch(&self, traversal: &Traversal) -> MetricsResult<DataFrame> {
        self.source.run(traversal).inspect_err(|err| {
            error!(traversal = ?traversal, error = %err, "metrics traversal failed");
        })
    }

    /// Revenue pairs with a `revenue` column added.
    fn revenue_pairs(&self, product: Option<&str>) -> MetricsResult<LazyFrame> {
        let df = self.fetch(&Traversal::RevenuePairs {
            product: product.map(str::to_string),
        })?;
        Ok(df
            .lazy()
            .with_column((col(facts::VOLUME) * col(facts::PRICE)).alias(facts::REVENUE)))
    }

    fn costs(&self, filter: &CostFilter) -> MetricsResult<LazyFrame> {
        filter.validate()?;
        Ok(self.fetch(&filter.traversal())?.lazy())
    }
}

fn require_name(label: &str, value: &str) -> MetricsResult<()> {
    if value.trim().is_empty() {
        return Err(MetricsError::Query(format!("{label} filter must not be blank")));
    }
    Ok(())
}

/// Costs with a period, grouped by (product, category, year, month).
fn monthly_costs(lf: LazyFrame) -> MetricsResult<DataFrame> {
    let df = lf
        .filter(col(facts::YEAR).is_not_null())
        .group_by_stable([
            col(facts::PRODUCT),
            col(facts::CATEGORY),
            col(facts::YEAR),
            col(facts::MONTH),
        ])
        .agg([col(facts::AMOUNT).sum().alias(facts::COST)])
        .sort_by_exprs(
            [
                col(facts::YEAR),
                col(facts::MONTH),
                col(facts::PRODUCT),
                col(facts::CATEGORY),
            ],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    Ok(df)
}

fn decode_cost_points(df: &DataFrame) -> MetricsResult<Vec<CostPoint>> {
    let products = string_values(df, facts::PRODUCT)?;
    let categories = string_values(df, facts::CATEGORY)?;
    let years = int_values(df, facts::YEAR)?;
    let months = int_values(df, facts::MONTH)?;
    let costs = float_values(df, facts::COST)?;
    Ok((0..df.height())
        .map(|i| CostPoint {
            product: products[i].clone(),
            category: categories[i].clone().unwrap_or_default(),
            year: years[i],
            month: months[i] as u32,
            cost: costs[i],
        })
        .collect())
}

// ── Frame decoding ──────────────────────────────────────────────────────────

/// Sum of a numeric column; nulls and empty frames count as 0.0.
fn column_sum(df: &DataFrame, column: &str) -> MetricsResult<f64> {
    let s = df.column(column)?.as_materialized_series();
    let val = s.sum_reduce()?;
    Ok(val.value().try_extract::<f64>().unwrap_or(0.0))
}

fn string_values(df: &DataFrame, column: &str) -> MetricsResult<Vec<Option<String>>> {
    let values = df.column(column)?.str()?;
    Ok(values
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

fn float_values(df: &DataFrame, column: &str) -> MetricsResult<Vec<f64>> {
    let casted = df.column(column)?.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}

fn int_values(df: &DataFrame, column: &str) -> MetricsResult<Vec<i32>> {
    let casted = df.column(column)?.cast(&DataType::Int32)?;
    Ok(casted.i32()?.into_iter().map(|v| v.unwrap_or(0)).collect())
}

/// Map a string key column to the summed value column next to it.
fn keyed_sums(df: &DataFrame, key: &str, value: &str) -> MetricsResult<HashMap<String, f64>> {
    let keys = string_values(df, key)?;
    let values = float_values(df, value)?;
    Ok(keys
        .into_iter()
        .zip(values)
        .filter_map(|(k, v)| k.map(|k| (k, v)))
        .collect())
}
