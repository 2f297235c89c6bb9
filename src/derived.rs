//! Business metrics combined from already aggregated values.
//!
//! Everything here is a pure function of its inputs. A zero denominator never
//! divides: ratios come back as `None` and callers decide how to show them.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::CostBehavior;
use crate::records::{CategoryCostTotal, ProductMetrics};

pub const OTHER_COSTS: &str = "Other Costs";
pub const TOTAL_ROW: &str = "TOTAL";

/// `numerator / denominator`, or `None` when the denominator is zero or the
/// result is not finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let ratio = numerator / denominator;
    ratio.is_finite().then_some(ratio)
}

/// Render an undefined value as 0.0.
pub fn coalesce(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

/// `numerator / denominator × 100`, `None` on a zero denominator.
pub fn percent(numerator: f64, denominator: f64) -> Option<f64> {
    safe_ratio(numerator, denominator).map(|r| r * 100.0)
}

pub fn gross_margin_pct(revenue: f64, variable_cost: f64) -> Option<f64> {
    percent(revenue - variable_cost, revenue)
}

/// Revenue-weighted slice of the fixed cost pool.
pub fn allocated_fixed_cost(fixed_total: f64, product_revenue: f64, total_revenue: f64) -> f64 {
    fixed_total * coalesce(safe_ratio(product_revenue, total_revenue))
}

pub fn net_profit(gross_profit: f64, allocated_fixed: f64) -> f64 {
    gross_profit - allocated_fixed
}

pub fn net_margin_pct(net_profit: f64, revenue: f64) -> Option<f64> {
    percent(net_profit, revenue)
}

/// Total revenue over total costs; above 1.0 means the business is profitable.
pub fn break_even_coverage(total_revenue: f64, total_costs: f64) -> Option<f64> {
    safe_ratio(total_revenue, total_costs)
}

/// Share of all revenue earned by one product, clamped to 0..=100.
pub fn revenue_share_pct(product_revenue: f64, total_revenue: f64) -> f64 {
    coalesce(percent(product_revenue, total_revenue)).clamp(0.0, 100.0)
}

// ── Cost distribution ───────────────────────────────────────────────────────

/// A category folded into "Other Costs".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherCostDetail {
    pub category: String,
    pub share_pct: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSlice {
    pub category: String,
    pub total_cost: f64,
    pub behavior: CostBehavior,
    pub share_pct: f64,
    /// Only populated on the "Other Costs" slice.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<OtherCostDetail>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CostDistribution {
    pub total_cost: f64,
    pub slices: Vec<CostSlice>,
}

impl CostDistribution {
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn other(&self) -> Option<&CostSlice> {
        self.slices.iter().find(|s| s.category == OTHER_COSTS)
    }

    /// Flatten to `(category, total_cost, share_pct, details)` rows, each
    /// detail as `(category, share_pct, total_cost)`.
    pub fn into_rows(self) -> Vec<SliceRow> {
        self.slices
            .into_iter()
            .map(|s| {
                let details = s
                    .details
                    .into_iter()
                    .map(|d| (d.category, d.share_pct, d.total_cost))
                    .collect();
                (s.category, s.total_cost, s.share_pct, details)
            })
            .collect()
    }
}

pub type SliceRow = (String, f64, f64, Vec<(String, f64, f64)>);

/// Fold categories whose share of total cost is below `threshold_pct` into a
/// single "Other Costs" slice.
///
/// Non-positive totals are ignored. The largest category is always kept on
/// its own, even when it falls below the threshold. Slices come back largest
/// first.
pub fn group_cost_distribution(
    rows: &[CategoryCostTotal],
    threshold_pct: f64,
) -> CostDistribution {
    let mut positive: Vec<&CategoryCostTotal> =
        rows.iter().filter(|r| r.total_cost > 0.0).collect();
    positive.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));

    let total_cost: f64 = positive.iter().map(|r| r.total_cost).sum();
    let mut slices: Vec<CostSlice> = Vec::new();
    let mut other_total = 0.0;
    let mut details = Vec::new();

    for row in positive {
        let share_pct = coalesce(percent(row.total_cost, total_cost));
        if share_pct >= threshold_pct || slices.is_empty() {
            slices.push(CostSlice {
                category: row.category.clone(),
                total_cost: row.total_cost,
                behavior: row.behavior,
                share_pct,
                details: Vec::new(),
            });
        } else {
            other_total += row.total_cost;
            details.push(OtherCostDetail {
                category: row.category.clone(),
                share_pct,
                total_cost: row.total_cost,
            });
        }
    }

    if other_total > 0.0 {
        slices.push(CostSlice {
            category: OTHER_COSTS.to_string(),
            total_cost: other_total,
            behavior: CostBehavior::Fixed,
            share_pct: coalesce(percent(other_total, total_cost)),
            details,
        });
        slices.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
    }

    CostDistribution { total_cost, slices }
}

// ── Business performance ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, frozen))]
pub struct ProductPerformanceRow {
    pub product: String,
    pub revenue: f64,
    pub variable_cost: f64,
    pub gross_profit: f64,
    pub gross_margin_pct: Option<f64>,
    pub allocated_fixed: f64,
    pub net_profit: f64,
    pub net_margin_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, frozen))]
pub struct PerformanceSummary {
    pub net_profit: f64,
    pub overall_profit_margin: Option<f64>,
    pub break_even: Option<f64>,
    /// Total gross profit.
    pub contribution_margin: f64,
    pub total_revenue: f64,
    pub total_costs: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BusinessPerformance {
    pub summary: Option<PerformanceSummary>,
    pub products: Vec<ProductPerformanceRow>,
    pub totals: Option<ProductPerformanceRow>,
}

impl BusinessPerformance {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Per-product profitability with fixed cost allocated by revenue share.
///
/// `variable_by_product` holds each product's variable cost; products missing
/// from it carry none. The TOTAL row reports the whole fixed pool as allocated.
pub fn business_performance(
    products: &[ProductMetrics],
    variable_total: f64,
    fixed_total: f64,
    variable_by_product: &HashMap<String, f64>,
) -> BusinessPerformance {
    if products.is_empty() {
        return BusinessPerformance::default();
    }

    let total_revenue: f64 = products.iter().map(|p| p.total_revenue).sum();
    let total_costs = variable_total + fixed_total;
    let gross_profit_total = total_revenue - variable_total;
    let net_profit_total = net_profit(gross_profit_total, fixed_total);
    let overall_profit_margin = net_margin_pct(net_profit_total, total_revenue);

    let rows = products
        .iter()
        .map(|p| {
            let revenue = p.total_revenue;
            let variable_cost = variable_by_product.get(&p.product).copied().unwrap_or(0.0);
            let gross_profit = revenue - variable_cost;
            let allocated_fixed = allocated_fixed_cost(fixed_total, revenue, total_revenue);
            let net = net_profit(gross_profit, allocated_fixed);
            ProductPerformanceRow {
                product: p.product.clone(),
                revenue,
                variable_cost,
                gross_profit,
                gross_margin_pct: gross_margin_pct(revenue, variable_cost),
                allocated_fixed,
                net_profit: net,
                net_margin_pct: net_margin_pct(net, revenue),
            }
        })
        .collect();

    let totals = ProductPerformanceRow {
        product: TOTAL_ROW.to_string(),
        revenue: total_revenue,
        variable_cost: variable_total,
        gross_profit: gross_profit_total,
        gross_margin_pct: gross_margin_pct(total_revenue, variable_total),
        allocated_fixed: fixed_total,
        net_profit: net_profit_total,
        net_margin_pct: overall_profit_margin,
    };

    BusinessPerformance {
        summary: Some(PerformanceSummary {
            net_profit: net_profit_total,
            overall_profit_margin,
            break_even: break_even_coverage(total_revenue, total_costs),
            contribution_margin: gross_profit_total,
            total_revenue,
            total_costs,
        }),
        products: rows,
        totals: Some(totals),
    }
}

// ── Product cost summary ────────────────────────────────────────────────────

/// Cost-side view of a single product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, frozen))]
pub struct ProductCostSummary {
    pub product: String,
    pub revenue: f64,
    pub volume: f64,
    pub variable_cost: f64,
    pub cost_per_kg: Option<f64>,
    pub gross_profit: f64,
    pub gross_margin: Option<f64>,
    pub profit_per_kg: Option<f64>,
    pub allocated_fixed: f64,
    pub net_profit: f64,
    pub procurement_cost: f64,
    pub packaging_cost: f64,
    pub total_cost: f64,
    pub revenue_share_pct: f64,
}

/// Inputs for [`product_cost_summary`], all already aggregated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductCostInputs {
    pub variable_cost: f64,
    pub procurement_cost: f64,
    pub fixed_total: f64,
    pub total_revenue_all: f64,
}

pub fn product_cost_summary(
    metrics: &ProductMetrics,
    inputs: ProductCostInputs,
) -> ProductCostSummary {
    let revenue = metrics.total_revenue;
    let volume = metrics.total_volume;
    let variable_cost = inputs.variable_cost;
    let gross_profit = revenue - variable_cost;
    let allocated_fixed =
        allocated_fixed_cost(inputs.fixed_total, revenue, inputs.total_revenue_all);

    ProductCostSummary {
        product: metrics.product.clone(),
        revenue,
        volume,
        variable_cost,
        cost_per_kg: safe_ratio(variable_cost, volume),
        gross_profit,
        gross_margin: gross_margin_pct(revenue, variable_cost),
        profit_per_kg: safe_ratio(gross_profit, volume),
        allocated_fixed,
        net_profit: net_profit(gross_profit, allocated_fixed),
        procurement_cost: inputs.procurement_cost,
        packaging_cost: (variable_cost - inputs.procurement_cost).max(0.0),
        total_cost: variable_cost + allocated_fixed,
        revenue_share_pct: revenue_share_pct(revenue, inputs.total_revenue_all),
    }
}

// ── Cost overview ───────────────────────────────────────────────────────────

/// Already aggregated cost figures feeding [`cost_overview_summary`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostFigures {
    pub total_costs: f64,
    pub variable_costs: f64,
    pub fixed_costs: f64,
    pub avg_cost_per_kg: f64,
    pub total_revenue: f64,
    /// Distinct (year, month) combinations with recorded cost.
    pub month_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, frozen))]
pub struct CostOverview {
    pub total_costs: f64,
    pub variable_costs: f64,
    pub fixed_costs: f64,
    pub variable_pct: Option<f64>,
    pub fixed_pct: Option<f64>,
    pub avg_cost_per_kg: f64,
    pub gross_margin_pct: Option<f64>,
    pub avg_monthly_cost: Option<f64>,
    pub month_count: usize,
}

pub fn cost_overview_summary(figures: CostFigures) -> CostOverview {
    CostOverview {
        total_costs: figures.total_costs,
        variable_costs: figures.variable_costs,
        fixed_costs: figures.fixed_costs,
        variable_pct: percent(figures.variable_costs, figures.total_costs),
        fixed_pct: percent(figures.fixed_costs, figures.total_costs),
        avg_cost_per_kg: figures.avg_cost_per_kg,
        gross_margin_pct: gross_margin_pct(figures.total_revenue, figures.variable_costs),
        avg_monthly_cost: safe_ratio(figures.total_costs, figures.month_count as f64),
        month_count: figures.month_count,
    }
}

// ── Waterfall ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepMeasure {
    Relative,
    Total,
}

impl StepMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepMeasure::Relative => "relative",
            StepMeasure::Total => "total",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterfallStep {
    pub label: &'static str,
    pub value: f64,
    pub measure: StepMeasure,
}

/// Revenue down to net profit. Empty when there is nothing to show.
pub fn profitability_waterfall(summary: &ProductCostSummary) -> Vec<WaterfallStep> {
    if summary.revenue == 0.0 && summary.net_profit == 0.0 {
        return Vec::new();
    }
    vec![
        WaterfallStep {
            label: "Revenue",
            value: summary.revenue,
            measure: StepMeasure::Relative,
        },
        WaterfallStep {
            label: "Variable Costs",
            value: -summary.variable_cost,
            measure: StepMeasure::Relative,
        },
        WaterfallStep {
            label: "Allocated Fixed",
            value: -summary.allocated_fixed,
            measure: StepMeasure::Relative,
        },
        WaterfallStep {
            label: "Net Profit",
            value: summary.net_profit,
            measure: StepMeasure::Total,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(product: &str, revenue: f64, volume: f64) -> ProductMetrics {
        ProductMetrics {
            product: product.to_string(),
            total_revenue: revenue,
            total_volume: volume,
            avg_price: coalesce(safe_ratio(revenue, volume)),
        }
    }

    fn category(name: &str, total: f64) -> CategoryCostTotal {
        CategoryCostTotal {
            category: name.to_string(),
            total_cost: total,
            behavior: CostBehavior::Fixed,
        }
    }

    #[test]
    fn zero_denominators_are_undefined() {
        assert_eq!(safe_ratio(5.0, 0.0), None);
        assert_eq!(gross_margin_pct(0.0, 10.0), None);
        assert_eq!(net_margin_pct(-3.0, 0.0), None);
        assert_eq!(break_even_coverage(100.0, 0.0), None);
        assert_eq!(allocated_fixed_cost(500.0, 0.0, 0.0), 0.0);
        assert_eq!(revenue_share_pct(10.0, 0.0), 0.0);
    }

    #[test]
    fn margins() {
        assert_eq!(gross_margin_pct(200.0, 50.0), Some(75.0));
        assert_eq!(net_margin_pct(50.0, 200.0), Some(25.0));
        assert_eq!(break_even_coverage(300.0, 200.0), Some(1.5));
        assert_eq!(revenue_share_pct(150.0, 100.0), 100.0);
        assert_eq!(revenue_share_pct(-5.0, 100.0), 0.0);
    }

    #[test]
    fn small_categories_fold_into_other() {
        let rows = vec![
            category("Fruit Procurement", 50.0),
            category("Personnel", 40.0),
            category("Packaging", 2.0),
            category("Rent", 2.0),
            category("Insurance", 1.0),
            category("Utilities", 1.0),
            category("Marketing", 2.0),
            category("Freight", 2.0),
        ];
        let distribution = group_cost_distribution(&rows, 3.0);
        let names: Vec<&str> = distribution.slices.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(names, vec!["Fruit Procurement", "Personnel", OTHER_COSTS]);

        let other = distribution.other().unwrap();
        assert_eq!(other.total_cost, 10.0);
        assert_eq!(other.details.len(), 6);
        assert_eq!(other.behavior, CostBehavior::Fixed);
        assert_eq!(distribution.total_cost, 100.0);
    }

    #[test]
    fn largest_category_is_kept_even_below_threshold() {
        let rows = vec![category("A", 1.0), category("B", 1.0)];
        let distribution = group_cost_distribution(&rows, 60.0);
        assert_eq!(distribution.slices[0].category, "A");
        assert_eq!(distribution.slices[1].category, OTHER_COSTS);
    }

    #[test]
    fn flattened_rows_keep_the_other_costs_breakdown() {
        let rows = vec![
            category("Personnel", 90.0),
            category("Insurance", 6.0),
            category("Utilities", 4.0),
        ];
        let flat = group_cost_distribution(&rows, 10.0).into_rows();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0], ("Personnel".to_string(), 90.0, 90.0, Vec::new()));

        let (name, total, share, details) = &flat[1];
        assert_eq!(name, OTHER_COSTS);
        assert_eq!((*total, *share), (10.0, 10.0));
        assert_eq!(
            details,
            &vec![
                ("Insurance".to_string(), 6.0, 6.0),
                ("Utilities".to_string(), 4.0, 4.0),
            ]
        );
    }

    #[test]
    fn non_positive_categories_are_dropped() {
        let rows = vec![category("Refunds", -20.0), category("Idle", 0.0)];
        assert!(group_cost_distribution(&rows, 3.0).is_empty());
    }

    #[test]
    fn business_performance_rows_and_totals() {
        let products = vec![metrics("A", 300.0, 100.0), metrics("B", 100.0, 50.0)];
        let variable = HashMap::from([("A".to_string(), 100.0), ("B".to_string(), 20.0)]);
        let perf = business_performance(&products, 120.0, 80.0, &variable);

        let a = &perf.products[0];
        assert_eq!(a.gross_profit, 200.0);
        assert_eq!(a.allocated_fixed, 60.0);
        assert_eq!(a.net_profit, 140.0);

        let totals = perf.totals.as_ref().unwrap();
        assert_eq!(totals.product, TOTAL_ROW);
        assert_eq!(totals.allocated_fixed, 80.0);
        assert_eq!(totals.net_profit, 200.0);

        let summary = perf.summary.as_ref().unwrap();
        assert_eq!(summary.break_even, Some(2.0));
        assert_eq!(summary.contribution_margin, 280.0);
        assert_eq!(summary.overall_profit_margin, Some(50.0));
    }

    #[test]
    fn business_performance_without_products_is_empty() {
        let perf = business_performance(&[], 10.0, 10.0, &HashMap::new());
        assert!(perf.is_empty());
        assert!(perf.summary.is_none());
    }

    #[test]
    fn product_cost_summary_splits_packaging_from_procurement() {
        let summary = product_cost_summary(
            &metrics("Goldenberries", 200.0, 100.0),
            ProductCostInputs {
                variable_cost: 80.0,
                procurement_cost: 60.0,
                fixed_total: 100.0,
                total_revenue_all: 400.0,
            },
        );
        assert_eq!(summary.packaging_cost, 20.0);
        assert_eq!(summary.cost_per_kg, Some(0.8));
        assert_eq!(summary.allocated_fixed, 50.0);
        assert_eq!(summary.net_profit, 70.0);
        assert_eq!(summary.total_cost, 130.0);
        assert_eq!(summary.revenue_share_pct, 50.0);

        let steps = profitability_waterfall(&summary);
        let values: Vec<f64> = steps.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![200.0, -80.0, -50.0, 70.0]);
        assert_eq!(steps[3].measure, StepMeasure::Total);
        assert_eq!(steps[0].measure.as_str(), "relative");
    }

    #[test]
    fn packaging_never_negative_and_waterfall_empty_without_activity() {
        let summary = product_cost_summary(
            &metrics("Idle", 0.0, 0.0),
            ProductCostInputs {
                variable_cost: 0.0,
                procurement_cost: 10.0,
                fixed_total: 0.0,
                total_revenue_all: 0.0,
            },
        );
        assert_eq!(summary.packaging_cost, 0.0);
        assert_eq!(summary.cost_per_kg, None);
        assert!(profitability_waterfall(&summary).is_empty());
    }

    #[test]
    fn cost_overview_handles_empty_costs() {
        let overview = cost_overview_summary(CostFigures::default());
        assert_eq!(overview.variable_pct, None);
        assert_eq!(overview.avg_monthly_cost, None);
        assert_eq!(overview.gross_margin_pct, None);

        let overview = cost_overview_summary(CostFigures {
            total_costs: 300.0,
            variable_costs: 100.0,
            fixed_costs: 200.0,
            avg_cost_per_kg: 1.0,
            total_revenue: 400.0,
            month_count: 3,
        });
        assert_eq!(overview.avg_monthly_cost, Some(100.0));
        assert_eq!(overview.gross_margin_pct, Some(75.0));
    }
}
