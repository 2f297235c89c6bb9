//! Page-level compositions: fetch through [`MetricsService`], then hand the
//! numbers to [`crate::derived`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::derived::{
    business_performance, cost_overview_summary, group_cost_distribution, product_cost_summary,
    BusinessPerformance, CostDistribution, CostFigures, CostOverview, ProductCostInputs,
    ProductCostSummary,
};
use crate::error::MetricsResult;
use crate::model::CostBehavior;
use crate::query::{CostFilter, MetricsService};
use crate::source::GraphSource;

/// Headline revenue figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "python", pyo3::pyclass(get_all, frozen))]
pub struct ExecutiveSummary {
    pub total_revenue: f64,
    pub total_volume: f64,
    pub average_monthly_revenue: f64,
    pub average_price_per_kg: f64,
}

impl<S: GraphSource> MetricsService<S> {
    pub fn executive_summary(&self) -> MetricsResult<ExecutiveSummary> {
        Ok(ExecutiveSummary {
            total_revenue: self.total_revenue()?,
            total_volume: self.total_volume()?,
            average_monthly_revenue: self.average_monthly_revenue()?,
            average_price_per_kg: self.average_price_per_kg()?,
        })
    }

    pub fn cost_overview(&self) -> MetricsResult<CostOverview> {
        let month_count = self
            .cost_timeseries(&CostFilter::all())?
            .iter()
            .map(|p| (p.year, p.month))
            .collect::<HashSet<_>>()
            .len();
        Ok(cost_overview_summary(CostFigures {
            total_costs: self.total_costs()?,
            variable_costs: self.variable_costs()?,
            fixed_costs: self.fixed_costs()?,
            avg_cost_per_kg: self.average_cost_per_kg()?,
            total_revenue: self.total_revenue()?,
            month_count,
        }))
    }

    /// Category breakdown with small categories folded into "Other Costs".
    pub fn cost_distribution(&self, config: &MetricsConfig) -> MetricsResult<CostDistribution> {
        let totals = self.cost_totals_by_category()?;
        Ok(group_cost_distribution(
            &totals,
            config.other_share_threshold_pct,
        ))
    }

    pub fn business_performance(&self) -> MetricsResult<BusinessPerformance> {
        let products = self.product_metrics()?;
        if products.is_empty() {
            return Ok(BusinessPerformance::default());
        }
        let variable_total = self.variable_costs()?;
        let fixed_total = self.fixed_costs()?;
        let mut variable_by_product = HashMap::with_capacity(products.len());
        for p in &products {
            variable_by_product.insert(p.product.clone(), self.product_variable_cost(&p.product)?);
        }
        Ok(business_performance(
            &products,
            variable_total,
            fixed_total,
            &variable_by_product,
        ))
    }

    /// Cost summary for one product. `None` when the product is unknown.
    pub fn product_cost_summary(
        &self,
        product: &str,
        config: &MetricsConfig,
    ) -> MetricsResult<Option<ProductCostSummary>> {
        let Some(metrics) = self.product_metrics_for(product)? else {
            debug!(product, "no metrics for product");
            return Ok(None);
        };

        let procurement_cost = self
            .product_costs(product)?
            .into_iter()
            .find(|c| c.category == config.procurement_category)
            .map(|c| c.cost)
            .unwrap_or(0.0);

        let inputs = ProductCostInputs {
            variable_cost: self.product_variable_cost(product)?,
            procurement_cost,
            fixed_total: self.cost_totals_by_behavior()?.get(CostBehavior::Fixed),
            total_revenue_all: self.total_revenue()?,
        };
        Ok(Some(product_cost_summary(&metrics, inputs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;
    use crate::model::TimePeriod;

    fn service() -> MetricsService<GraphStore> {
        let mut b = GraphStore::builder();
        b.product("Goldenberries (Physalis)").product("Pitahaya (Dragon Fruit)");
        b.period("2024-01", TimePeriod::new(2024, 1).unwrap()).unwrap();
        b.period("2024-02", TimePeriod::new(2024, 2).unwrap()).unwrap();
        b.price("Goldenberries (Physalis)", "2024-01", 2.0)
            .unwrap()
            .volume("Goldenberries (Physalis)", "2024-01", 150.0)
            .unwrap()
            .price("Pitahaya (Dragon Fruit)", "2024-02", 5.0)
            .unwrap()
            .volume("Pitahaya (Dragon Fruit)", "2024-02", 20.0)
            .unwrap();
        b.cost(
            "Fruit Procurement",
            Some("Goldenberries (Physalis)"),
            Some("2024-01"),
            60.0,
            CostBehavior::Variable,
        )
        .unwrap()
        .cost(
            "Packaging",
            Some("Goldenberries (Physalis)"),
            Some("2024-01"),
            15.0,
            CostBehavior::Variable,
        )
        .unwrap()
        .cost("Personnel", None, Some("2024-02"), 100.0, CostBehavior::Fixed)
        .unwrap();
        MetricsService::new(b.build())
    }

    #[test]
    fn executive_summary_collects_headline_figures() {
        let summary = service().executive_summary().unwrap();
        assert_eq!(summary.total_revenue, 400.0);
        assert_eq!(summary.total_volume, 170.0);
        assert_eq!(summary.average_monthly_revenue, 200.0);
    }

    #[test]
    fn cost_overview_counts_cost_months() {
        let overview = service().cost_overview().unwrap();
        assert_eq!(overview.month_count, 2);
        assert_eq!(overview.total_costs, 175.0);
        assert_eq!(overview.avg_monthly_cost, Some(87.5));
        assert_eq!(overview.variable_costs, 75.0);
    }

    #[test]
    fn allocation_covers_fixed_pool() {
        let perf = service().business_performance().unwrap();
        let allocated: f64 = perf.products.iter().map(|r| r.allocated_fixed).sum();
        assert!((allocated - 100.0).abs() < 1e-9);
        assert_eq!(perf.products[0].variable_cost, 75.0);
        assert_eq!(perf.products[1].variable_cost, 0.0);
    }

    #[test]
    fn product_cost_summary_uses_configured_procurement_category() {
        let svc = service();
        let config = MetricsConfig::default();
        let summary = svc
            .product_cost_summary("Goldenberries (Physalis)", &config)
            .unwrap()
            .unwrap();
        assert_eq!(summary.procurement_cost, 60.0);
        assert_eq!(summary.packaging_cost, 15.0);
        assert_eq!(summary.allocated_fixed, 75.0);

        assert!(svc.product_cost_summary("Kiwano", &config).unwrap().is_none());
    }

    #[test]
    fn cost_distribution_honours_threshold() {
        let config = MetricsConfig {
            other_share_threshold_pct: 50.0,
            ..MetricsConfig::default()
        };
        let distribution = service().cost_distribution(&config).unwrap();
        assert_eq!(distribution.slices[0].category, "Personnel");
        assert_eq!(distribution.other().map(|o| o.total_cost), Some(75.0));
    }
}
