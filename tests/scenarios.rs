use std::cell::Cell;

use goldenberry_metrics::records::ProductMetrics;
use goldenberry_metrics::{
    CostBehavior, CostFilter, ErrorKind, GraphSource, GraphStore, MetricsConfig, MetricsError,
    MetricsResult, MetricsService, TimePeriod, Traversal,
};
use polars::prelude::DataFrame;

/// A source whose backing store went away. Counts how often it was asked.
#[derive(Default)]
struct Unreachable {
    calls: Cell<usize>,
}

impl GraphSource for Unreachable {
    fn run(&self, _traversal: &Traversal) -> MetricsResult<DataFrame> {
        self.calls.set(self.calls.get() + 1);
        Err(MetricsError::Connection("graph service unavailable".into()))
    }
}

fn goldenberries_only() -> GraphStore {
    let mut b = GraphStore::builder();
    b.product("Goldenberries");
    b.period("2024-01", TimePeriod::new(2024, 1).unwrap()).unwrap();
    b.price("Goldenberries", "2024-01", 2.0)
        .unwrap()
        .volume("Goldenberries", "2024-01", 100.0)
        .unwrap();
    b.build()
}

#[test]
fn empty_database_yields_identity_values() {
    let service = MetricsService::new(GraphStore::builder().build());
    assert!(service.product_metrics().unwrap().is_empty());
    assert_eq!(service.total_revenue().unwrap(), 0.0);
    assert_eq!(service.total_volume().unwrap(), 0.0);
    assert_eq!(service.product_count().unwrap(), 0);
    assert!(service.cost_categories().unwrap().is_empty());
    assert!(service.quarterly_costs(&CostFilter::all()).unwrap().is_empty());
    assert!(service.business_performance().unwrap().is_empty());
    assert!(service
        .cost_distribution(&MetricsConfig::default())
        .unwrap()
        .is_empty());
}

#[test]
fn single_product_single_period() {
    let service = MetricsService::new(goldenberries_only());
    assert_eq!(service.total_revenue().unwrap(), 200.0);
    assert_eq!(service.average_price_per_kg().unwrap(), 2.0);
    assert_eq!(
        service.product_metrics().unwrap(),
        vec![ProductMetrics {
            product: "Goldenberries".into(),
            total_revenue: 200.0,
            total_volume: 100.0,
            avg_price: 2.0,
        }]
    );
}

#[test]
fn product_metrics_serialize_with_dashboard_field_names() {
    let service = MetricsService::new(goldenberries_only());
    let json = serde_json::to_value(&service.product_metrics().unwrap()[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "Product": "Goldenberries",
            "TotalRevenue": 200.0,
            "TotalVolume": 100.0,
            "AvgPrice": 2.0,
        })
    );
}

#[test]
fn unreachable_source_fails_every_operation_alike() {
    let source = Unreachable::default();
    let service = MetricsService::new(&source);
    let filter = CostFilter::all();
    let config = MetricsConfig::default();

    let outcomes: Vec<(&str, Option<MetricsError>)> = vec![
        ("product_count", service.product_count().err()),
        ("revenue_streams", service.revenue_streams().err()),
        ("total_revenue", service.total_revenue().err()),
        ("total_volume", service.total_volume().err()),
        ("average_monthly_revenue", service.average_monthly_revenue().err()),
        ("average_price_per_kg", service.average_price_per_kg().err()),
        ("product_metrics", service.product_metrics().err()),
        ("product_metrics_for", service.product_metrics_for("Goldenberries").err()),
        ("revenue_timeseries", service.revenue_timeseries().err()),
        ("quarterly_revenue", service.quarterly_revenue().err()),
        ("product_monthly_performance", service.product_monthly_performance().err()),
        ("total_costs", service.total_costs().err()),
        ("variable_costs", service.variable_costs().err()),
        ("fixed_costs", service.fixed_costs().err()),
        ("cost_timeseries", service.cost_timeseries(&filter).err()),
        ("quarterly_costs", service.quarterly_costs(&filter).err()),
        ("cost_categories", service.cost_categories().err()),
        ("product_costs", service.product_costs("Goldenberries").err()),
        ("product_variable_cost", service.product_variable_cost("Goldenberries").err()),
        ("average_cost_per_kg", service.average_cost_per_kg().err()),
        ("variable_cost_timeseries", service.variable_cost_timeseries().err()),
        ("fixed_cost_timeseries", service.fixed_cost_timeseries().err()),
        ("cost_totals_by_behavior", service.cost_totals_by_behavior().err()),
        ("cost_totals_by_category", service.cost_totals_by_category().err()),
        ("executive_summary", service.executive_summary().err()),
        ("cost_overview", service.cost_overview().err()),
        ("business_performance", service.business_performance().err()),
        ("cost_distribution", service.cost_distribution(&config).err()),
        (
            "product_cost_summary",
            service.product_cost_summary("Goldenberries", &config).err(),
        ),
    ];

    for (operation, err) in outcomes {
        let err = err.unwrap_or_else(|| panic!("{operation} returned a value"));
        assert_eq!(err.kind(), ErrorKind::Connection, "{operation}");
        assert_eq!(
            err.to_string(),
            "Connection failed: graph service unavailable",
            "{operation}"
        );
    }
}

#[test]
fn no_values_are_cached_between_calls() {
    let source = Unreachable::default();
    let service = MetricsService::new(&source);
    assert!(service.total_revenue().is_err());
    assert!(service.total_revenue().is_err());
    assert_eq!(source.calls.get(), 2);
}

#[test]
fn malformed_filter_is_distinct_from_missing_data() {
    let service = MetricsService::new(goldenberries_only());
    let blank = service.product_costs(" ").unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::Query);

    let unknown = service.product_costs("Kiwano").unwrap();
    assert!(unknown.is_empty());
    assert_eq!(service.product_variable_cost("Kiwano").unwrap(), 0.0);
}

#[test]
fn aggregate_and_breakdown_agree() {
    let mut b = GraphStore::builder();
    for name in ["C", "A", "B"] {
        b.product(name);
    }
    b.period("p1", TimePeriod::new(2024, 1).unwrap()).unwrap();
    b.period("p2", TimePeriod::new(2024, 2).unwrap()).unwrap();
    for (name, price, volume) in [("C", 1.5, 40.0), ("A", 2.0, 30.0), ("B", 3.0, 20.0)] {
        for period in ["p1", "p2"] {
            b.price(name, period, price)
                .unwrap()
                .volume(name, period, volume)
                .unwrap();
        }
    }
    b.cost("Personnel", None, Some("p1"), 25.0, CostBehavior::Fixed)
        .unwrap();
    let service = MetricsService::new(b.build());

    let metrics = service.product_metrics().unwrap();
    let breakdown: f64 = metrics.iter().map(|m| m.total_revenue).sum();
    assert_eq!(service.total_revenue().unwrap(), breakdown);

    // All three earn 120.0; load order decides.
    let order: Vec<&str> = metrics.iter().map(|m| m.product.as_str()).collect();
    assert_eq!(order, vec!["C", "A", "B"]);
    assert!(metrics
        .windows(2)
        .all(|w| w[0].total_revenue >= w[1].total_revenue));

    let expected = service.total_revenue().unwrap() / service.total_volume().unwrap();
    assert_eq!(service.average_price_per_kg().unwrap(), expected);
}
