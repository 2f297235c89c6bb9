//! Typed rows returned by the query layer.
//!
//! Serialized field names follow what the dashboard pages consume.

use serde::Serialize;

use crate::model::CostBehavior;

/// Per-product totals. `avg_price` is 0.0 when the product has no volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMetrics {
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "TotalRevenue")]
    pub total_revenue: f64,
    #[serde(rename = "TotalVolume")]
    pub total_volume: f64,
    #[serde(rename = "AvgPrice")]
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenuePoint {
    pub product: String,
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlyRevenue {
    pub product: String,
    pub year: i32,
    pub quarter: u32,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMonthlyPerformance {
    pub product: String,
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
    pub volume: f64,
}

/// Monthly cost; `product` is `None` for costs not attributed to a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostPoint {
    pub product: Option<String>,
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlyCost {
    pub product: Option<String>,
    pub category: String,
    pub year: i32,
    pub quarter: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCost {
    pub category: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostTotalsByBehavior {
    pub variable: f64,
    pub fixed: f64,
}

impl CostTotalsByBehavior {
    pub fn get(&self, behavior: CostBehavior) -> f64 {
        match behavior {
            CostBehavior::Variable => self.variable,
            CostBehavior::Fixed => self.fixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCostTotal {
    pub category: String,
    pub total_cost: f64,
    pub behavior: CostBehavior,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueStreamRecord {
    pub stream: String,
    pub product: Option<String>,
}
