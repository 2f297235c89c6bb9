/// Column-name constants for the goldenberry metrics schema.
/// Single source of truth for CSV inputs and for the frames traversals return.

// ── Input files ─────────────────────────────────────────────────────────────
pub mod files {
    pub const PRODUCTS: &str = "products.csv";
    pub const REVENUE_STREAMS: &str = "revenue_streams.csv";
    pub const TIME_PERIODS: &str = "time_periods.csv";
    pub const PRICES: &str = "prices.csv";
    pub const VOLUMES: &str = "volumes.csv";
    pub const COST_STRUCTURES: &str = "cost_structures.csv";
    pub const COSTS: &str = "costs.csv";
}

// ── Product columns ─────────────────────────────────────────────────────────
pub mod product {
    pub const NAME: &str = "name";
}

// ── Revenue stream columns ──────────────────────────────────────────────────
pub mod stream {
    pub const STREAM_ID: &str = "stream_id";
    pub const PRODUCT: &str = "product";
}

// ── Time period columns ─────────────────────────────────────────────────────
pub mod period {
    pub const PERIOD_ID: &str = "period_id";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const QUARTER: &str = "quarter";
}

// ── Price / volume columns ──────────────────────────────────────────────────
pub mod price {
    pub const PRODUCT: &str = "product";
    pub const PERIOD_ID: &str = "period_id";
    pub const PRICE: &str = "price";
}

pub mod volume {
    pub const PRODUCT: &str = "product";
    pub const PERIOD_ID: &str = "period_id";
    pub const VOLUME: &str = "volume";
}

// ── Cost columns ────────────────────────────────────────────────────────────
pub mod cost_structure {
    pub const NAME: &str = "name";
}

pub mod cost {
    pub const STRUCTURE: &str = "structure";
    pub const PRODUCT: &str = "product";
    pub const PERIOD_ID: &str = "period_id";
    pub const AMOUNT: &str = "amount";
    pub const COST_BEHAVIOR: &str = "cost_behavior";
}

// ── Traversal output columns ────────────────────────────────────────────────
/// Columns of the row sets produced by graph traversals and by the
/// aggregations layered on top of them.
pub mod facts {
    pub const PRODUCT: &str = "product";
    pub const STREAM: &str = "stream";
    pub const PERIOD_ID: &str = "period_id";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const QUARTER: &str = "quarter";
    pub const VOLUME: &str = "volume";
    pub const PRICE: &str = "price";
    pub const REVENUE: &str = "revenue";
    pub const CATEGORY: &str = "category";
    pub const BEHAVIOR: &str = "behavior";
    pub const PRODUCT_LINKED: &str = "product_linked";
    pub const AMOUNT: &str = "amount";
    pub const COST: &str = "cost";
}

// ── Behavior values ─────────────────────────────────────────────────────────
pub mod behavior {
    pub const VARIABLE: &str = "variable";
    pub const FIXED: &str = "fixed";
}
