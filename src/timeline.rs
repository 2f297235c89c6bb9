//! Month and quarter bucketing for the time-series pages.
//!
//! Works on records already returned by the query layer: builds the option
//! lists for range pickers and reduces a month range or quarter set plus a
//! product selection to chart rows and per-product totals.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::display_name;
use crate::records::{CostPoint, QuarterlyCost, QuarterlyRevenue, RevenuePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// "January 2024"
    pub fn label(&self) -> String {
        self.format("%B %Y")
    }

    /// "Jan 2024"
    pub fn short_label(&self) -> String {
        self.format("%b %Y")
    }

    fn format(&self, pattern: &str) -> String {
        match NaiveDate::from_ymd_opt(self.year, self.month, 1) {
            Some(date) => date.format(pattern).to_string(),
            None => format!("{}-{:02}", self.year, self.month),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QuarterKey {
    pub year: i32,
    pub quarter: u32,
}

impl QuarterKey {
    pub fn new(year: i32, quarter: u32) -> Self {
        Self { year, quarter }
    }

    /// "Q3 2024"
    pub fn label(&self) -> String {
        format!("Q{} {}", self.quarter, self.year)
    }
}

impl fmt::Display for QuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Inclusive month range. Bounds given in reverse order are swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    start: MonthKey,
    end: MonthKey,
}

impl MonthRange {
    pub fn new(a: MonthKey, b: MonthKey) -> Self {
        if b < a {
            Self { start: b, end: a }
        } else {
            Self { start: a, end: b }
        }
    }

    /// Range spanning every option, or `None` without options.
    pub fn spanning(options: &[MonthKey]) -> Option<Self> {
        let first = options.iter().min()?;
        let last = options.iter().max()?;
        Some(Self::new(*first, *last))
    }

    pub fn start(&self) -> MonthKey {
        self.start
    }

    pub fn end(&self) -> MonthKey {
        self.end
    }

    pub fn contains(&self, key: MonthKey) -> bool {
        self.start <= key && key <= self.end
    }
}

/// A monthly value with an optional owning product.
pub trait MonthlyValue {
    fn month_key(&self) -> MonthKey;
    fn product(&self) -> Option<&str>;
    fn value(&self) -> f64;
    /// Name of the series the value is charted under.
    fn series_name(&self) -> String {
        display_name(self.product().unwrap_or_default())
    }
}

impl MonthlyValue for RevenuePoint {
    fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }

    fn product(&self) -> Option<&str> {
        Some(self.product.as_str())
    }

    fn value(&self) -> f64 {
        self.revenue
    }
}

impl MonthlyValue for CostPoint {
    fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }

    fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    fn value(&self) -> f64 {
        self.cost
    }

    /// Costs without a product are charted under their category.
    fn series_name(&self) -> String {
        match &self.product {
            Some(product) => display_name(product),
            None => self.category.clone(),
        }
    }
}

/// A quarterly value with an optional owning product.
pub trait QuarterlyValue {
    fn quarter_key(&self) -> QuarterKey;
    fn product(&self) -> Option<&str>;
    fn value(&self) -> f64;
    fn series_name(&self) -> String {
        display_name(self.product().unwrap_or_default())
    }
}

impl QuarterlyValue for QuarterlyRevenue {
    fn quarter_key(&self) -> QuarterKey {
        QuarterKey::new(self.year, self.quarter)
    }

    fn product(&self) -> Option<&str> {
        Some(self.product.as_str())
    }

    fn value(&self) -> f64 {
        self.revenue
    }
}

impl QuarterlyValue for QuarterlyCost {
    fn quarter_key(&self) -> QuarterKey {
        QuarterKey::new(self.year, self.quarter)
    }

    fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    fn value(&self) -> f64 {
        self.cost
    }

    fn series_name(&self) -> String {
        match &self.product {
            Some(product) => display_name(product),
            None => self.category.clone(),
        }
    }
}

/// Distinct months present, oldest first.
pub fn month_options<T: MonthlyValue>(points: &[T]) -> Vec<MonthKey> {
    points
        .iter()
        .map(MonthlyValue::month_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct quarters present, oldest first.
pub fn quarter_options<T: QuarterlyValue>(points: &[T]) -> Vec<QuarterKey> {
    points
        .iter()
        .map(QuarterlyValue::quarter_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Period a selection is bucketed by.
pub trait PeriodKey: Copy + Ord {
    fn axis_label(&self) -> String;
}

impl PeriodKey for MonthKey {
    fn axis_label(&self) -> String {
        self.short_label()
    }
}

impl PeriodKey for QuarterKey {
    fn axis_label(&self) -> String {
        self.label()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionRow<K = MonthKey> {
    pub period: K,
    pub label: String,
    pub display_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesTotal {
    pub display_name: String,
    pub value: f64,
}

/// Filtered view of a monthly or quarterly series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection<K = MonthKey> {
    /// One row per (period, series), chronological then by name.
    pub rows: Vec<SelectionRow<K>>,
    /// Totals per series, largest first.
    pub totals: Vec<SeriesTotal>,
    pub total: f64,
    pub period_count: usize,
}

impl<K> Default for Selection<K> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            totals: Vec::new(),
            total: 0.0,
            period_count: 0,
        }
    }
}

impl<K> Selection<K> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn select_revenue_months(
    points: &[RevenuePoint],
    range: MonthRange,
    products: &[String],
) -> Selection {
    select(points, range, products)
}

pub fn select_costs(points: &[CostPoint], range: MonthRange, products: &[String]) -> Selection {
    select(points, range, products)
}

/// Keep points inside `range` whose product is in `products` (all points
/// when `products` is empty), then regroup by month and series.
pub fn select<T: MonthlyValue>(points: &[T], range: MonthRange, products: &[String]) -> Selection {
    let wanted = product_set(products);
    regroup(
        points
            .iter()
            .filter(|p| range.contains(p.month_key()) && wanted.admits(p.product()))
            .map(|p| (p.month_key(), p.series_name(), p.value())),
    )
}

/// Keep points in one of the chosen quarters whose product is in `products`
/// (all points when `products` is empty), then regroup by quarter and
/// series. No quarters chosen selects nothing.
pub fn select_quarters<T: QuarterlyValue>(
    points: &[T],
    quarters: &[QuarterKey],
    products: &[String],
) -> Selection<QuarterKey> {
    let chosen: HashSet<QuarterKey> = quarters.iter().copied().collect();
    let wanted = product_set(products);
    regroup(
        points
            .iter()
            .filter(|p| chosen.contains(&p.quarter_key()) && wanted.admits(p.product()))
            .map(|p| (p.quarter_key(), p.series_name(), p.value())),
    )
}

struct ProductSet<'a>(HashSet<&'a str>);

impl ProductSet<'_> {
    fn admits(&self, product: Option<&str>) -> bool {
        self.0.is_empty() || product.is_some_and(|name| self.0.contains(name))
    }
}

fn product_set(products: &[String]) -> ProductSet<'_> {
    ProductSet(products.iter().map(String::as_str).collect())
}

fn regroup<K: PeriodKey>(kept: impl Iterator<Item = (K, String, f64)>) -> Selection<K> {
    let mut cells: BTreeMap<(K, String), f64> = BTreeMap::new();
    for (period, name, value) in kept {
        *cells.entry((period, name)).or_insert(0.0) += value;
    }

    let mut per_series: HashMap<&str, f64> = HashMap::new();
    let mut periods = BTreeSet::new();
    for ((period, name), value) in &cells {
        *per_series.entry(name.as_str()).or_insert(0.0) += value;
        periods.insert(*period);
    }
    let mut totals: Vec<SeriesTotal> = per_series
        .into_iter()
        .map(|(name, value)| SeriesTotal {
            display_name: name.to_string(),
            value,
        })
        .collect();
    totals.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    let rows: Vec<SelectionRow<K>> = cells
        .into_iter()
        .map(|((period, display_name), value)| SelectionRow {
            label: period.axis_label(),
            period,
            display_name,
            value,
        })
        .collect();

    Selection {
        total: rows.iter().map(|r| r.value).sum(),
        period_count: periods.len(),
        totals,
        rows,
    }
}
