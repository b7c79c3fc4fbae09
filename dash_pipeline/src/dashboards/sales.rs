//! E-commerce dashboard summaries

use crate::aggregate::{aggregate, AggregationKeySpec, Reduction};
use crate::error::Result;
use crate::filter::{FilterSpec, FilteredView};
use crate::schema::{FieldKind, Value};
use crate::table::Table;
use crate::utils::WEEKDAY_NAMES;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Headline numbers of the sales dashboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SalesKpis {
    pub total_revenue: f64,
    /// Distinct order ids
    pub total_orders: usize,
    /// Mean revenue per transaction row; `None` for an empty view
    pub avg_order_value: Option<f64>,
    pub unique_customers: usize,
}

impl fmt::Display for SalesKpis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Key Performance Indicators:")?;
        writeln!(f, "  Total Revenue:    ${:.2}", self.total_revenue)?;
        writeln!(f, "  Total Orders:     {}", self.total_orders)?;
        match self.avg_order_value {
            Some(v) => writeln!(f, "  Avg Order Value:  ${v:.2}")?,
            None => writeln!(f, "  Avg Order Value:  n/a")?,
        }
        writeln!(f, "  Unique Customers: {}", self.unique_customers)
    }
}

/// Date range plus category and region multi-selects
pub fn sales_filter<C, R>(start: NaiveDate, end: NaiveDate, categories: C, regions: R) -> FilterSpec
where
    C: IntoIterator,
    C::Item: Into<String>,
    R: IntoIterator,
    R::Item: Into<String>,
{
    FilterSpec::new()
        .date_range("Date", start, end)
        .categorical_in("Category", categories)
        .categorical_in("Region", regions)
}

pub fn sales_kpis(view: &FilteredView) -> Result<SalesKpis> {
    let schema = view.schema();
    let revenue = schema.require("Revenue", FieldKind::Numeric)?;
    let order = schema.index_of("OrderID")?;
    let customer = schema.index_of("CustomerID")?;

    let values: Vec<f64> = view.iter().filter_map(|r| r.get(revenue).as_f64()).collect();
    let total_revenue = values.iter().sum();
    let avg_order_value = (!values.is_empty()).then(|| total_revenue / values.len() as f64);

    let distinct = |idx: usize| {
        let mut seen: Vec<&Value> = view.iter().map(|r| r.get(idx)).filter(|v| !v.is_null()).collect();
        seen.sort_by(|a, b| a.total_cmp(b));
        seen.dedup();
        seen.len()
    };

    Ok(SalesKpis {
        total_revenue,
        total_orders: distinct(order),
        avg_order_value,
        unique_customers: distinct(customer),
    })
}

fn revenue_by(view: &FilteredView, key: &str) -> Result<Table> {
    let spec = AggregationKeySpec::by([key]).reduce("Revenue", &[Reduction::Sum]);
    aggregate(view, &spec)?.into_table().rename_columns(&[key, "Revenue"])
}

/// `Date`, `Revenue` per day
pub fn daily_revenue(view: &FilteredView) -> Result<Table> {
    revenue_by(view, "Date")
}

/// `Category`, `Revenue`
pub fn revenue_by_category(view: &FilteredView) -> Result<Table> {
    revenue_by(view, "Category")
}

/// Revenue, order count and distinct customers per region
pub fn regional_performance(view: &FilteredView) -> Result<Table> {
    let spec = AggregationKeySpec::by(["Region"])
        .reduce("Revenue", &[Reduction::Sum])
        .reduce("OrderID", &[Reduction::Count])
        .reduce("CustomerID", &[Reduction::NUnique]);
    aggregate(view, &spec)?.into_table().rename_columns(&[
        "Region",
        "Total Revenue",
        "Total Orders",
        "Unique Customers",
    ])
}

/// Revenue per weekday, Monday first
pub fn revenue_by_weekday(view: &FilteredView) -> Result<Table> {
    revenue_by(view, "DayOfWeek")?.order_by_labels("DayOfWeek", &WEEKDAY_NAMES)
}

/// The `n` products with the highest revenue
pub fn top_products(view: &FilteredView, n: usize) -> Result<Table> {
    Ok(revenue_by(view, "Product")?.sort_by("Revenue", true)?.head(n))
}

/// Revenue, orders, distinct customers and items sold per `YYYY-MM` month
pub fn monthly_summary(view: &FilteredView) -> Result<Table> {
    let spec = AggregationKeySpec::by(["Month"])
        .reduce("Revenue", &[Reduction::Sum])
        .reduce("OrderID", &[Reduction::Count])
        .reduce("CustomerID", &[Reduction::NUnique])
        .reduce("Quantity", &[Reduction::Sum]);
    Ok(aggregate(view, &spec)?
        .into_table()
        .rename_columns(&[
            "Month",
            "Total Revenue",
            "Total Orders",
            "Unique Customers",
            "Items Sold",
        ])?
        .round(2))
}

/// Every table of the sales dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct SalesReport {
    pub kpis: SalesKpis,
    pub daily_revenue: Table,
    pub category_revenue: Table,
    pub regional: Table,
    pub weekday_revenue: Table,
    pub top_products: Table,
    pub monthly: Table,
}

impl SalesReport {
    pub fn build(view: &FilteredView) -> Result<Self> {
        Ok(Self {
            kpis: sales_kpis(view)?,
            daily_revenue: daily_revenue(view)?,
            category_revenue: revenue_by_category(view)?,
            regional: regional_performance(view)?,
            weekday_revenue: revenue_by_weekday(view)?,
            top_products: top_products(view, 10)?,
            monthly: monthly_summary(view)?,
        })
    }
}
