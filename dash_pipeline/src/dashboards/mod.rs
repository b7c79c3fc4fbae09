//! Derived summaries shown by the two dashboards

pub mod covid;
pub mod sales;

pub use covid::{CovidReport, GlobalMetrics};
pub use sales::{SalesKpis, SalesReport};
