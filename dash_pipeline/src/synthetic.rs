//! Seeded generator for the e-commerce transaction dataset

use crate::data::{DataSource, Record, RecordSet};
use crate::error::{PipelineError, Result};
use crate::schema::{Schema, Value};
use crate::utils::{month_period, weekday_name};
use chrono::{Datelike, Duration, NaiveDate};
use dash_math::descriptive::round_to;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Poisson;
use std::f64::consts::PI;
use tracing::info;

const CATEGORIES: [&str; 5] = ["Electronics", "Clothing", "Home & Garden", "Sports", "Books"];
const CATEGORY_WEIGHTS: [f64; 5] = [0.3, 0.25, 0.2, 0.15, 0.1];
const BASE_PRICES: [f64; 5] = [500.0, 50.0, 100.0, 80.0, 20.0];
const PRODUCTS: [[&str; 4]; 5] = [
    ["Laptop", "Smartphone", "Headphones", "Tablet"],
    ["T-Shirt", "Jeans", "Jacket", "Shoes"],
    ["Furniture", "Kitchenware", "Decor", "Tools"],
    ["Fitness Equipment", "Sports Wear", "Accessories", "Outdoor Gear"],
    ["Fiction", "Non-Fiction", "Comics", "Educational"],
];
const QUANTITIES: [f64; 3] = [1.0, 2.0, 3.0];
const QUANTITY_WEIGHTS: [f64; 3] = [0.7, 0.2, 0.1];
const REGIONS: [&str; 4] = ["North", "South", "East", "West"];

const BASE_DAILY_TRANSACTIONS: f64 = 20.0;
const WEEKEND_BOOST: f64 = 1.2;
const NEW_CUSTOMER_PROBABILITY: f64 = 0.1;
const FIRST_CUSTOMER_ID: u32 = 1000;

/// Synthetic sales transactions with seasonal and weekend demand patterns.
///
/// The same seed always yields the same records.
#[derive(Debug, Clone)]
pub struct SyntheticSalesSource {
    name: String,
    seed: u64,
    start: NaiveDate,
    end: NaiveDate,
}

impl SyntheticSalesSource {
    /// Three years of daily transactions, 2022-01-01 through 2024-12-31
    pub fn new(seed: u64) -> Self {
        // Both dates are valid calendar days
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default();
        Self {
            name: format!("synthetic-sales:{seed}"),
            seed,
            start,
            end,
        }
    }

    /// Restrict generation to an inclusive date range
    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(PipelineError::InvalidParameter(format!(
                "Date range end {end} is before start {start}"
            )));
        }
        self.start = start;
        self.end = end;
        self.name = format!("synthetic-sales:{}:{start}:{end}", self.seed);
        Ok(self)
    }

    fn generate(&self) -> Result<Vec<Record>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let invalid = |e: rand::distributions::WeightedError| {
            PipelineError::InvalidParameter(format!("Bad sampling weights: {e}"))
        };
        let category_dist = WeightedIndex::new(CATEGORY_WEIGHTS).map_err(invalid)?;
        let quantity_dist = WeightedIndex::new(QUANTITY_WEIGHTS).map_err(invalid)?;

        let mut records = Vec::new();
        let mut customer_id = FIRST_CUSTOMER_ID;
        let mut date = self.start;

        while date <= self.end {
            let seasonal = 1.0 + 0.3 * (2.0 * PI * date.month() as f64 / 12.0).sin();
            let weekend = if date.weekday().number_from_monday() >= 6 {
                WEEKEND_BOOST
            } else {
                1.0
            };
            let poisson = Poisson::new(BASE_DAILY_TRANSACTIONS * seasonal * weekend)
                .map_err(|e| PipelineError::InvalidParameter(format!("Bad Poisson rate: {e}")))?;
            let transactions = poisson.sample(&mut rng) as usize;

            for _ in 0..transactions {
                let category = category_dist.sample(&mut rng);
                let product = PRODUCTS[category][rng.gen_range(0..PRODUCTS[category].len())];
                let price = BASE_PRICES[category] * rng.gen_range(0.5..2.0);
                let quantity = QUANTITIES[quantity_dist.sample(&mut rng)];
                let revenue = price * quantity;
                let age = rng.gen_range(18..70) as f64;
                let region = REGIONS[rng.gen_range(0..REGIONS.len())];

                records.push(Record::new(vec![
                    Value::Date(date),
                    Value::Text(format!("ORD{:06}", records.len())),
                    Value::Text(format!("CUST{customer_id}")),
                    Value::from(CATEGORIES[category]),
                    Value::from(product),
                    Value::Number(quantity),
                    Value::Number(round_to(price, 2)),
                    Value::Number(round_to(revenue, 2)),
                    Value::Number(age),
                    Value::from(region),
                    Value::Text(month_period(date)),
                    Value::Number(date.year() as f64),
                    Value::from(weekday_name(date.weekday())),
                ]));

                if rng.gen::<f64>() < NEW_CUSTOMER_PROBABILITY {
                    customer_id += 1;
                }
            }

            date += Duration::days(1);
        }

        Ok(records)
    }
}

impl DataSource for SyntheticSalesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<RecordSet> {
        let records = RecordSet::new(Schema::sales(), self.generate()?)?;
        info!(source = %self.name, rows = records.len(), "generated sales dataset");
        Ok(records)
    }
}
