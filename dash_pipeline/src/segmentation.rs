//! Customer segmentation: per-entity features, standardization and k-means
//!
//! Cluster labels carry no meaning beyond grouping; label 0 is not the
//! smallest or the best segment.

use crate::aggregate::{aggregate, AggregationKeySpec, Reduction};
use crate::error::{PipelineError, Result};
use crate::filter::FilteredView;
use crate::schema::Value;
use crate::table::Table;
use linfa::prelude::*;
use linfa_clustering::KMeans as LinfaKMeans;
use linfa_nn::distance::L2Dist;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// One per-entity feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFeature {
    /// A reduction of a field over the entity's rows
    Reduce {
        name: String,
        field: String,
        reduction: Reduction,
    },
    /// The ratio of two earlier features; a zero denominator gives 0
    Ratio {
        name: String,
        numerator: String,
        denominator: String,
    },
}

impl EntityFeature {
    pub fn name(&self) -> &str {
        match self {
            EntityFeature::Reduce { name, .. } | EntityFeature::Ratio { name, .. } => name,
        }
    }
}

/// Which entity to segment and which features describe it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFeatureSpec {
    entity_field: String,
    features: Vec<EntityFeature>,
}

impl EntityFeatureSpec {
    pub fn new(entity_field: &str) -> Self {
        Self {
            entity_field: entity_field.to_string(),
            features: Vec::new(),
        }
    }

    /// Customer features of the sales dataset
    pub fn customer() -> Self {
        Self::new("CustomerID")
            .reduce("TotalSpent", "Revenue", Reduction::Sum)
            .reduce("OrderCount", "OrderID", Reduction::Count)
            .reduce("Age", "CustomerAge", Reduction::First)
            .ratio("AvgOrderValue", "TotalSpent", "OrderCount")
    }

    pub fn reduce(mut self, name: &str, field: &str, reduction: Reduction) -> Self {
        self.features.push(EntityFeature::Reduce {
            name: name.to_string(),
            field: field.to_string(),
            reduction,
        });
        self
    }

    pub fn ratio(mut self, name: &str, numerator: &str, denominator: &str) -> Self {
        self.features.push(EntityFeature::Ratio {
            name: name.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        });
        self
    }

    pub fn entity_field(&self) -> &str {
        &self.entity_field
    }

    pub fn features(&self) -> &[EntityFeature] {
        &self.features
    }
}

/// One row per distinct entity with its raw numeric features
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFeatureTable {
    entity_field: String,
    entities: Vec<Value>,
    feature_names: Vec<String>,
    values: Array2<f64>,
}

impl EntityFeatureTable {
    pub fn entities(&self) -> &[Value] {
        &self.entities
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Raw feature matrix, one row per entity
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn to_table(&self) -> Result<Table> {
        let mut columns = vec![self.entity_field.clone()];
        columns.extend(self.feature_names.iter().cloned());
        let rows = self
            .entities
            .iter()
            .zip(self.values.outer_iter())
            .map(|(entity, row)| {
                let mut cells = vec![entity.clone()];
                cells.extend(row.iter().map(|v| Value::Number(*v)));
                cells
            })
            .collect();
        Table::from_rows(columns, rows)
    }
}

/// Build per-entity features from a view.
///
/// Rows with a null entity are ignored. Features over a field the view does
/// not have are skipped with a warning. Null feature values become 0.
pub fn entity_features(view: &FilteredView, spec: &EntityFeatureSpec) -> Result<EntityFeatureTable> {
    let schema = view.schema();
    schema.index_of(&spec.entity_field)?;

    let mut key_spec = AggregationKeySpec::by([spec.entity_field.as_str()]);
    let mut names: Vec<String> = Vec::new();
    // Source column in the aggregated table for each reduced feature
    let mut reduced: Vec<(String, String)> = Vec::new();
    for feature in &spec.features {
        if let EntityFeature::Reduce {
            name,
            field,
            reduction,
        } = feature
        {
            if !schema.contains(field) {
                warn!(feature = %name, field = %field, "field missing, feature skipped");
                continue;
            }
            key_spec = key_spec.reduce(field, &[*reduction]);
            reduced.push((name.clone(), format!("{field}_{reduction}")));
        }
    }

    let grouped = aggregate(view, &key_spec)?
        .into_table()
        .filter_rows(|row| !row[0].is_null());

    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut imputed = 0usize;
    for (name, source) in &reduced {
        let column = grouped
            .numeric_column(source)?
            .into_iter()
            .map(|v| {
                v.unwrap_or_else(|| {
                    imputed += 1;
                    0.0
                })
            })
            .collect();
        names.push(name.clone());
        columns.push(column);
    }

    for feature in &spec.features {
        if let EntityFeature::Ratio {
            name,
            numerator,
            denominator,
        } = feature
        {
            let num = names.iter().position(|n| n == numerator);
            let den = names.iter().position(|n| n == denominator);
            let (Some(num), Some(den)) = (num, den) else {
                warn!(feature = %name, "ratio inputs unavailable, feature skipped");
                continue;
            };
            let column = columns[num]
                .iter()
                .zip(&columns[den])
                .map(|(n, d)| if *d == 0.0 { 0.0 } else { n / d })
                .collect();
            names.push(name.clone());
            columns.push(column);
        }
    }

    if imputed > 0 {
        warn!(count = imputed, "imputed null entity feature values with 0");
    }

    let n = grouped.len();
    let width = columns.len();
    let mut values = Array2::zeros((n, width));
    for (j, column) in columns.iter().enumerate() {
        for (i, v) in column.iter().enumerate() {
            values[[i, j]] = *v;
        }
    }

    let entities = grouped.column(&spec.entity_field)?.into_iter().cloned().collect();
    debug!(entities = n, features = width, "built entity features");
    Ok(EntityFeatureTable {
        entity_field: spec.entity_field.clone(),
        entities,
        feature_names: names,
        values,
    })
}

fn clustering_error(err: impl fmt::Display) -> PipelineError {
    PipelineError::ClusteringError(err.to_string())
}

/// Rescales each column to zero mean and unit population variance
#[derive(Debug, Clone)]
pub struct StandardScaler {
    inner: LinearScaler<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(PipelineError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        let dataset = Dataset::new(data.clone(), Array1::<usize>::zeros(data.nrows()));
        let inner = LinearScaler::standard().fit(&dataset).map_err(clustering_error)?;
        Ok(Self { inner })
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        self.inner.transform(data.clone())
    }
}

/// K-means settings; fitting runs linfa's k-means++ seeded Lloyd iterations
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    k: usize,
    seed: u64,
    n_init: usize,
    max_iter: usize,
    tolerance: f64,
}

/// Result of a k-means fit
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// Cluster label per point, each in `0..k`
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    /// Sum of squared distances from points to their centroid
    pub inertia: f64,
    /// Labels that ended up with no members
    pub empty_clusters: Vec<usize>,
}

fn inertia(data: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    data.outer_iter()
        .zip(labels)
        .map(|(point, &label)| {
            point
                .iter()
                .zip(centroids.row(label).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
        })
        .sum()
}

/// Labels in `0..k` that no point carries
fn empty_clusters(labels: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    for &label in labels {
        if label < k {
            sizes[label] += 1;
        }
    }
    (0..k).filter(|&c| sizes[c] == 0).collect()
}

fn distinct_rows(data: &Array2<f64>) -> usize {
    data.outer_iter()
        .map(|row| {
            row.iter()
                .map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() })
                .collect::<Vec<u64>>()
        })
        .collect::<BTreeSet<_>>()
        .len()
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: 42,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(PipelineError::InvalidParameter(
                "Number of clusters must be at least 1".to_string(),
            ));
        }
        if self.n_init == 0 || self.max_iter == 0 {
            return Err(PipelineError::InvalidParameter(
                "n_init and max_iter must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "Tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Cluster the rows of `data`, keeping the best of `n_init` runs.
    ///
    /// Needs at least `k` distinct rows; identical rows cannot seed
    /// separate centroids.
    pub fn fit(&self, data: &Array2<f64>) -> Result<ClusterAssignment> {
        self.validate()?;
        if data.nrows() < self.k {
            return Err(PipelineError::InsufficientData {
                required: self.k,
                available: data.nrows(),
            });
        }
        let distinct = distinct_rows(data);
        if distinct < self.k {
            return Err(PipelineError::InsufficientData {
                required: self.k,
                available: distinct,
            });
        }

        let dataset = Dataset::new(data.clone(), Array1::<usize>::zeros(data.nrows()));
        let rng = StdRng::seed_from_u64(self.seed);
        let model = LinfaKMeans::params_with(self.k, rng, L2Dist)
            .n_runs(self.n_init)
            .max_n_iterations(self.max_iter as u64)
            .tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(clustering_error)?;

        let labels: Array1<usize> = model.predict(&dataset);
        let labels = labels.to_vec();
        let centroids = model.centroids().clone();
        let inertia = inertia(data, &labels, &centroids);
        debug!(k = self.k, runs = self.n_init, inertia, "k-means fit");

        Ok(ClusterAssignment {
            empty_clusters: empty_clusters(&labels, self.k),
            labels,
            centroids,
            inertia,
        })
    }
}

/// Member count and raw feature means of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub label: usize,
    pub members: usize,
    /// Mean of each raw feature; `None` for an empty cluster
    pub means: Vec<Option<f64>>,
}

/// Segmentation output for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationReport {
    pub features: EntityFeatureTable,
    pub assignment: ClusterAssignment,
    pub summaries: Vec<ClusterSummary>,
}

/// Display name of a cluster label, 1-based
pub fn segment_name(label: usize) -> String {
    format!("Segment {}", label + 1)
}

impl SegmentationReport {
    pub fn k(&self) -> usize {
        self.summaries.len()
    }

    pub fn label_of(&self, entity: &Value) -> Option<usize> {
        self.features
            .entities()
            .iter()
            .position(|e| e == entity)
            .map(|i| self.assignment.labels[i])
    }

    /// Entities grouped by cluster, ignoring label numbering order
    pub fn partition(&self) -> Vec<Vec<Value>> {
        let mut groups = vec![Vec::new(); self.k()];
        for (entity, &label) in self.features.entities().iter().zip(&self.assignment.labels) {
            groups[label].push(entity.clone());
        }
        groups
    }

    /// Raw features per entity plus a `Segment` column
    pub fn assignment_table(&self) -> Result<Table> {
        let base = self.features.to_table()?;
        let mut columns = base.columns().to_vec();
        columns.push("Segment".to_string());
        let rows = base
            .rows()
            .iter()
            .zip(&self.assignment.labels)
            .map(|(row, label)| {
                let mut row = row.clone();
                row.push(Value::Text(segment_name(*label)));
                row
            })
            .collect();
        Table::from_rows(columns, rows)
    }

    /// `Segment`, `Count`, then the mean of each raw feature
    pub fn summary_table(&self) -> Result<Table> {
        let mut columns = vec!["Segment".to_string(), "Count".to_string()];
        columns.extend(self.features.feature_names().iter().map(|n| format!("Avg {n}")));
        let rows = self
            .summaries
            .iter()
            .map(|s| {
                let mut row = vec![Value::Text(segment_name(s.label)), Value::Number(s.members as f64)];
                row.extend(s.means.iter().map(|m| Value::from(*m)));
                row
            })
            .collect();
        Table::from_rows(columns, rows)
    }
}

impl fmt::Display for SegmentationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Segmentation of {} entities into {} clusters (inertia {:.3})",
            self.features.len(),
            self.k(),
            self.assignment.inertia
        )?;
        for s in &self.summaries {
            writeln!(f, "  {}: {} members", segment_name(s.label), s.members)?;
        }
        Ok(())
    }
}

/// Cluster already-built entity features
pub fn segment_features(features: EntityFeatureTable, kmeans: &KMeans) -> Result<SegmentationReport> {
    kmeans.validate()?;
    if features.len() < kmeans.k() {
        return Err(PipelineError::InsufficientData {
            required: kmeans.k(),
            available: features.len(),
        });
    }

    let scaler = StandardScaler::fit(features.values())?;
    let assignment = kmeans.fit(&scaler.transform(features.values()))?;
    if !assignment.empty_clusters.is_empty() {
        warn!(clusters = ?assignment.empty_clusters, "k-means left clusters empty");
    }

    let raw = features.values();
    let summaries = (0..kmeans.k())
        .map(|label| {
            let members: Vec<usize> = assignment
                .labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == label)
                .map(|(i, _)| i)
                .collect();
            let means = (0..raw.ncols())
                .map(|j| {
                    (!members.is_empty()).then(|| {
                        members.iter().map(|&i| raw[[i, j]]).sum::<f64>() / members.len() as f64
                    })
                })
                .collect();
            ClusterSummary {
                label,
                members: members.len(),
                means,
            }
        })
        .collect();

    info!(
        entities = features.len(),
        k = kmeans.k(),
        inertia = assignment.inertia,
        "segmentation complete"
    );
    Ok(SegmentationReport {
        features,
        assignment,
        summaries,
    })
}

/// Build entity features from a view and cluster them
pub fn segment(view: &FilteredView, spec: &EntityFeatureSpec, kmeans: &KMeans) -> Result<SegmentationReport> {
    let features = entity_features(view, spec)?;
    segment_features(features, kmeans)
}
