use dash_pipeline::data::{DataSource, Record, RecordSet};
use dash_pipeline::filter::FilteredView;
use dash_pipeline::schema::{Field, FieldKind, Schema, Value};
use dash_pipeline::segmentation::{
    entity_features, segment, segment_name, EntityFeatureSpec, KMeans,
};
use dash_pipeline::{PipelineError, SyntheticSalesSource};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

fn schema() -> Schema {
    Schema::new(vec![
        Field::required("CustomerID", FieldKind::Categorical),
        Field::required("OrderID", FieldKind::Categorical),
        Field::required("Revenue", FieldKind::Numeric),
        Field::optional("CustomerAge", FieldKind::Numeric),
    ])
    .unwrap()
}

fn view(rows: &[(&str, Option<&str>, f64, Option<f64>)]) -> FilteredView {
    let records = rows
        .iter()
        .map(|(customer, order, revenue, age)| {
            Record::new(vec![
                Value::from(*customer),
                Value::from(*order),
                Value::Number(*revenue),
                Value::from(*age),
            ])
        })
        .collect();
    FilteredView::all(&Arc::new(RecordSet::new(schema(), records).unwrap()))
}

fn partition_set(groups: Vec<Vec<Value>>) -> BTreeSet<Vec<String>> {
    groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| g.iter().map(|v| v.to_string()).collect())
        .collect()
}

#[test]
fn test_customer_features() {
    let v = view(&[
        ("c1", Some("o1"), 10.0, Some(30.0)),
        ("c1", Some("o2"), 30.0, Some(30.0)),
        ("c2", Some("o3"), 5.0, None),
        ("c3", None, 8.0, Some(41.0)),
    ]);
    let features = entity_features(&v, &EntityFeatureSpec::customer()).unwrap();

    assert_eq!(
        features.feature_names(),
        &["TotalSpent", "OrderCount", "Age", "AvgOrderValue"]
    );
    assert_eq!(features.len(), 3);
    let values = features.values();
    // c1
    assert_eq!(values.row(0).to_vec(), vec![40.0, 2.0, 30.0, 20.0]);
    // c2: null age imputed with 0
    assert_eq!(values[[1, 2]], 0.0);
    // c3: no order ids, so the average is 0 rather than undefined
    assert_eq!(values[[2, 1]], 0.0);
    assert_eq!(values[[2, 3]], 0.0);
}

#[test]
fn test_same_seed_same_partition() {
    let source = SyntheticSalesSource::new(42)
        .with_date_range(
            chrono::NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        )
        .unwrap();
    let v = FilteredView::all(&Arc::new(source.load().unwrap()));
    let kmeans = KMeans::new(3).with_seed(42);

    let a = segment(&v, &EntityFeatureSpec::customer(), &kmeans).unwrap();
    let b = segment(&v, &EntityFeatureSpec::customer(), &kmeans).unwrap();
    assert_eq!(partition_set(a.partition()), partition_set(b.partition()));
    assert_eq!(
        a.summaries.iter().map(|s| s.members).sum::<usize>(),
        a.features.len()
    );
}

#[test]
fn test_more_clusters_than_entities() {
    let v = view(&[
        ("c1", Some("o1"), 10.0, Some(20.0)),
        ("c2", Some("o2"), 20.0, Some(40.0)),
    ]);
    let err = segment(&v, &EntityFeatureSpec::customer(), &KMeans::new(3)).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientData {
            required: 3,
            available: 2
        }
    ));
}

#[test]
fn test_summary_uses_raw_values() {
    let v = view(&[
        ("a", Some("o1"), 10.0, Some(20.0)),
        ("b", Some("o2"), 12.0, Some(22.0)),
        ("c", Some("o3"), 500.0, Some(60.0)),
        ("d", Some("o4"), 520.0, Some(62.0)),
    ]);
    let report = segment(&v, &EntityFeatureSpec::customer(), &KMeans::new(2)).unwrap();

    let low = report.label_of(&Value::from("a")).unwrap();
    assert_eq!(report.label_of(&Value::from("b")), Some(low));
    assert_ne!(report.label_of(&Value::from("c")), Some(low));

    let summary = &report.summaries[low];
    assert_eq!(summary.members, 2);
    assert_eq!(summary.means[0], Some(11.0));

    let table = report.summary_table().unwrap();
    assert_eq!(table.columns()[0], "Segment");
    assert_eq!(table.value(low, "Segment").unwrap(), &Value::Text(segment_name(low)));
    assert_eq!(report.assignment_table().unwrap().len(), 4);
}
