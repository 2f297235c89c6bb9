use std::fs;
use std::path::Path;

use goldenberry_metrics::{
    ErrorKind, GraphConnection, GraphSource, GraphStore, MetricsConfig, MetricsError,
    MetricsService, Traversal,
};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn fixture() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write(
        p,
        "products.csv",
        "name\nGoldenberries (Physalis)\nPitahaya (Dragon Fruit)\n",
    );
    write(
        p,
        "revenue_streams.csv",
        "stream_id,product\nRS-GB,Goldenberries (Physalis)\nRS-PH,Pitahaya (Dragon Fruit)\n",
    );
    write(
        p,
        "time_periods.csv",
        "period_id,year,month,quarter\n2024-07,2024,7,Q3\n2024-08,2024,8,3\n2024-10,2024,10,\n",
    );
    write(
        p,
        "prices.csv",
        "product,period_id,price\n\
         Goldenberries (Physalis),2024-07,2.5\n\
         Goldenberries (Physalis),2024-08,3.0\n\
         Pitahaya (Dragon Fruit),2024-10,6.0\n",
    );
    write(
        p,
        "volumes.csv",
        "product,period_id,volume\n\
         Goldenberries (Physalis),2024-07,200\n\
         Goldenberries (Physalis),2024-08,100\n\
         Pitahaya (Dragon Fruit),2024-10,50\n",
    );
    write(
        p,
        "cost_structures.csv",
        "name\nFruit Procurement\nPackaging\nPersonnel\n",
    );
    write(
        p,
        "costs.csv",
        "structure,product,period_id,amount,cost_behavior\n\
         Fruit Procurement,Goldenberries (Physalis),2024-07,300,variable\n\
         Packaging,Goldenberries (Physalis),2024-07,40,Variable\n\
         Personnel,,2024-08,500,fixed\n",
    );
    dir
}

#[test]
fn loads_a_csv_directory() {
    let dir = fixture();
    let store = GraphStore::load_dir(dir.path()).unwrap();
    assert_eq!(store.product_count(), 2);

    let service = MetricsService::new(&store);
    assert_eq!(service.total_revenue().unwrap(), 500.0 + 300.0 + 300.0);
    assert_eq!(service.total_volume().unwrap(), 350.0);
    assert_eq!(service.total_costs().unwrap(), 840.0);
    assert_eq!(service.variable_costs().unwrap(), 340.0);
    assert_eq!(service.fixed_costs().unwrap(), 500.0);

    let streams = service.revenue_streams().unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].stream, "RS-GB");
}

#[test]
fn stored_quarters_are_normalized() {
    let dir = fixture();
    let service = MetricsService::new(GraphStore::load_dir(dir.path()).unwrap());
    let quarters: Vec<u32> = service
        .quarterly_revenue()
        .unwrap()
        .iter()
        .map(|q| q.quarter)
        .collect();
    // "Q3" and 3 land in the same quarter; a blank cell becomes 0.
    assert_eq!(quarters, vec![0, 3]);
}

#[test]
fn connection_over_fixture_reports_status() {
    let dir = fixture();
    let config = MetricsConfig {
        data_dir: dir.path().to_path_buf(),
        ..MetricsConfig::default()
    };
    let connection = GraphConnection::open(&config);
    let status = connection.status();
    assert!(status.connected);
    assert_eq!(status.error_message, None);
    assert_eq!(connection.run(&Traversal::Products).unwrap().height(), 2);
    connection.close();
}

#[test]
fn missing_required_column_is_reported() {
    let dir = fixture();
    write(dir.path(), "prices.csv", "product,period_id\nGoldenberries (Physalis),2024-07\n");
    let err = GraphStore::load_dir(dir.path()).unwrap_err();
    match err {
        MetricsError::MissingColumn(message) => assert_eq!(message, "prices.csv: price"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn bad_rows_are_invalid_data() {
    let dir = fixture();
    write(
        dir.path(),
        "volumes.csv",
        "product,period_id,volume\nGoldenberries (Physalis),2024-07,lots\n",
    );
    let err = GraphStore::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, MetricsError::InvalidData(_)));
    assert_eq!(err.kind(), ErrorKind::Data);

    let dir = fixture();
    write(
        dir.path(),
        "prices.csv",
        "product,period_id,price\nKiwano,2024-07,1.0\n",
    );
    assert!(matches!(
        GraphStore::load_dir(dir.path()),
        Err(MetricsError::InvalidData(_))
    ));
}

#[test]
fn revenue_streams_file_is_optional() {
    let dir = fixture();
    fs::remove_file(dir.path().join("revenue_streams.csv")).unwrap();
    let service = MetricsService::new(GraphStore::load_dir(dir.path()).unwrap());
    assert!(service.revenue_streams().unwrap().is_empty());
    assert_eq!(service.product_count().unwrap(), 2);
}

#[test]
fn missing_file_fails_the_load() {
    let dir = fixture();
    fs::remove_file(dir.path().join("costs.csv")).unwrap();
    let config = MetricsConfig {
        data_dir: dir.path().to_path_buf(),
        ..MetricsConfig::default()
    };
    let connection = GraphConnection::open(&config);
    assert!(!connection.is_connected());
    let err = MetricsService::new(&connection).total_costs().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
