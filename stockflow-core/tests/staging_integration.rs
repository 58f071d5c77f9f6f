//! Integration tests for the staging store, providers and feature pipeline
//! wired together without the runner.

use chrono::NaiveDate;
use std::path::PathBuf;
use stockflow_core::data::{
    CsvImportProvider, DataProvider, FileStagingStore, MemoryStagingStore, StagingStore,
    SyntheticProvider,
};
use stockflow_core::{
    ConsolidatedTable, EtlError, Panel, PartitionKey, Phase, RawBar, TransformParams,
};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/yfinance")
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn key() -> PartitionKey {
    PartitionKey::parse("2024_06_03").unwrap()
}

fn closes(values: &[f64]) -> Vec<RawBar> {
    values
        .iter()
        .enumerate()
        .map(|(i, &c)| RawBar::flat(d("2024-01-02") + chrono::Duration::days(i as i64), c, 1000.0))
        .collect()
}

/// Read each ticker back from the store and run every feature.
fn transform(store: &dyn StagingStore, tickers: &[&str], params: TransformParams) -> ConsolidatedTable {
    let raw = tickers
        .iter()
        .map(|t| (t.to_string(), store.read_raw(&key(), t).unwrap()))
        .collect();
    let mut panel = Panel::from_partition(&key(), raw).unwrap();
    panel.clean();
    panel.add_features(&params).unwrap();
    panel.into_consolidated(params).unwrap()
}

#[test]
fn two_tickers_one_to_five() {
    let store = MemoryStagingStore::new();
    for ticker in ["AAPL", "MSFT"] {
        store
            .write_raw(&key(), ticker, &closes(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
    }

    let table = transform(&store, &["AAPL", "MSFT"], TransformParams::new(2, 2).unwrap());
    assert_eq!(table.len(), 10);

    for ticker in ["AAPL", "MSFT"] {
        let rows: Vec<_> = table.rows().iter().filter(|r| r.ticker == ticker).collect();
        let roll: Vec<f64> = rows.iter().map(|r| r.roll_avg.unwrap()).collect();
        assert_eq!(roll, vec![1.0, 1.5, 2.5, 3.5, 4.5]);

        let ema: Vec<f64> = rows.iter().map(|r| r.ema.unwrap()).collect();
        let expected = [1.0, 1.67, 2.56, 3.52, 4.51];
        for (got, want) in ema.iter().zip(expected) {
            assert!((got - want).abs() < 0.01, "EMA2 {got} vs {want}");
        }

        assert_eq!(rows[0].daily_return, None);
        assert_eq!(rows[1].daily_return, Some(1.0));
        // EMA lags the rising series: rolling average sits below it after row 0.
        assert_eq!(rows[0].crossover, 0);
        assert!(rows[1..].iter().all(|r| r.crossover == -1));
    }
}

#[test]
fn missing_mid_series_close_is_forward_filled() {
    let store = MemoryStagingStore::new();
    let mut bars = closes(&[10.0, 11.0, 12.0, 13.0]);
    bars[2].close = None;
    store.write_raw(&key(), "AAPL", &bars).unwrap();

    let table = transform(&store, &["AAPL"], TransformParams::new(3, 3).unwrap());
    assert_eq!(table.rows()[2].close, Some(11.0));
    assert_eq!(table.rows()[2].daily_return, Some(0.0));
}

#[test]
fn all_empty_partition_is_empty_input() {
    let store = MemoryStagingStore::new();
    store.write_raw(&key(), "AAPL", &[]).unwrap();
    store.write_raw(&key(), "MSFT", &[]).unwrap();

    let raw = ["AAPL", "MSFT"]
        .iter()
        .map(|t| (t.to_string(), store.read_raw(&key(), t).unwrap()))
        .collect();
    assert!(matches!(
        Panel::from_partition(&key(), raw),
        Err(EtlError::EmptyInput { .. })
    ));
}

#[test]
fn yfinance_exports_flow_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStagingStore::new(dir.path());
    let provider = CsvImportProvider::new(fixture_dir());

    for ticker in ["AAPL", "MSFT"] {
        let fetched = provider
            .fetch(ticker, d("2024-01-01"), d("2024-01-10"))
            .unwrap();
        assert_eq!(fetched.bars.len(), 6, "2024-01-10 is excluded");
        store.write_raw(&key(), ticker, &fetched.bars).unwrap();
    }

    let params = TransformParams::new(3, 5).unwrap();
    let table = transform(&store, &["AAPL", "MSFT"], params);
    let staged = store.write_consolidated(&key(), &table).unwrap();
    assert!(staged.path.ends_with("transform/2024_06_03/transformed_data.csv"));

    let back = store.read_consolidated(&key()).unwrap();
    assert_eq!(back.params(), params);
    assert_eq!(back.len(), 12);
    assert_eq!(back.tickers(), vec!["AAPL", "MSFT"]);
    assert_eq!(back.rows()[0].adj_close, Some(184.290421));
    assert_eq!(
        store.list_partitions(Phase::Transform).unwrap(),
        vec![key()]
    );
}

#[test]
fn synthetic_future_range_stages_header_only_file() {
    let store = MemoryStagingStore::new();
    let provider = SyntheticProvider::new();
    let fetched = provider
        .fetch("AAPL", d("2999-01-01"), d("2999-02-01"))
        .unwrap();
    assert!(fetched.bars.is_empty());

    store.write_raw(&key(), "AAPL", &fetched.bars).unwrap();
    assert!(store.read_raw(&key(), "AAPL").unwrap().is_empty());
}

#[test]
fn unproduced_partition_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStagingStore::new(dir.path());
    let err = store.read_consolidated(&key()).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("transformed_data.csv"));
}
