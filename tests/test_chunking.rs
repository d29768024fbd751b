//! Integration tests for chunking: partitions, calendar periods and transitions

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use driftguard::chunk::{
    Chunker, ChunkerConfig, CountBasedChunker, DefaultChunker, IncompleteChunk, Period, PeriodBasedChunker,
    PeriodOffset, SizeBasedChunker,
};
use polars::prelude::*;

fn start() -> NaiveDateTime {
    // a Monday
    NaiveDate::from_ymd_opt(2020, 1, 6)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Rows at a fixed cadence with timestamps stored as strings
fn timestamped_frame(n: usize, cadence: TimeDelta) -> DataFrame {
    let timestamps: Vec<String> = (0..n)
        .map(|i| (start() + cadence * i as i32).format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();
    let values: Vec<f64> = (0..n).map(|i| (i % 17) as f64).collect();
    df!("timestamp" => timestamps, "x" => values).unwrap()
}

// ============================================================================
// Calendar periods
// ============================================================================

#[test]
fn test_weekly_chunks_of_ten_minute_data() {
    let df = timestamped_frame(20_160, TimeDelta::minutes(10));
    let chunker = PeriodBasedChunker::new(PeriodOffset::Week);
    let chunks = chunker.split(&df, Some("timestamp"), None, 1).unwrap();

    assert_eq!(chunks.len(), 20);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.len(), 1008);
        let begin = chunk.start_datetime.unwrap();
        let end = chunk.end_datetime.unwrap();
        assert_eq!(begin, start() + TimeDelta::weeks(i as i64));
        assert_eq!(end - begin + TimeDelta::nanoseconds(1), TimeDelta::days(7));
    }
    assert_eq!(chunks[0].key, "2020-01-06/2020-01-12");
}

#[test]
fn test_period_chunker_from_config() {
    let df = timestamped_frame(96, TimeDelta::hours(1));
    let chunker = ChunkerConfig::from_options(None, None, Some(PeriodOffset::Day))
        .unwrap()
        .build()
        .unwrap();
    let chunks = chunker.split(&df, Some("timestamp"), None, 1).unwrap();
    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|c| c.len() == 24));
}

#[test]
fn test_conflicting_chunker_options_rejected() {
    assert!(ChunkerConfig::from_options(Some(100), Some(5), None).is_err());
    assert!(ChunkerConfig::from_options(Some(100), None, Some(PeriodOffset::Week)).is_err());
}

// ============================================================================
// Row-based chunkers
// ============================================================================

#[test]
fn test_chunkers_partition_every_row() {
    let df = timestamped_frame(2_345, TimeDelta::minutes(1));
    let chunkers: Vec<Box<dyn Chunker>> = vec![
        Box::new(SizeBasedChunker::new(500).unwrap()),
        Box::new(SizeBasedChunker::new(500).unwrap().with_incomplete(IncompleteChunk::Append)),
        Box::new(CountBasedChunker::new(6).unwrap()),
        Box::new(DefaultChunker::new()),
    ];
    for chunker in chunkers {
        let chunks = chunker.split(&df, None, None, 1).unwrap();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 2_345, "{}", chunker);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_index + 1, pair[1].start_index);
        }
    }
}

#[test]
fn test_timestamps_give_chunk_bounds() {
    let df = timestamped_frame(100, TimeDelta::minutes(1));
    let chunks = SizeBasedChunker::new(50)
        .unwrap()
        .split(&df, Some("timestamp"), None, 1)
        .unwrap();
    assert_eq!(chunks[1].start_datetime, Some(start() + TimeDelta::minutes(50)));
    assert_eq!(chunks[1].end_datetime, Some(start() + TimeDelta::minutes(99)));
}

#[test]
fn test_transition_chunk_is_analysis() {
    let periods: Vec<&str> = (0..100).map(|i| if i < 30 { "reference" } else { "analysis" }).collect();
    let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let df = df!("period" => periods, "x" => values).unwrap();

    let chunks = SizeBasedChunker::new(20).unwrap().split(&df, None, None, 1).unwrap();
    assert_eq!(chunks[0].period, Period::Reference);
    assert!(!chunks[0].is_transition);
    assert_eq!(chunks[1].period, Period::Analysis);
    assert!(chunks[1].is_transition);
    assert!(chunks[2..].iter().all(|c| c.period == Period::Analysis && !c.is_transition));
}

#[test]
fn test_selected_columns_only() {
    let df = timestamped_frame(100, TimeDelta::minutes(1));
    let columns = vec!["x".to_string()];
    let chunks = CountBasedChunker::new(2)
        .unwrap()
        .split(&df, None, Some(columns.as_slice()), 1)
        .unwrap();
    assert_eq!(chunks[0].data.width(), 1);
    assert!(CountBasedChunker::new(2)
        .unwrap()
        .split(&df, None, Some(&["y".to_string()][..]), 1)
        .is_err());
}
