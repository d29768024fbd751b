//! Integration tests for univariate drift detection and alert ranking

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use driftguard::calculator::Calculator;
use driftguard::chunk::{ChunkerConfig, IncompleteChunk, Period, PeriodOffset};
use driftguard::drift::{
    AlertCountRanker, ColumnValues, DriftMethod, JensenShannonDistance, MethodSettings, UnivariateDriftCalculator,
    UnivariateDriftConfig, CHI2, JENSEN_SHANNON, KOLMOGOROV_SMIRNOV,
};
use driftguard::result::{ResultFilter, ResultKey, ResultKind};
use driftguard::DriftGuardError;
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
        + TimeDelta::days(offset)
}

/// One row every 10 minutes from `first_day` on, `shift` moving `num` and
/// replacing every category by `c`
fn daily_frame(first_day: i64, days: usize, shift: f64, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = days * 144;
    let timestamps: Vec<String> = (0..n)
        .map(|i| (day(first_day) + TimeDelta::minutes(10 * i as i64)).format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();
    let num: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() * 10.0 + shift).collect();
    let cat: Vec<&str> = (0..n)
        .map(|_| {
            if shift > 0.0 {
                "c"
            } else if rng.gen_bool(0.5) {
                "a"
            } else {
                "b"
            }
        })
        .collect();
    df!("timestamp" => timestamps, "num" => num, "cat" => cat).unwrap()
}

fn daily_config() -> UnivariateDriftConfig {
    UnivariateDriftConfig::new(["num", "cat"])
        .with_timestamp_column("timestamp")
        .with_chunker(ChunkerConfig::Period {
            offset: PeriodOffset::Day,
            timestamp_column: None,
        })
        .with_continuous_methods([JENSEN_SHANNON, KOLMOGOROV_SMIRNOV])
        .with_categorical_methods([JENSEN_SHANNON, CHI2])
}

// ============================================================================
// Repeated calculation
// ============================================================================

#[test]
fn test_repeated_calculate_returns_each_batch() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 10, 0.0, 1)).unwrap();

    for (batch, first_day) in [10_i64, 11, 12].into_iter().enumerate() {
        let result = calc.calculate(&daily_frame(first_day, 1, 0.0, 10 + batch as u64)).unwrap();
        let analysis = result.filter(&ResultFilter::new().with_period(Period::Analysis)).unwrap();
        assert_eq!(analysis.len(), 1);
        let chunk = &analysis.rows()[0].chunk;
        assert_eq!(chunk.start_date, Some(day(first_day)));
        assert_eq!(chunk.end_date, Some(day(first_day + 1) - TimeDelta::nanoseconds(1)));

        let reference = result.filter(&ResultFilter::new().with_period(Period::Reference)).unwrap();
        assert_eq!(reference.len(), 10);
    }

    let cumulative = calc.cumulative_result().unwrap();
    assert_eq!(cumulative.len(), 13);
    let analysis_days: Vec<_> = cumulative
        .rows()
        .iter()
        .filter(|r| r.chunk.period == Period::Analysis)
        .map(|r| r.chunk.start_date)
        .collect();
    assert_eq!(analysis_days, vec![Some(day(10)), Some(day(11)), Some(day(12))]);
}

#[test]
fn test_reference_rows_are_stable_across_calls() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 5, 0.0, 2)).unwrap();
    let first = calc.calculate(&daily_frame(5, 1, 0.0, 3)).unwrap();
    let second = calc.calculate(&daily_frame(6, 1, 3.0, 4)).unwrap();
    let reference = |r: &driftguard::result::MonitoringResult| {
        r.filter(&ResultFilter::new().with_period(Period::Reference))
            .unwrap()
            .rows()
            .to_vec()
    };
    assert_eq!(reference(&first), reference(&second));
}

// ============================================================================
// Methods
// ============================================================================

#[test]
fn test_chi2_with_collapsed_category() {
    let config = UnivariateDriftConfig::new(["cat"])
        .with_chunker(ChunkerConfig::Size {
            chunk_size: 144,
            incomplete: IncompleteChunk::Keep,
        })
        .with_categorical_methods([CHI2]);
    let mut calc = UnivariateDriftCalculator::new(config).unwrap();
    calc.fit(&daily_frame(0, 5, 0.0, 5)).unwrap();

    let collapsed = df!("cat" => vec!["a"; 144]).unwrap();
    let result = calc.calculate(&collapsed).unwrap();
    let record = result.rows().last().unwrap().values[&ResultKey::new("cat", CHI2)];
    assert!(record.value.is_finite());
    let p_value = record.p_value.unwrap();
    assert!(p_value.is_finite());
    assert!(p_value < 0.05);
    assert!(record.alert);
}

#[test]
fn test_drift_detected_on_shifted_batch() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 7, 0.0, 6)).unwrap();
    let result = calc.calculate(&daily_frame(7, 2, 20.0, 7)).unwrap();
    let analysis = result.filter(&ResultFilter::new().with_period(Period::Analysis)).unwrap();
    assert_eq!(analysis.len(), 2);
    for row in analysis.rows() {
        for method in [JENSEN_SHANNON, KOLMOGOROV_SMIRNOV] {
            let record = &row.values[&ResultKey::new("num", method)];
            assert!(record.alert, "{} did not alert", method);
        }
        let js = &row.values[&ResultKey::new("cat", JENSEN_SHANNON)];
        assert!(js.value <= 1.0);
        assert!(js.alert);
    }
}

#[test]
fn test_jensen_shannon_bounded_with_unseen_categories() {
    let mut method = JensenShannonDistance::new(&MethodSettings::default());
    method
        .fit(&ColumnValues::Categorical(vec!["a".into(), "b".into(), "a".into()]))
        .unwrap();
    let (disjoint, _) = method
        .statistic(&ColumnValues::Categorical(vec!["x".into(), "y".into()]))
        .unwrap();
    assert!(disjoint <= 1.0 + 1e-12);
    assert!(disjoint > 0.99);
    let (same, _) = method
        .statistic(&ColumnValues::Categorical(vec!["a".into(), "b".into(), "a".into()]))
        .unwrap();
    assert!(same.abs() < 1e-12);
}

#[test]
fn test_high_cardinality_numbers_are_continuous() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 3, 0.0, 8)).unwrap();
    let types = calc.feature_types().unwrap();
    assert_eq!(types[0].0, "num");
    assert_eq!(types[0].1.to_string(), "continuous");
    assert_eq!(types[1].1.to_string(), "categorical");
}

// ============================================================================
// Results
// ============================================================================

#[test]
fn test_filter_by_method_and_column() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 4, 0.0, 9)).unwrap();
    let result = calc.calculate(&daily_frame(4, 2, 0.0, 10)).unwrap();

    let filtered = result
        .filter(&ResultFilter::new().with_metrics([JENSEN_SHANNON]).with_column_names(["num"]))
        .unwrap();
    assert_eq!(filtered.len(), result.len());
    assert!(filtered.rows().iter().all(|r| r.values.len() == 1));
    assert_eq!(filtered.metadata().entries.len(), 1);
    // the source result is untouched
    assert_eq!(result.rows()[0].values.len(), 4);

    assert!(matches!(
        result.filter(&ResultFilter::new().with_metrics(["wasserstein"])),
        Err(DriftGuardError::InvalidArguments(_))
    ));
}

#[test]
fn test_result_to_dataframe() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 3, 0.0, 11)).unwrap();
    let df = calc.calculate(&daily_frame(3, 1, 0.0, 12)).unwrap().to_dataframe().unwrap();

    assert_eq!(df.height(), 4);
    let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    for expected in [
        "chunk_key",
        "period",
        "num_jensen_shannon_value",
        "num_kolmogorov_smirnov_p_value",
        "cat_chi2_alert",
        "cat_jensen_shannon_upper_threshold",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing column {}", expected);
    }
    assert!(!names.iter().any(|n| n == "num_jensen_shannon_p_value"));
}

#[test]
fn test_alert_count_ranking() {
    let mut calc = UnivariateDriftCalculator::new(daily_config()).unwrap();
    calc.fit(&daily_frame(0, 7, 0.0, 13)).unwrap();
    let mut shifted = daily_frame(7, 2, 0.0, 14);
    let moved: Vec<f64> = (0..shifted.height()).map(|i| 50.0 + i as f64).collect();
    shifted.replace("num", Series::new("num".into(), moved)).unwrap();
    let result = calc.calculate(&shifted).unwrap();

    let ranking = AlertCountRanker::new().rank(&result, false).unwrap();
    assert_eq!(ranking[0].column_name, "num");
    assert_eq!(ranking[0].rank, 1);
    assert_eq!(ranking[0].number_of_alerts, 4);
    assert!(ranking.iter().all(|r| r.number_of_alerts <= 4));

    let reference_only = result.filter(&ResultFilter::new().with_period(Period::Reference)).unwrap();
    assert!(AlertCountRanker::new().rank(&reference_only, true).is_err());
    assert_eq!(result.kind(), ResultKind::UnivariateDrift);
}
