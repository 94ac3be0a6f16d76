use posdbos_signal::{
    ChannelConfig, ChannelKind, ChannelSet, Config, SignalError, TableInput, TimeSeriesTable,
    TIMESTAMP_STRING, TIME_START,
};
use std::io::Write;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Three rows at 4 Hz without a timestamp column
fn small_table() -> TimeSeriesTable {
    let input = TableInput::from_rows(
        header(&["X", "AF3", "ECG"]),
        &[
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 4.0],
            vec![1.0, 2.0, 5.0],
        ],
    )
    .expect("rows are rectangular")
    .with_sampling_rate(4.0)
    .with_file_path("session_01.csv");
    TimeSeriesTable::new(input, &ChannelConfig::default()).expect("valid table")
}

/// `n` rows at `rate` Hz with a sinusoidal EEG channel and a flat gyro axis
fn recording(n: usize, rate: f64, config: &ChannelConfig) -> TimeSeriesTable {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let t = i as f64 / rate;
            vec![
                TIME_START + t,
                (2.0 * std::f64::consts::PI * 6.0 * t).sin() * 20.0,
                (2.0 * std::f64::consts::PI * 9.0 * t).cos() * 15.0,
                1.5,
            ]
        })
        .collect();
    let input = TableInput::from_rows(header(&[TIMESTAMP_STRING, "AF3", "F7", "X"]), &rows)
        .expect("rows are rectangular")
        .with_file_path("session_02.csv");
    TimeSeriesTable::new(input, config).expect("valid table")
}

#[test]
fn test_timestamp_synthesized_from_rate() {
    init_logging();
    let table = small_table();

    assert_eq!(table.header(), &header(&["Timestamp", "X", "AF3", "ECG"])[..]);
    let time = table.get_column(TIMESTAMP_STRING).unwrap();
    let expected = [TIME_START, TIME_START + 0.25, TIME_START + 0.5];
    for (t, e) in time.iter().zip(expected) {
        assert!((t - e).abs() < 1e-9, "{} != {}", t, e);
    }
    assert_eq!(table.sampling_rate(), 4.0);
    assert!(table.get_column("ZZZ").is_none());
    assert_eq!(table.kind_of("X"), Some(ChannelKind::Gyro));
    assert_eq!(table.kind_of("ECG"), Some(ChannelKind::Ecg));
    assert_eq!(table.get_ecg_header(), Some("ECG"));
    assert_eq!(table.to_string(), "session_01.csv");
}

#[test]
fn test_time_range_bounds_commute() {
    init_logging();
    let table = recording(64, 16.0, &ChannelConfig::default());
    let (a, b) = (TIME_START + 0.5, TIME_START + 1.25);

    let forward = table.get_column_by_time("AF3", a, b).unwrap().unwrap();
    let backward = table.get_column_by_time("AF3", b, a).unwrap().unwrap();
    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 12);

    assert!(table.get_column_by_time("ZZZ", a, b).unwrap().is_none());
    assert!(matches!(
        table.get_column_by_time("AF3", a, TIME_START + 100.0),
        Err(SignalError::TimeOutOfRange { .. })
    ));
}

#[test]
fn test_sampling_rate_derived_from_timestamps() {
    init_logging();
    let table = recording(64, 16.0, &ChannelConfig::default());
    // 64 samples over a span of 63 / 16 s
    assert!((table.sampling_rate() - 64.0 * 16.0 / 63.0).abs() < 1e-9);

    let single = recording(1, 16.0, &ChannelConfig::default());
    assert_eq!(single.sampling_rate(), ChannelConfig::default().sampling_rate);
}

#[test]
fn test_config_file_to_channel_set() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "channels": {{ "sampling_rate": 16.0, "gyro_grounds": {{ "xGround": 1.5 }} }},
            "processing": {{ "lower_freq": 1.0, "upper_freq": 7.0 }}
        }}"#
    )
    .unwrap();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.processing.upper_freq, 7.0);

    let mut table = recording(32, 16.0, &config.channels);
    table.norm_gyro_data().unwrap();
    assert!(table.get_column("X").unwrap().iter().all(|&v| v == 0.0));
    table.norm_gyro_data().unwrap();
    assert!(table.get_column("X").unwrap().iter().all(|&v| v == -1.5));

    let set = ChannelSet::from_eeg_table(&table).unwrap();
    assert_eq!(set.channel_names(), vec!["AF3", "F7", "X"]);
    assert_eq!(set.channel("X").unwrap().kind, ChannelKind::Gyro);
    assert_eq!(set.n_times(), 32);
}

#[test]
fn test_gyro_without_ground_is_missing_config() {
    init_logging();
    let mut table = recording(8, 16.0, &ChannelConfig::default());
    match table.norm_gyro_data() {
        Err(SignalError::MissingConfig(key)) => assert_eq!(key, "xGround"),
        other => panic!("expected MissingConfig, got {:?}", other),
    }
}

#[test]
fn test_table_without_eeg_has_no_channel_set() {
    init_logging();
    assert!(ChannelSet::from_eeg_table(&small_table()).is_ok());

    let input = TableInput::from_rows(header(&["ECG"]), &[vec![0.1], vec![0.2]])
        .unwrap()
        .with_sampling_rate(2.0);
    let ecg_only = TimeSeriesTable::new(input, &ChannelConfig::default()).unwrap();
    assert!(matches!(
        ChannelSet::from_eeg_table(&ecg_only),
        Err(SignalError::EmptySelection(_))
    ));
    let ecg = ChannelSet::from_ecg_table(&ecg_only, None).unwrap();
    assert_eq!(ecg.channel_names(), vec!["ECG"]);
}
