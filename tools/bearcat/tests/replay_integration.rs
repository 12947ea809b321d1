use bearcat::config::{AppConfig, CompareConfig};
use bearcat::demo::{example_columns, run_example};
use bearcat::engines::shard::ShardEngine;
use bearcat::engines::tabula::TabulaEngine;
use bearcat::engines::{package_for, ColumnInput, FrameEngine, FrameOps, SeriesOps};
use bearcat::equivalence::compare_values;
use bearcat::errors::BearcatError;
use bearcat::replay::comparator::compare_logs;
use bearcat::replay::recorder::Recorder;
use bearcat::replay::recording::{read_records, CallSiteRecord, RecordEntry, RecordWriter};
use bearcat::runtime::FakeTerminal;
use bearcat::value::{Array, DType, Index, RecordedValue, Scalar};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;

// ── helpers ───────────────────────────────────────────────────────────────────

/// Open a recorder for `engine` on a fresh thread and hand it to `calls`,
/// which decides when to start it. Returns the log path, the record count
/// and whatever `calls` returned.
fn record_returning<E, T, F>(engine: E, dir: &Path, calls: F) -> (PathBuf, u64, T)
where
    E: FrameEngine + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&E, &Rc<Recorder>) -> Result<T, BearcatError> + Send + 'static,
{
    let dir = dir.to_path_buf();
    thread::spawn(move || {
        let mut cfg = AppConfig::default();
        cfg.recorder.output_dir = dir;
        let package = package_for(engine.kind())?;
        let recorder = Recorder::open(&cfg, &package)?;
        let out = calls(&engine, &recorder)?;
        Ok::<_, BearcatError>((
            recorder.path().to_path_buf(),
            recorder.records_written(),
            out,
        ))
    })
    .join()
    .expect("recording thread panicked")
    .expect("recording failed")
}

fn record_with<E, F>(engine: E, dir: &Path, calls: F) -> (PathBuf, u64)
where
    E: FrameEngine + Send + 'static,
    F: FnOnce(&E, &Rc<Recorder>) -> Result<(), BearcatError> + Send + 'static,
{
    let (path, written, ()) = record_returning(engine, dir, calls);
    (path, written)
}

fn decoded_values(path: &Path) -> Vec<RecordedValue> {
    read_records(path)
        .expect("read")
        .into_iter()
        .map(|r| r.value)
        .collect()
}

fn example<E: FrameEngine>(engine: &E, recorder: &Rc<Recorder>) -> Result<(), BearcatError> {
    recorder.start();
    run_example(engine, &FakeTerminal::default())
}

fn groupby_only<E: FrameEngine>(engine: &E, recorder: &Rc<Recorder>) -> Result<(), BearcatError> {
    let frame = engine.from_columns(example_columns())?;
    recorder.start();
    frame.groupby_count("a")?;
    Ok(())
}

fn construct_and_sum<E: FrameEngine>(engine: &E, recorder: &Rc<Recorder>) -> Result<(), BearcatError> {
    recorder.start();
    let frame = engine.from_columns(example_columns())?;
    frame.sum()?;
    Ok(())
}

fn compare(left: &Path, right: &Path) -> Result<usize, BearcatError> {
    let terminal = FakeTerminal::default();
    compare_logs(
        left,
        right,
        &CompareConfig {
            max_render_bytes: 4096,
        },
        &terminal,
    )
    .map(|summary| summary.pairs)
}

// ── scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn groupby_counts_agree_across_engines_at_position_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (tabula_log, tabula_count) = record_with(TabulaEngine, dir.path(), groupby_only::<TabulaEngine>);
    let (shard_log, shard_count) = record_with(ShardEngine, dir.path(), groupby_only::<ShardEngine>);
    assert_eq!((tabula_count, shard_count), (1, 1));
    assert_ne!(tabula_log, shard_log);

    let tabula = read_records(&tabula_log).expect("read tabula");
    let shard = read_records(&shard_log).expect("read shard");
    assert_eq!(compare_values(&tabula[0].value, &shard[0].value), Ok(()));

    let RecordedValue::Frame(counts) = &shard[0].value else {
        panic!("expected grouped counts, got {}", shard[0].value.type_name());
    };
    assert_eq!(counts.index.name.as_deref(), Some("a"));
    assert_eq!(
        counts.index.labels,
        vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)]
    );
    assert!(counts.columns.iter().all(|c| c.dtype == DType::Int64));
}

#[test]
fn example_scenario_agrees_across_engines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (tabula_log, written) = record_with(TabulaEngine, dir.path(), example::<TabulaEngine>);
    let (shard_log, _) = record_with(ShardEngine, dir.path(), example::<ShardEngine>);
    assert_eq!(written, 5);
    assert_eq!(compare(&tabula_log, &shard_log).expect("engines agree"), 5);
}

#[test]
fn log_compared_with_an_independent_copy_succeeds() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    let (a, _) = record_with(ShardEngine, first.path(), example::<ShardEngine>);
    let (b, _) = record_with(ShardEngine, second.path(), example::<ShardEngine>);
    assert_eq!(compare(&a, &b).expect("same engine, same calls"), 5);
}

#[test]
fn length_mismatch_fails_at_the_shorter_length() {
    let long_dir = tempfile::tempdir().expect("tempdir");
    let short_dir = tempfile::tempdir().expect("tempdir");
    let (long, long_count) = record_with(TabulaEngine, long_dir.path(), example::<TabulaEngine>);
    let (short, short_count) =
        record_with(ShardEngine, short_dir.path(), construct_and_sum::<ShardEngine>);
    assert_eq!((long_count, short_count), (5, 2));

    for (left, right) in [(&long, &short), (&short, &long)] {
        match compare(left, right) {
            Err(BearcatError::Mismatch { position, .. }) => assert_eq!(position, 2),
            other => panic!("expected a mismatch at position 2, got {other:?}"),
        }
    }
}

#[test]
fn divergent_values_are_identified() {
    let left_dir = tempfile::tempdir().expect("tempdir");
    let right_dir = tempfile::tempdir().expect("tempdir");
    let (left, _) = record_with(TabulaEngine, left_dir.path(), construct_and_sum::<TabulaEngine>);
    let (right, _) = record_with(ShardEngine, right_dir.path(), |engine: &ShardEngine, recorder| {
        recorder.start();
        let mut columns = example_columns();
        columns[1].1 = ColumnInput::Int64(vec![4, 5, 6, 8]);
        engine.from_columns(columns)?.sum()?;
        Ok(())
    });

    let err = compare(&left, &right).expect_err("values differ");
    let BearcatError::Mismatch { position, detail } = err else {
        panic!("expected a mismatch, got {err}");
    };
    assert_eq!(position, 0);
    assert!(detail.contains("(column name=\"b\") values are different at row 3: 7 != 8"));
    assert!(detail.contains("left:  #0 DataFrame"));
}

#[test]
fn record_count_matches_top_level_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (log, written) = record_with(TabulaEngine, dir.path(), |engine: &TabulaEngine, recorder| {
        recorder.start();
        let frame = engine.from_columns(example_columns())?;
        frame.sum()?;
        frame.column("b")?;
        for _ in 0..3 {
            frame.getattr("s")?;
        }
        frame.shape()?;
        frame.head(2)?.to_array()?;
        Ok(())
    });
    assert_eq!(written, 5);
    let functions = read_records(&log)
        .expect("read")
        .into_iter()
        .map(|r| r.call.function)
        .collect::<Vec<_>>();
    assert_eq!(functions, vec!["DataFrame", "sum", "column", "head", "to_array"]);
}

#[test]
fn attribute_hooks_never_reach_the_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (log, written) = record_with(ShardEngine, dir.path(), |engine: &ShardEngine, recorder| {
        let frame = engine.from_columns(example_columns())?;
        recorder.start();
        for name in ["a", "b", "s", "b"] {
            frame.getattr(name)?;
        }
        assert!(frame.getattr("missing").is_err());
        frame.column("a")?;
        Ok(())
    });
    assert_eq!(written, 1);
    let records = read_records(&log).expect("read");
    assert!(records.iter().all(|r| r.call.function != "getattr"));
}

#[test]
fn engine_values_decode_equal_to_what_was_returned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (log, written, returned) =
        record_returning(ShardEngine, dir.path(), |engine: &ShardEngine, recorder| {
            let frame = engine.from_columns(example_columns())?;
            recorder.start();
            let counts = frame.groupby_count("a")?;
            let top = frame.head(2)?;
            let sums = FrameOps::sum(&top)?;
            let array = frame.to_array()?;
            let b = frame.column("b")?;
            let total = SeriesOps::sum(&b)?;
            Ok(vec![
                RecordedValue::Frame(counts.to_tabula()),
                RecordedValue::Frame(top.to_tabula()),
                RecordedValue::Series(sums.to_tabula()),
                RecordedValue::Array(array),
                RecordedValue::Series(b.to_tabula()),
                RecordedValue::Scalar(total),
            ])
        });

    let decoded = decoded_values(&log);
    assert_eq!(written, 6);
    assert_eq!(decoded.len(), returned.len());
    for (position, (got, want)) in decoded.iter().zip(&returned).enumerate() {
        assert_eq!(got, want, "value {position} changed through the log");
    }
}

#[test]
fn every_value_category_survives_the_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("categories.records");
    let originals = vec![
        RecordedValue::Index(Index::from_labels(
            Some("key".to_string()),
            vec![Scalar::Utf8("x".to_string()), Scalar::Int64(2), Scalar::Bool(true)],
        )),
        RecordedValue::Sequence(vec![
            RecordedValue::Scalar(Scalar::Int64(4)),
            RecordedValue::Index(Index::range(3)),
        ]),
        RecordedValue::Array(Array::from_values(vec![Scalar::Int64(1), Scalar::Float64(0.5)])),
        RecordedValue::Scalar(Scalar::Utf8("helloworld".to_string())),
        RecordedValue::Null,
    ];

    let mut writer = RecordWriter::open(&path).expect("open");
    for (seq, value) in originals.iter().enumerate() {
        writer
            .append(&RecordEntry {
                seq: seq as u64,
                call: CallSiteRecord {
                    function: value.type_name().to_string(),
                    file: "tests/replay_integration.rs".to_string(),
                    line: 1,
                },
                value: value.clone(),
            })
            .expect("append");
    }
    drop(writer);

    assert_eq!(decoded_values(&path), originals);
}
