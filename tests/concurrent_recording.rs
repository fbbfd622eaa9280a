//! Concurrency tests: registry races, shared handles, snapshot consistency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use vantage::{AggregationKind, AggregationSet, LabelSet, MeasureValue, Recorder};

#[test]
fn racing_recorders_share_one_series() {
    const THREADS: usize = 100;
    let recorder = Recorder::new();
    let measure = recorder
        .measure("requests")
        .with_label_keys(["route"])
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let measure = measure.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                measure
                    .record(&LabelSet::from_values(["/api"]), 1i64)
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(measure.series_count(), 1, "one series per label set");
    let snap = measure
        .series(&LabelSet::from_values(["/api"]))
        .unwrap()
        .snapshot();
    assert_eq!(snap.count, Some(u64::try_from(THREADS).unwrap()));
    assert_eq!(
        snap.sum,
        Some(MeasureValue::Integer(i64::try_from(THREADS).unwrap()))
    );
}

#[test]
fn racing_last_value_writers_settle_on_a_recorded_value() {
    const THREADS: i64 = 8;
    let recorder = Recorder::new();
    let measure = recorder
        .measure("queue_depth")
        .with_aggregations(AggregationSet::new([AggregationKind::LastValue]))
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(usize::try_from(THREADS).unwrap()));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let measure = measure.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                measure.record(&LabelSet::new(), i).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Last-value races are unordered; the only guarantee is that the
    // surviving value is one that some writer actually recorded.
    let last = measure.default_series().snapshot().last;
    match last {
        Some(MeasureValue::Integer(v)) => assert!((0..THREADS).contains(&v)),
        other => panic!("expected an integer last value, got {other:?}"),
    }
}

#[test]
fn distinct_label_sets_get_distinct_series() {
    const THREADS: usize = 16;
    let recorder = Recorder::new();
    let measure = recorder
        .measure("hits")
        .with_label_keys(["tenant"])
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let measure = measure.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let labels = LabelSet::from_values([format!("tenant-{i}")]);
                barrier.wait();
                for _ in 0..3 {
                    measure.record(&labels, 1i64).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(measure.series_count(), THREADS);
    for i in 0..THREADS {
        let labels = LabelSet::from_values([format!("tenant-{i}")]);
        let snap = measure.series(&labels).unwrap().snapshot();
        assert_eq!(snap.count, Some(3), "tenant-{i}");
    }
}

#[test]
fn concurrent_definitions_converge_on_one_measure() {
    const THREADS: usize = 16;
    let recorder = Recorder::new();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let recorder = recorder.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let measure = recorder.measure("hits").build().unwrap();
                measure.record(&LabelSet::new(), 1i64).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(recorder.measures().len(), 1);
    let snap = recorder.get("hits").unwrap().default_series().snapshot();
    assert_eq!(snap.count, Some(u64::try_from(THREADS).unwrap()));
}

// Each sample adds 1 to the sum and 1 to the count, so a consistent
// snapshot must always show sum == count, however it interleaves with
// the writers.
#[test]
fn snapshots_stay_internally_consistent_under_load() {
    const WRITERS: usize = 8;
    const SAMPLES_PER_WRITER: usize = 500;

    let recorder = Recorder::new();
    let measure = recorder.measure("ticks").build().unwrap();
    let series = measure.default_series();

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let series = series.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut checked = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let snap = series.snapshot();
                let sum = match snap.sum {
                    Some(MeasureValue::Integer(v)) => v,
                    other => panic!("unexpected sum {other:?}"),
                };
                let count = snap.count.unwrap();
                assert_eq!(sum, i64::try_from(count).unwrap(), "torn snapshot");
                checked += 1;
            }
            checked
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let series = series.clone();
            thread::spawn(move || {
                for _ in 0..SAMPLES_PER_WRITER {
                    series.record(1i64).unwrap();
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let checked = reader.join().unwrap();
    assert!(checked > 0, "reader never observed a snapshot");

    let total = u64::try_from(WRITERS * SAMPLES_PER_WRITER).unwrap();
    assert_eq!(series.snapshot().count, Some(total));
}
