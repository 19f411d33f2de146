//! Cross-thread lifecycle tests. Only built with `--features sync`.

#![cfg(feature = "sync")]

use spark_chain::{merge, sink, Event, MisuseError, Producer, Recorder, StreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn handles_are_send_and_sync() {
    assert_send_sync::<Producer<i32, StreamError>>();
    assert_send_sync::<spark_chain::Connection<i32, StreamError>>();
    assert_send_sync::<Recorder<i32, StreamError>>();
}

#[test]
fn concurrent_finish_has_exactly_one_winner() {
    for _ in 0..50 {
        let producer: Producer<i32, StreamError> = Producer::new();
        let recorders: Vec<_> = (0..4).map(|_| Recorder::new()).collect();
        for r in &recorders {
            producer.connect(r.clone());
        }

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let producer = producer.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let error = (i % 2 == 1).then(|| StreamError::msg(format!("thread {i}")));
                    producer.finish(error)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for r in results.iter().filter(|r| r.is_err()) {
            assert_eq!(*r, Err(MisuseError::FinishAfterFinish(producer.id())));
        }

        let recorded = producer.termination().expect("finished");
        for r in &recorders {
            assert_eq!(r.events(), vec![Event::Terminated(recorded.clone())]);
        }
        assert_eq!(producer.connection_count(), 0);
    }
}

#[test]
fn close_from_both_ends_is_idempotent() {
    for _ in 0..50 {
        let producer: Producer<i32, StreamError> = Producer::new();
        let recorder = Recorder::new();
        let conn = producer.connect(recorder.clone());

        let barrier = Arc::new(Barrier::new(2));
        let consumer_side = {
            let conn = conn.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                conn.close();
            })
        };
        let producer_side = {
            let producer = producer.clone();
            let conn = conn.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                producer.disconnect(&conn)
            })
        };

        consumer_side.join().unwrap();
        assert!(producer_side.join().unwrap().is_ok());

        assert!(conn.is_closed());
        assert!(!conn.was_terminated());
        assert_eq!(producer.connection_count(), 0);
        assert_eq!(recorder.handle_count(), 1, "closed connection must drop its consumer");
    }
}

#[test]
fn finish_racing_close_delivers_at_most_one_terminal() {
    for _ in 0..50 {
        let producer: Producer<i32, StreamError> = Producer::new();
        let recorder = Recorder::new();
        let conn = producer.connect(recorder.clone());

        let barrier = Arc::new(Barrier::new(2));
        let closer = {
            let conn = conn.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                conn.close();
            })
        };
        barrier.wait();
        producer.complete().unwrap();
        closer.join().unwrap();

        let events = recorder.events();
        assert!(events.len() <= 1);
        if conn.was_terminated() {
            assert_eq!(events, vec![Event::Terminated(None)]);
        } else {
            assert!(events.is_empty());
        }
    }
}

#[test]
fn emitters_and_connectors_race_without_loss_for_stable_consumers() {
    let producer: Producer<usize, StreamError> = Producer::new();
    let stable = Recorder::new();
    producer.connect(stable.clone());

    let connects = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let producer = producer.clone();
            let barrier = barrier.clone();
            let connects = connects.clone();
            thread::spawn(move || {
                barrier.wait();
                for n in 0..100 {
                    if i % 2 == 0 {
                        producer.emit(i * 1000 + n).unwrap();
                    } else {
                        let conn = producer.connect(Recorder::new());
                        connects.fetch_add(1, Ordering::Relaxed);
                        conn.close();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut values = stable.values();
    values.sort_unstable();
    let mut expected: Vec<usize> = (0..THREADS)
        .filter(|i| i % 2 == 0)
        .flat_map(|i| (0..100).map(move |n| i * 1000 + n))
        .collect();
    expected.sort_unstable();

    assert_eq!(values, expected);
    assert_eq!(producer.value_count(), expected.len() as u64);
    assert_eq!(connects.load(Ordering::Relaxed), THREADS / 2 * 100);
    assert_eq!(producer.connection_count(), 1);
}

#[test]
fn per_producer_order_is_kept_across_threads() {
    let producer: Producer<u32, StreamError> = Producer::new();
    let recorder = Recorder::new();
    producer.connect(recorder.clone());

    let worker = {
        let producer = producer.clone();
        thread::spawn(move || {
            for n in 0..1000 {
                producer.emit(n).unwrap();
            }
            producer.complete().unwrap();
        })
    };
    worker.join().unwrap();

    let values = recorder.values();
    assert_eq!(values, (0..1000).collect::<Vec<_>>());
    assert_eq!(recorder.termination(), Some(None));
}

/// One emitter racing `finish`: every consumer sees, in emission order, a
/// prefix of the accepted values, then exactly one termination and nothing
/// after it. Emits that lose the race are rejected.
#[test]
fn emit_racing_finish_delivers_a_prefix_then_one_termination() {
    for _ in 0..100 {
        let producer: Producer<u32, StreamError> = Producer::new();
        let recorders: Vec<_> = (0..3).map(|_| Recorder::new()).collect();
        for r in &recorders {
            producer.connect(r.clone());
        }

        let barrier = Arc::new(Barrier::new(2));
        let emitter = {
            let producer = producer.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut accepted = 0u64;
                for n in 0..500 {
                    match producer.emit(n) {
                        Ok(()) => accepted += 1,
                        Err(error) => {
                            assert_eq!(error, MisuseError::EmitAfterFinish(producer.id()));
                            break;
                        }
                    }
                }
                accepted
            })
        };
        barrier.wait();
        producer.complete().unwrap();
        let accepted = emitter.join().unwrap();

        assert_eq!(producer.value_count(), accepted);
        assert!(producer.emit(0).is_err());
        for r in &recorders {
            let events = r.events();
            let (last, values) = events.split_last().expect("termination delivered");
            assert_eq!(*last, Event::Terminated(None));
            let values: Vec<u32> = values
                .iter()
                .map(|event| match event {
                    Event::Value(v) => *v,
                    other => panic!("second termination: {other:?}"),
                })
                .collect();
            assert!(values.len() as u64 <= accepted);
            assert_eq!(values, (0..values.len() as u32).collect::<Vec<_>>());
        }
    }
}

/// A merged consumer finishes one source while another thread is still
/// emitting into it. Delivery must never wait on a consumer running on
/// another thread, or the two emitters lock each other out.
#[test]
fn finishing_a_source_from_a_merged_consumer_does_not_deadlock() {
    let (done_tx, done_rx) = mpsc::channel();

    thread::spawn(move || {
        for _ in 0..200 {
            let a: Producer<u32, StreamError> = Producer::new();
            let b: Producer<u32, StreamError> = Producer::new();
            let merged = merge([a.clone(), b.clone()]);

            let closer = a.clone();
            merged.connect(sink(move |event: Event<u32, StreamError>| {
                if let Event::Value(v) = event {
                    thread::sleep(Duration::from_micros(50));
                    if v == 99 {
                        let _ = closer.complete();
                    }
                }
            }));

            let barrier = Arc::new(Barrier::new(2));
            let first = {
                let a = a.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for n in 0..20 {
                        if a.emit(n).is_err() {
                            break;
                        }
                    }
                })
            };
            let second = {
                let b = b.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let _ = b.emit(99);
                })
            };
            first.join().unwrap();
            second.join().unwrap();

            assert!(a.is_finished());
            let _ = b.complete();
        }
        let _ = done_tx.send(());
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(20)).is_ok(),
        "emitters deadlocked"
    );
}
