use spark_chain::{
    merge, sink, Connection, Event, MisuseError, Producer, Recorder, Shared, StreamError,
};
use std::sync::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

type P = Producer<i32, StreamError>;

#[test]
fn consumer_joining_between_values() {
    init_tracing();

    let p = P::new();
    let a = Recorder::new();
    let b = Recorder::new();

    let ca = p.connect(a.clone());
    p.emit(1).unwrap();
    let cb = p.connect(b.clone());
    p.emit(2).unwrap();
    p.finish(None).unwrap();

    assert_eq!(
        a.events(),
        vec![Event::Value(1), Event::Value(2), Event::Terminated(None)]
    );
    assert_eq!(b.events(), vec![Event::Value(2), Event::Terminated(None)]);
    assert!(ca.was_terminated());
    assert!(cb.was_terminated());
}

#[test]
fn consumer_joining_after_error() {
    init_tracing();

    let p = P::new();
    let e = StreamError::msg("E");
    p.finish(Some(e.clone())).unwrap();

    let c = Recorder::new();
    let conn = p.connect(c.clone());

    assert_eq!(c.events(), vec![Event::Terminated(Some(e))]);
    assert!(conn.is_closed());
    assert_eq!(p.connection_count(), 0);
}

#[test]
fn every_connect_after_finish_gets_the_recorded_signal() {
    let p = P::new();
    p.complete().unwrap();

    for _ in 0..3 {
        let late = Recorder::new();
        let conn = p.connect(late.clone());
        assert!(conn.is_closed());
        assert_eq!(late.events(), vec![Event::Terminated(None)]);
    }
}

#[test]
fn misuse_is_reported_not_ignored() {
    init_tracing();

    let p = P::new();
    p.complete().unwrap();

    assert!(matches!(p.emit(1), Err(MisuseError::EmitAfterFinish(id)) if id == p.id()));
    assert!(matches!(p.complete(), Err(MisuseError::FinishAfterFinish(id)) if id == p.id()));
    assert_eq!(p.termination(), Some(None));
}

#[test]
fn disconnect_mid_fan_out() {
    let p = P::new();
    let before = Recorder::new();
    let after = Recorder::new();
    let target_slot: Shared<Mutex<Option<Connection<i32, StreamError>>>> =
        Shared::new(Mutex::new(None));

    p.connect(before.clone());
    let producer = p.clone();
    let slot = target_slot.clone();
    p.connect(sink(move |event: Event<i32, StreamError>| {
        if event == Event::Value(1) {
            let target = slot.lock().unwrap().clone();
            if let Some(target) = target {
                producer.disconnect(&target).unwrap();
            }
        }
    }));
    let target = Recorder::new();
    let target_conn = p.connect(target.clone());
    *target_slot.lock().unwrap() = Some(target_conn.clone());
    p.connect(after.clone());

    p.emit(1).unwrap();
    p.emit(2).unwrap();
    p.complete().unwrap();

    assert!(target.events().is_empty());
    assert!(!target_conn.was_terminated());
    assert_eq!(before.values(), vec![1, 2]);
    assert_eq!(after.values(), vec![1, 2]);
    assert_eq!(after.termination(), Some(None));
}

#[test]
fn close_twice_equals_close_once() {
    let p = P::new();
    let once = Recorder::new();
    let twice = Recorder::new();
    let c1 = p.connect(once.clone());
    let c2 = p.connect(twice.clone());

    p.emit(1).unwrap();
    c1.close();
    c2.close();
    c2.close();
    p.disconnect(&c2).unwrap();
    p.emit(2).unwrap();

    assert_eq!(once.events(), twice.events());
    assert_eq!(p.connection_count(), 0);
}

#[test]
fn pipeline_end_to_end() {
    init_tracing();

    let words: Producer<&'static str, StreamError> = Producer::new();
    let numbers: Producer<&'static str, StreamError> = Producer::new();

    let lengths = words.map(|w| w.len() as i64);
    let parsed = numbers
        .try_map(|s: &'static str| s.parse::<i64>().map_err(|e| format!("bad number {s:?}: {e}")))
        .map_err(|e| e.context("numbers"));

    let all = merge([lengths, parsed]).filter(|n| *n > 1);
    let out = Recorder::new();
    all.connect(out.clone());

    words.emit("a").unwrap();
    words.emit("hello").unwrap();
    numbers.emit("42").unwrap();
    words.complete().unwrap();
    numbers.emit("x").unwrap();

    assert_eq!(out.values(), vec![5, 42]);
    let error = out.termination().flatten().expect("merged stream failed");
    assert!(error.to_string().starts_with("numbers: bad number \"x\""), "{error}");
    assert_eq!(numbers.connection_count(), 0);
}
