#![cfg(feature = "std")]

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use ph_pulse::{
    BatchForwarder, CaptureState, FIRST_DELTA, ForwardError, ManualClock, TelemetrySink,
};
use serde_json::Value;

#[derive(Default)]
struct CollectingSink {
    events: Vec<Value>,
    posts: usize,
    fail_every: Option<usize>,
}

impl TelemetrySink for CollectingSink {
    fn deliver(&mut self, body: &[u8]) -> Result<(), ForwardError> {
        self.posts += 1;
        if let Some(n) = self.fail_every {
            if self.posts % n == 0 {
                return Err(ForwardError::SinkDeliveryFailure("connection reset".into()));
            }
        }
        let json: Value = serde_json::from_slice(body).unwrap();
        self.events
            .extend(json["event"].as_array().unwrap().iter().cloned());
        Ok(())
    }
}

#[test]
fn concurrent_capture_reaches_sink_in_order() {
    const EDGES: i64 = 20_000;
    let state = CaptureState::new(256, ManualClock::new(0)).unwrap();

    let (stats, sink) = std::thread::scope(|scope| {
        scope.spawn(|| {
            let producer = state.try_producer().unwrap();
            for i in 0..EDGES {
                producer.on_edge_at(1_000 + i * 3);
            }
            drop(producer);
            state.close();
        });

        let mut forwarder = BatchForwarder::new(
            state.try_exporter().unwrap(),
            CollectingSink::default(),
            64,
            Duration::from_micros(50),
        );
        let stats = forwarder.run(&AtomicBool::new(false)).unwrap();
        let events = forwarder.sink().events.clone();
        (stats, events)
    });

    assert_eq!(stats.records_delivered as usize, sink.len());
    assert_eq!(stats.records_delivered + state.evicted(), EDGES as u64);

    let numbers: Vec<i64> = sink
        .iter()
        .map(|ev| ev["pulseNumber"].as_i64().unwrap())
        .collect();
    assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(numbers.last().copied(), Some(EDGES - 1));

    for ev in &sink {
        let n = ev["pulseNumber"].as_i64().unwrap();
        assert_eq!(ev["time"].as_i64().unwrap(), 1_000 + n * 3);
        let expected_delta = if n == 0 { FIRST_DELTA } else { 3 };
        assert_eq!(ev["delta"].as_i64().unwrap(), expected_delta);
    }
}

#[test]
fn failing_sink_loses_batches_but_never_stalls_capture() {
    let state = CaptureState::new(8, ManualClock::new(0)).unwrap();
    {
        let producer = state.try_producer().unwrap();
        for _ in 0..8 {
            state.clock().advance(10);
            producer.on_edge();
        }
    }
    state.close();

    let sink = CollectingSink {
        fail_every: Some(2),
        ..Default::default()
    };
    let mut forwarder = BatchForwarder::new(state.try_exporter().unwrap(), sink, 2, Duration::ZERO);
    let stats = forwarder.run(&AtomicBool::new(false)).unwrap();

    assert_eq!(stats.batches_delivered, 2);
    assert_eq!(stats.batches_failed, 2);
    assert_eq!(stats.records_dropped, 4);
    assert_eq!(forwarder.sink().events.len(), 4);
    assert!(state.is_empty());
}
