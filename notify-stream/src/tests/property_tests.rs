//! Property tests for backoff, SSE decoding, single-flight and the
//! notification store.

use super::support::ScriptedSource;
use crate::config::CredentialConfig;
use crate::credential::CredentialDispatcher;
use crate::store::NotificationStore;
use crate::stream::{ReconnectBackoff, SseDecoder, SseFrame, StreamEvent};
use futures::future::join_all;
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

/// Property: Backoff starts at the initial delay, never shrinks between
/// resets and never exceeds the cap.
#[test]
fn prop_backoff_is_monotonic_and_capped() {
    proptest!(|(
        initial_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        multiplier in 1.0f64..4.0,
        failures in 1usize..40,
    )| {
        let initial = Duration::from_millis(initial_ms);
        let max = Duration::from_millis(initial_ms + extra_ms);
        let mut backoff = ReconnectBackoff::new(initial, max, multiplier);

        let delays: Vec<Duration> = (0..failures).map(|_| backoff.next_delay()).collect();

        prop_assert_eq!(delays[0], initial);
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        prop_assert!(delays.iter().all(|delay| *delay <= max));
        prop_assert_eq!(backoff.failures() as usize, failures);

        backoff.reset();
        prop_assert_eq!(backoff.failures(), 0);
        prop_assert_eq!(backoff.next_delay(), initial);
    });
}

#[derive(Debug, Clone)]
struct WireEvent {
    event: Option<String>,
    data_lines: Vec<String>,
}

impl WireEvent {
    fn encode(&self, newline: &str, out: &mut String) {
        if let Some(event) = &self.event {
            out.push_str(&format!("event: {event}{newline}"));
        }
        for line in &self.data_lines {
            out.push_str(&format!("data: {line}{newline}"));
        }
        out.push_str(newline);
    }

    fn expected(&self) -> SseFrame {
        SseFrame {
            event: self.event.clone(),
            data: self.data_lines.join("\n"),
            ..SseFrame::default()
        }
    }
}

fn wire_event() -> impl Strategy<Value = WireEvent> {
    (
        proptest::option::of("[a-z_]{1,12}"),
        proptest::collection::vec("[a-zA-Z0-9 {}\":,]{0,16}", 1..4),
    )
        .prop_map(|(event, data_lines)| WireEvent { event, data_lines })
}

/// Property: Decoding is independent of how the byte stream is chunked,
/// for every line ending style.
#[test]
fn prop_sse_decoding_ignores_chunk_boundaries() {
    proptest!(|(
        events in proptest::collection::vec(wire_event(), 1..6),
        newline in prop::sample::select(vec!["\n", "\r\n", "\r"]),
        chunk_sizes in proptest::collection::vec(1usize..9, 1..32),
    )| {
        let mut wire = String::new();
        for event in &events {
            event.encode(newline, &mut wire);
        }
        let bytes = wire.as_bytes();

        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        let mut offset = 0;
        let mut sizes = chunk_sizes.iter().cycle();
        while offset < bytes.len() {
            let size = (*sizes.next().unwrap()).min(bytes.len() - offset);
            frames.extend(decoder.feed(&bytes[offset..offset + size]));
            offset += size;
        }

        let expected: Vec<SseFrame> = events.iter().map(WireEvent::expected).collect();
        prop_assert_eq!(frames, expected);
    });
}

/// Property: Any number of concurrent callers triggers exactly one
/// acquisition.
#[test]
fn prop_single_flight_for_any_caller_count() {
    proptest!(ProptestConfig::with_cases(32), |(callers in 1usize..24, delay_ms in 1u64..5_000)| {
        let runtime = paused_runtime();
        let (calls, joined, distinct) = runtime.block_on(async {
            let source = ScriptedSource::with_delay(Duration::from_millis(delay_ms));
            let dispatcher = CredentialDispatcher::from_arc(source.clone(), CredentialConfig::default())
                .unwrap();

            let results = join_all((0..callers).map(|_| dispatcher.get_token(false))).await;
            let mut tokens: Vec<String> = results
                .into_iter()
                .map(|result| result.unwrap().token().expose().to_string())
                .collect();
            tokens.dedup();
            (source.calls(), dispatcher.metrics().joined, tokens.len())
        });

        prop_assert_eq!(calls, 1);
        prop_assert_eq!(joined as usize, callers - 1);
        prop_assert_eq!(distinct, 1);
    });
}

#[derive(Debug, Clone)]
enum StoreOp {
    Event(Option<u64>),
    Heartbeat,
    AcknowledgeOne,
    AcknowledgeAll,
    Hydrate(u64),
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => proptest::option::of(0u64..50).prop_map(StoreOp::Event),
        1 => Just(StoreOp::Heartbeat),
        3 => Just(StoreOp::AcknowledgeOne),
        1 => Just(StoreOp::AcknowledgeAll),
        1 => (0u64..50).prop_map(StoreOp::Hydrate),
    ]
}

/// Property: The unread count follows the model of reported counts,
/// increments and acknowledgements, and never underflows.
#[test]
fn prop_store_unread_count_matches_model() {
    proptest!(|(ops in proptest::collection::vec(store_op(), 0..64))| {
        let store = NotificationStore::new();
        let mut model: u64 = 0;

        for op in ops {
            match op {
                StoreOp::Event(reported) => {
                    let payload = match reported {
                        Some(count) => json!({"id": "n", "unread_count": count}),
                        None => json!({"id": "n"}),
                    };
                    let changed = store.apply(&StreamEvent::Message {
                        event_type: "message".into(),
                        payload,
                    });
                    prop_assert!(changed);
                    model = reported.unwrap_or(model + 1);
                }
                StoreOp::Heartbeat => {
                    prop_assert!(!store.apply(&StreamEvent::Heartbeat));
                }
                StoreOp::AcknowledgeOne => {
                    store.acknowledge_one();
                    model = model.saturating_sub(1);
                }
                StoreOp::AcknowledgeAll => {
                    store.acknowledge_all();
                    model = 0;
                }
                StoreOp::Hydrate(count) => {
                    store.hydrate(count);
                    model = count;
                }
            }
            prop_assert_eq!(store.unread_count(), model);
        }
    });
}
