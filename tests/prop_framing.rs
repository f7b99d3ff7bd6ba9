//! Frame reassembly under arbitrary read boundaries.

use loggraph::handlers::socket::{
    DEFAULT_MAX_FRAME_SIZE, FrameDecoder, deserialise_record, encode_frame, serialise_record,
};
use loggraph::{Payload, Record, Severity};
use proptest::prelude::*;
use serde_json::Value;

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<u8>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        ".{0,64}".prop_map(Payload::Text),
        prop::collection::vec(any::<u8>(), 0..48).prop_map(Payload::Bytes),
        json_value().prop_map(Payload::Json),
    ]
}

proptest! {
    #[test]
    fn split_streams_decode_to_the_same_records(
        entries in prop::collection::vec((severity(), payload()), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let mut stream = Vec::new();
        for (level, message) in &entries {
            let record: Record = Record::new(*level, message.clone());
            let payload = serialise_record(&record).unwrap();
            stream.extend(encode_frame(&payload, DEFAULT_MAX_FRAME_SIZE).unwrap());
        }
        let mut bounds: Vec<usize> = cuts.iter().map(|cut| cut.index(stream.len() + 1)).collect();
        bounds.push(0);
        bounds.push(stream.len());
        bounds.sort_unstable();
        bounds.dedup();

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        let mut decoded = Vec::new();
        for window in bounds.windows(2) {
            decoder.extend(&stream[window[0]..window[1]]);
            while let Some(frame) = decoder.next_frame().unwrap() {
                decoded.push(deserialise_record(&frame).unwrap());
            }
        }

        prop_assert_eq!(decoded.len(), entries.len());
        for (record, (level, message)) in decoded.iter().zip(&entries) {
            prop_assert_eq!(record.level(), *level);
            prop_assert_eq!(&record.message, message);
        }
        prop_assert_eq!(decoder.buffered(), 0);
    }
}
