//! Trapper wire format.
//!
//! Every request and response is a single frame:
//!
//! ```text
//! +------------------+
//! | magic (4 bytes)  |  "ZBXD"
//! +------------------+
//! | version (1)      |  0x01
//! +------------------+
//! | length (4)       |  u32 little-endian, payload length in bytes
//! +------------------+
//! | reserved (4)     |  zero
//! +------------------+
//! | payload          |  UTF-8 JSON
//! | (variable)       |
//! +------------------+
//! ```
use bytes::{BufMut as _, Bytes, BytesMut};
use serde::Serialize;

use crate::{
    error::ProtocolError,
    item::{Item, Timestamp},
};

/// Magic bytes opening every frame.
pub const MAGIC: &[u8; 4] = b"ZBXD";

/// Protocol version marker following the magic bytes.
pub const VERSION: u8 = 0x01;

/// Total length of the frame header.
pub const HEADER_LEN: usize = 13;

const PREFIX: &[u8; 5] = b"ZBXD\x01";
const LENGTH_OFFSET: usize = 5;
const SENDER_DATA: &str = "sender data";
const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

#[derive(Serialize)]
struct Envelope<'a> {
    request: &'static str,
    data: &'a [Item],
    #[serde(skip_serializing_if = "Option::is_none")]
    clock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ns: Option<u32>,
}

/// Encodes `items` into a complete request frame.
///
/// When `with_timestamps` is set, the envelope carries the current time as its batch-wide `clock`, and additionally
/// the sub-second `ns` when `with_ns` is set.
///
/// # Errors
///
/// If the items can't be serialized, [`ProtocolError::MalformedPayload`] is returned. If the payload is larger than
/// the 32-bit length field can describe, [`ProtocolError::PayloadTooLarge`] is returned.
pub fn encode(items: &[Item], with_timestamps: bool, with_ns: bool) -> Result<Bytes, ProtocolError> {
    let sent_at = with_timestamps.then(Timestamp::now);
    encode_at(items, sent_at, with_ns)
}

/// Encodes `items` into a complete request frame, stamped with the given send time.
pub(crate) fn encode_at(items: &[Item], sent_at: Option<Timestamp>, with_ns: bool) -> Result<Bytes, ProtocolError> {
    encode_with_limit(items, sent_at, with_ns, MAX_PAYLOAD_LEN)
}

fn encode_with_limit(
    items: &[Item],
    sent_at: Option<Timestamp>,
    with_ns: bool,
    max_payload_len: usize,
) -> Result<Bytes, ProtocolError> {
    let envelope = Envelope {
        request: SENDER_DATA,
        data: items,
        clock: sent_at.map(|ts| ts.clock),
        ns: sent_at.filter(|_| with_ns).map(|ts| ts.ns),
    };

    let mut buf = BytesMut::with_capacity(HEADER_LEN + items.len() * 64);
    buf.put_slice(PREFIX);

    // We write a dummy length of zero for now, and fill it in once the payload has been serialized.
    buf.put_u32_le(0);
    buf.put_u32_le(0);

    let mut writer = buf.writer();
    serde_json::to_writer(&mut writer, &envelope).map_err(ProtocolError::MalformedPayload)?;
    let mut buf = writer.into_inner();

    let payload_len = buf.len() - HEADER_LEN;
    let declared = u32::try_from(payload_len)
        .ok()
        .filter(|_| payload_len <= max_payload_len)
        .ok_or(ProtocolError::PayloadTooLarge(payload_len))?;
    buf[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&declared.to_le_bytes());

    Ok(buf.freeze())
}

/// Decodes a complete response frame into an [`Acknowledgement`].
///
/// # Errors
///
/// If the response does not start with the expected magic and version bytes, [`ProtocolError::InvalidHeader`] is
/// returned. If the bytes following the header are not valid JSON, [`ProtocolError::MalformedPayload`] is returned.
pub fn decode(response: &[u8]) -> Result<Acknowledgement, ProtocolError> {
    if !response.starts_with(PREFIX) {
        return Err(ProtocolError::InvalidHeader);
    }

    let payload = response.get(HEADER_LEN..).unwrap_or_default();
    serde_json::from_slice(payload).map(Acknowledgement).map_err(ProtocolError::MalformedPayload)
}

/// Returns the payload length declared in a frame header, if `frame` holds a complete header.
pub fn declared_len(frame: &[u8]) -> Option<u32> {
    if frame.len() < HEADER_LEN {
        return None;
    }

    let raw: [u8; 4] = frame[LENGTH_OFFSET..LENGTH_OFFSET + 4].try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// A decoded trapper response.
///
/// The structure of the response is left untouched and is available through [`Acknowledgement::as_value`]. Helpers
/// are provided for the fields a trapper normally replies with: `response` (`"success"` or `"failed"`) and `info`,
/// a human-readable processing summary.
#[derive(Clone, Debug, PartialEq)]
pub struct Acknowledgement(serde_json::Value);

impl Acknowledgement {
    /// Returns the raw JSON response.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the acknowledgement, returning the raw JSON response.
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    /// Returns the `response` field, if present.
    pub fn response(&self) -> Option<&str> {
        self.0.get("response").and_then(serde_json::Value::as_str)
    }

    /// Returns `true` if the server reported the request as successful.
    pub fn is_success(&self) -> bool {
        self.response() == Some("success")
    }

    /// Returns the `info` field, if present.
    pub fn info(&self) -> Option<&str> {
        self.0.get("info").and_then(serde_json::Value::as_str)
    }

    /// Parses the `info` field into a [`Summary`].
    ///
    /// Returns `None` if there is no `info` field or if it isn't in the `processed: N; failed: N; total: N; seconds
    /// spent: F` format.
    pub fn summary(&self) -> Option<Summary> {
        self.info().and_then(Summary::parse)
    }
}

/// Per-request processing counts reported by the trapper.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    /// Number of items processed successfully.
    pub processed: u64,

    /// Number of items the server failed to process.
    pub failed: u64,

    /// Number of items received.
    pub total: u64,

    /// Server-side processing time, in seconds.
    pub seconds_spent: f64,
}

impl Summary {
    fn parse(info: &str) -> Option<Self> {
        let (mut processed, mut failed, mut total, mut seconds_spent) = (None, None, None, None);

        for part in info.split(';') {
            let (name, value) = part.split_once(':')?;
            let value = value.trim();
            match name.trim() {
                "processed" => processed = value.parse().ok(),
                "failed" => failed = value.parse().ok(),
                "total" => total = value.parse().ok(),
                "seconds spent" => seconds_spent = value.parse().ok(),
                _ => {}
            }
        }

        Some(Self { processed: processed?, failed: failed?, total: total?, seconds_spent: seconds_spent? })
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec as arb_vec, option, prelude::*, prop_oneof, proptest};
    use serde_json::json;

    use super::{decode, declared_len, encode, encode_at, encode_with_limit, Summary, HEADER_LEN, MAGIC, VERSION};
    use crate::{
        error::ProtocolError,
        item::{Item, Timestamp, Value},
    };

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int),
            any::<u64>().prop_map(Value::UInt),
            (-1.0e9f64..1.0e9).prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Str),
        ]
    }

    fn arb_item() -> impl Strategy<Value = Item> {
        let host_regex = "[a-z0-9-]{1,16}";
        let key_regex = "[a-z]{1,12}(\\.[a-z]{1,12}){0,3}";
        (host_regex, key_regex, arb_value(), option::of((0i64..4_000_000_000, 0u32..1_000_000_000))).prop_map(
            |(host, key, value, ts)| {
                let item = Item::new(key, value).with_host(host);
                match ts {
                    Some((clock, ns)) => item.with_timestamp(Timestamp::new(clock, ns)),
                    None => item,
                }
            },
        )
    }

    fn payload_json(frame: &[u8]) -> serde_json::Value {
        serde_json::from_slice(&frame[HEADER_LEN..]).unwrap()
    }

    /// Wraps a JSON payload in a response frame.
    fn response_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = b"ZBXD\x01".to_vec();
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&[0; 4]);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn envelope_without_timestamps() {
        let items = vec![Item::new("k", 1).with_host("h")];
        let frame = encode(&items, false, false).unwrap();
        assert_eq!(
            payload_json(&frame),
            json!({"request": "sender data", "data": [{"host": "h", "key": "k", "value": 1}]})
        );
    }

    #[test]
    fn envelope_timestamps() {
        let items = vec![Item::new("k", "v").with_host("h")];
        let ts = Timestamp::new(1_700_000_000, 123_456_789);

        let frame = encode_at(&items, Some(ts), false).unwrap();
        let json = payload_json(&frame);
        assert_eq!(json["clock"], json!(1_700_000_000));
        assert!(json.get("ns").is_none());

        let frame = encode_at(&items, Some(ts), true).unwrap();
        let json = payload_json(&frame);
        assert_eq!(json["clock"], json!(1_700_000_000));
        assert_eq!(json["ns"], json!(123_456_789));

        // `with_ns` without timestamps adds nothing.
        let frame = encode_at(&items, None, true).unwrap();
        let json = payload_json(&frame);
        assert!(json.get("clock").is_none());
        assert!(json.get("ns").is_none());
    }

    #[test]
    fn encode_stamps_current_time() {
        let before = Timestamp::now().clock;
        let frame = encode(&[], true, true).unwrap();
        let after = Timestamp::now().clock;

        let json = payload_json(&frame);
        let clock = json["clock"].as_i64().unwrap();
        assert!(before <= clock && clock <= after);
        assert!(json["ns"].as_u64().unwrap() < 1_000_000_000);
        assert_eq!(json["data"], json!([]));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let items = vec![Item::new("k", "v").with_host("h")];
        let frame = encode_with_limit(&items, None, false, 1024).unwrap();
        let payload_len = frame.len() - HEADER_LEN;

        assert!(encode_with_limit(&items, None, false, payload_len).is_ok());
        match encode_with_limit(&items, None, false, payload_len - 1) {
            Err(ProtocolError::PayloadTooLarge(len)) => assert_eq!(len, payload_len),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn decode_success_response() {
        let payload = br#"{"response":"success","info":"processed: 3; failed: 1; total: 4; seconds spent: 0.000055"}"#;
        let ack = decode(&response_frame(payload)).unwrap();

        assert!(ack.is_success());
        assert_eq!(ack.response(), Some("success"));
        assert_eq!(
            ack.summary(),
            Some(Summary { processed: 3, failed: 1, total: 4, seconds_spent: 0.000_055 })
        );
        assert_eq!(ack.as_value()["info"], json!("processed: 3; failed: 1; total: 4; seconds spent: 0.000055"));
    }

    #[test]
    fn decode_passes_unknown_structure_through() {
        let ack = decode(&response_frame(br#"{"response":"failed","extra":[1,2]}"#)).unwrap();
        assert!(!ack.is_success());
        assert_eq!(ack.summary(), None);
        assert_eq!(ack.into_inner(), json!({"response": "failed", "extra": [1, 2]}));
    }

    #[test]
    fn decode_rejects_bad_header() {
        let payload = br#"{"response":"success"}"#;

        let mut frame = response_frame(payload);
        frame[4] = 0x03;
        assert!(matches!(decode(&frame), Err(ProtocolError::InvalidHeader)));

        let mut frame = response_frame(payload);
        frame[0] = b'z';
        assert!(matches!(decode(&frame), Err(ProtocolError::InvalidHeader)));

        assert!(matches!(decode(b""), Err(ProtocolError::InvalidHeader)));
        assert!(matches!(decode(b"ZBXD"), Err(ProtocolError::InvalidHeader)));
        assert!(matches!(decode(b"HTTP/1.1 400 Bad Request\r\n"), Err(ProtocolError::InvalidHeader)));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        assert!(matches!(
            decode(&response_frame(b"{\"response\":")),
            Err(ProtocolError::MalformedPayload(_))
        ));

        // Correct prefix, but truncated before the payload.
        assert!(matches!(decode(b"ZBXD\x01\x00\x00"), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn summary_parsing() {
        assert_eq!(Summary::parse("processed: 1; failed: 0; total: 1"), None);
        assert_eq!(Summary::parse("garbage"), None);
        assert_eq!(
            Summary::parse("processed:0;failed:2;total:2;seconds spent:1.5"),
            Some(Summary { processed: 0, failed: 2, total: 2, seconds_spent: 1.5 })
        );
    }

    #[test]
    fn declared_len_requires_full_header() {
        assert_eq!(declared_len(b"ZBXD\x01\x05\x00\x00\x00\x00\x00\x00"), None);
        assert_eq!(declared_len(b"ZBXD\x01\x05\x00\x00\x00\x00\x00\x00\x00"), Some(5));
    }

    proptest! {
        #[test]
        fn property_test_header_well_formed(
            items in arb_vec(arb_item(), 0..32),
            with_timestamps in any::<bool>(),
            with_ns in any::<bool>(),
        ) {
            let frame = encode(&items, with_timestamps, with_ns).unwrap();

            prop_assert!(frame.len() >= HEADER_LEN);
            prop_assert_eq!(&frame[0..4], &MAGIC[..]);
            prop_assert_eq!(frame[4], VERSION);
            prop_assert_eq!(&frame[9..13], &[0u8; 4][..]);

            let declared = declared_len(&frame).unwrap() as usize;
            prop_assert_eq!(declared, frame.len() - HEADER_LEN);
        }

        #[test]
        fn property_test_payload_round_trip(
            items in arb_vec(arb_item(), 0..32),
            with_ns in any::<bool>(),
            clock in 0i64..4_000_000_000,
            ns in 0u32..1_000_000_000,
        ) {
            let frame = encode_at(&items, Some(Timestamp::new(clock, ns)), with_ns).unwrap();

            let decoded = decode(&frame).unwrap().into_inner();
            prop_assert_eq!(&decoded["request"], &json!("sender data"));
            prop_assert_eq!(&decoded["clock"], &json!(clock));
            if with_ns {
                prop_assert_eq!(&decoded["ns"], &json!(ns));
            } else {
                prop_assert!(decoded.get("ns").is_none());
            }

            let data: Vec<Item> = serde_json::from_value(decoded["data"].clone()).unwrap();
            prop_assert_eq!(data.len(), items.len());
            for (decoded, original) in data.iter().zip(items.iter()) {
                prop_assert_eq!(decoded.host(), original.host());
                prop_assert_eq!(decoded.key(), original.key());
                prop_assert_eq!(decoded.clock(), original.clock());
                prop_assert_eq!(decoded.ns(), original.ns());
            }
        }
    }
}
