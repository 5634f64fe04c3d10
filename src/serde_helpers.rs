//! Serde helpers for the loosely typed gateway payloads.
//!
//! With the `tracing` feature, [`deserialize_with_warnings`] also reports fields the typed views
//! do not know about, which is how schema drift on the gateway shows up.

use std::fmt;

use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize as _, Deserializer};
use serde_json::{Number, Value};

/// A `serde_as` adapter reading identifiers that arrive either as strings or as integers.
///
/// Use with `#[serde_as(as = "LenientId")]` for `String` fields or
/// `#[serde_as(as = "Option<LenientId>")]` for `Option<String>`.
pub struct LenientId;

struct LenientIdVisitor;

impl Visitor<'_> for LenientIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }
}

impl<'de> serde_with::DeserializeAs<'de, String> for LenientId {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(LenientIdVisitor)
    }
}

impl serde_with::SerializeAs<String> for LenientId {
    fn serialize_as<S: serde::Serializer>(source: &String, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(source)
    }
}

/// Non-negative integer read from any JSON number, truncating fractions (`1500.7` is `1500`).
///
/// Negative, infinite and NaN values yield `None`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "The float is checked to be finite and non-negative, and `as` saturates above u64::MAX"
)]
pub(crate) fn integer_from_number(number: &Number) -> Option<u64> {
    number.as_u64().or_else(|| {
        number
            .as_f64()
            .filter(|float| float.is_finite() && *float >= 0.0)
            .map(|float| float.trunc() as u64)
    })
}

/// Like [`integer_from_number`], also accepting numeric strings.
pub(crate) fn integer_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => integer_from_number(number),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| integer_from_number(&text.parse::<Number>().ok()?))
        }
        _ => None,
    }
}

/// `deserialize_with` for optional integer codes. Anything that is not a non-negative number
/// decodes as `None` instead of failing the surrounding packet.
pub(crate) fn deserialize_lenient_code<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::Number(number)) => integer_from_number(&number),
        _ => None,
    })
}

/// Deserialize `value` into `T`, logging unknown fields and the path of any failure.
///
/// Unknown fields never make decoding fail; they are only reported.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    let mut unknown_paths: Vec<String> = Vec::new();
    let decoded: Result<T, _> = serde_ignored::deserialize(&value, |path| {
        unknown_paths.push(path.to_string());
    });

    let result = match decoded {
        Ok(result) => result,
        Err(e) => {
            // Decode again to find out where it went wrong
            let traced: Result<T, _> = serde_path_to_error::deserialize(&value);
            if let Err(path_err) = traced {
                tracing::debug!(
                    type_name = %type_name::<T>(),
                    path = %path_err.path(),
                    error = %path_err.inner(),
                    "Gateway payload did not match its typed view"
                );
            }
            return Err(e.into());
        }
    };

    for path in unknown_paths {
        tracing::warn!(
            type_name = %type_name::<T>(),
            field = %path,
            "Unknown field in gateway payload"
        );
    }

    Ok(result)
}

/// Plain deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use serde_with::serde_as;

    use super::*;

    #[serde_as]
    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Song {
        #[serde_as(as = "LenientId")]
        id: String,
        #[serde_as(as = "Option<LenientId>")]
        #[serde(default)]
        album: Option<String>,
    }

    #[test]
    fn integers_from_float_form_are_truncated() {
        let read = |value: Value| integer_from_value(&value);

        assert_eq!(read(json!(45000)), Some(45000));
        assert_eq!(read(json!(45000.0)), Some(45000));
        assert_eq!(read(json!(1500.7)), Some(1500));
        assert_eq!(read(json!("1000")), Some(1000));
        assert_eq!(read(json!(" 1500.7 ")), Some(1500));
        assert_eq!(read(json!(-5)), None);
        assert_eq!(read(json!(-0.5)), None);
        assert_eq!(read(json!("soon")), None);
        assert_eq!(read(json!(true)), None);
        assert_eq!(read(Value::Null), None);
    }

    #[test]
    fn lenient_code_never_fails_the_packet() {
        #[derive(Debug, Deserialize)]
        struct Frame {
            #[serde(default, deserialize_with = "deserialize_lenient_code")]
            op: Option<u64>,
        }

        let op = |value: Value| serde_json::from_value::<Frame>(value).unwrap().op;

        assert_eq!(op(json!({ "op": 10 })), Some(10));
        assert_eq!(op(json!({ "op": 10.0 })), Some(10));
        assert_eq!(op(json!({ "op": -1 })), None);
        assert_eq!(op(json!({ "op": "10" })), None);
        assert_eq!(op(json!({ "op": null })), None);
        assert_eq!(op(json!({})), None);
    }

    #[test]
    fn lenient_id_accepts_integers_and_strings() {
        let numeric: Song = serde_json::from_value(json!({ "id": 4133, "album": -7 })).unwrap();
        let text: Song = serde_json::from_value(json!({ "id": "4133" })).unwrap();

        assert_eq!(numeric.id, "4133");
        assert_eq!(numeric.album.as_deref(), Some("-7"));
        assert_eq!(text.id, "4133");
        assert_eq!(text.album, None);
    }

    #[test]
    fn lenient_id_serializes_as_string() {
        let song = Song {
            id: "12".to_owned(),
            album: None,
        };

        assert_eq!(
            serde_json::to_value(&song).unwrap(),
            json!({ "id": "12", "album": null })
        );
    }

    #[test]
    fn lenient_id_rejects_other_types() {
        serde_json::from_value::<Song>(json!({ "id": 1.5 })).unwrap_err();
        serde_json::from_value::<Song>(json!({ "id": [1] })).unwrap_err();
    }

    #[test]
    fn unknown_fields_do_not_fail() {
        let song: Song =
            deserialize_with_warnings(json!({ "id": 1, "title": "extra", "sources": [] })).unwrap();

        assert_eq!(song.id, "1");
    }

    #[test]
    fn missing_required_field_fails() {
        deserialize_with_warnings::<Song>(json!({ "album": 3 })).unwrap_err();
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn warning_is_emitted_for_unknown_fields() {
        use std::sync::{Arc, Mutex};

        use tracing_subscriber::layer::SubscriberExt as _;

        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().expect("lock").extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let output = Arc::new(Mutex::new(Vec::new()));
        let writer_output = Arc::clone(&output);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(move || Capture(Arc::clone(&writer_output)))
            .with_ansi(false);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            let song: Song =
                deserialize_with_warnings(json!({ "id": "9", "characters": [] })).unwrap();
            assert_eq!(song.id, "9");
        });

        let output = String::from_utf8(output.lock().expect("lock").clone()).unwrap();
        assert!(output.contains("Unknown field"), "got: {output}");
        assert!(output.contains("characters"), "got: {output}");
    }
}
