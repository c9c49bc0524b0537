//! `serde::Deserializer` over [`Value`].
//!
//! This is the weakly-typed half of the conversion pipeline: strings
//! parse into numbers and booleans, numbers widen or truncate, booleans
//! read as 0/1, and comma-separated strings split into sequences.
//! Duration and system-time targets are intercepted by struct name so
//! `"1m30s"` decodes into `std::time::Duration`; network, URL, and
//! timestamp targets parse from the string form through their own serde
//! implementations, behind the hook length caps: every string the
//! deserializer emits is guarded first, so an oversize IP/CIDR/URL input
//! is rejected before any parser runs, whatever the destination type.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::de::{self, IntoDeserializer, Visitor};

use crate::domain::errors::ConfigError;
use crate::domain::value::{convert, Value};

/// Deserializes one value tree into a caller type.
pub(crate) fn decode_value<'de, T: de::Deserialize<'de>>(value: Value) -> Result<T, ConfigError> {
    T::deserialize(ValueDe(value))
}

pub(crate) struct ValueDe(pub Value);

impl ValueDe {
    fn int_value(&self) -> Result<i64, ConfigError> {
        self.0.coerce_i64()
    }
}

macro_rules! deserialize_narrowed {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
            let wide = self.int_value()?;
            let narrowed = <$ty>::try_from(wide).map_err(|_| {
                ConfigError::conversion("int", stringify!($ty), format!("{wide} out of range"))
            })?;
            visitor.$visit(narrowed)
        }
    };
}

impl<'de> de::Deserializer<'de> for ValueDe {
    type Error = ConfigError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Nil => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Int(i) => visitor.visit_i64(i),
            Value::Float(f) => visitor.visit_f64(f),
            Value::Str(s) => {
                convert::guard_hook_caps(&s)?;
                visitor.visit_string(s)
            }
            Value::Array(items) => visitor.visit_seq(SeqDe::new(items)),
            Value::Table(entries) => visitor.visit_map(MapDe::new(entries)),
            typed => {
                let rendered = typed.coerce_str()?;
                convert::guard_rendered_caps(&typed, &rendered)?;
                visitor.visit_string(rendered)
            }
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_bool(self.0.coerce_bool()?)
    }

    deserialize_narrowed!(deserialize_i8, visit_i8, i8);
    deserialize_narrowed!(deserialize_i16, visit_i16, i16);
    deserialize_narrowed!(deserialize_i32, visit_i32, i32);

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_i64(self.int_value()?)
    }

    deserialize_narrowed!(deserialize_u8, visit_u8, u8);
    deserialize_narrowed!(deserialize_u16, visit_u16, u16);
    deserialize_narrowed!(deserialize_u32, visit_u32, u32);

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        let wide = self.int_value()?;
        let unsigned = u64::try_from(wide)
            .map_err(|_| ConfigError::conversion("int", "u64", format!("{wide} is negative")))?;
        visitor.visit_u64(unsigned)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_f32(self.0.coerce_f64()? as f32)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_f64(self.0.coerce_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        let s = self.0.coerce_str()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(ConfigError::conversion(
                "string",
                "char",
                format!("{s:?} is not a single character"),
            )),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        // serde hides the destination type for string targets, so the
        // hook caps are enforced here, before any downstream parser
        // (IpAddr, IpNet, Url, DateTime, or a plain String) sees the
        // text.
        let rendered = self.0.coerce_str()?;
        convert::guard_rendered_caps(&self.0, &rendered)?;
        visitor.visit_string(rendered)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Str(s) => visitor.visit_byte_buf(s.into_bytes()),
            Value::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|item| {
                        item.coerce_i64().and_then(|i| {
                            u8::try_from(i).map_err(|_| {
                                ConfigError::conversion("int", "u8", format!("{i} out of range"))
                            })
                        })
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                visitor.visit_byte_buf(bytes)
            }
            other => Err(ConfigError::conversion(other.kind(), "bytes", "unsupported")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Nil => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Array(items) => visitor.visit_seq(SeqDe::new(items)),
            // Comma-separated string form: "prod,staging" -> ["prod", "staging"].
            Value::Str(s) => {
                let items: Vec<Value> = if s.is_empty() {
                    Vec::new()
                } else {
                    s.split(',').map(|part| Value::Str(part.to_string())).collect()
                };
                visitor.visit_seq(SeqDe::new(items))
            }
            Value::Nil => visitor.visit_seq(SeqDe::new(Vec::new())),
            // A lone scalar reads as a one-element sequence.
            scalar => visitor.visit_seq(SeqDe::new(vec![scalar])),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Table(entries) => visitor.visit_map(MapDe::new(entries)),
            Value::Nil => visitor.visit_map(MapDe::new(BTreeMap::new())),
            other => Err(ConfigError::conversion(other.kind(), "map", "unsupported")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        // std::time targets reach us as named two-field structs; feed
        // them from the duration/timestamp hooks so string forms decode.
        match name {
            "Duration" => {
                let d = self.0.coerce_duration()?;
                let entries = BTreeMap::from([
                    ("secs".to_string(), Value::Int(d.as_secs() as i64)),
                    ("nanos".to_string(), Value::Int(i64::from(d.subsec_nanos()))),
                ]);
                visitor.visit_map(MapDe::new(entries))
            }
            "SystemTime" => {
                let t = self.0.coerce_timestamp()?;
                let entries = BTreeMap::from([
                    ("secs_since_epoch".to_string(), Value::Int(t.timestamp())),
                    (
                        "nanos_since_epoch".to_string(),
                        Value::Int(i64::from(t.timestamp_subsec_nanos())),
                    ),
                ]);
                visitor.visit_map(MapDe::new(entries))
            }
            _ => self.deserialize_map(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        match self.0 {
            Value::Str(s) => visitor.visit_enum(EnumDe {
                variant: s,
                value: None,
            }),
            Value::Table(entries) => {
                let mut entries = entries.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((variant, value)), None) => visitor.visit_enum(EnumDe {
                        variant,
                        value: Some(value),
                    }),
                    _ => Err(ConfigError::conversion(
                        "table",
                        "enum",
                        "expected a single-variant table",
                    )),
                }
            }
            other => Err(ConfigError::conversion(other.kind(), "enum", "unsupported")),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ConfigError> {
        visitor.visit_unit()
    }
}

struct SeqDe {
    iter: std::vec::IntoIter<Value>,
}

impl SeqDe {
    fn new(items: Vec<Value>) -> Self {
        Self {
            iter: items.into_iter(),
        }
    }
}

impl<'de> de::SeqAccess<'de> for SeqDe {
    type Error = ConfigError;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, ConfigError> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDe(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDe {
    iter: btree_map::IntoIter<String, Value>,
    pending_value: Option<Value>,
}

impl MapDe {
    fn new(entries: BTreeMap<String, Value>) -> Self {
        Self {
            iter: entries.into_iter(),
            pending_value: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for MapDe {
    type Error = ConfigError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, ConfigError> {
        match self.iter.next() {
            Some((key, value)) => {
                self.pending_value = Some(value);
                seed.deserialize(key.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, ConfigError> {
        let value = self
            .pending_value
            .take()
            .ok_or_else(|| ConfigError::Decode("map value requested before key".into()))?;
        seed.deserialize(ValueDe(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDe {
    variant: String,
    value: Option<Value>,
}

impl<'de> de::EnumAccess<'de> for EnumDe {
    type Error = ConfigError;
    type Variant = VariantDe;

    fn variant_seed<V: de::DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantDe), ConfigError> {
        let variant =
            seed.deserialize(IntoDeserializer::<ConfigError>::into_deserializer(self.variant))?;
        Ok((variant, VariantDe { value: self.value }))
    }
}

struct VariantDe {
    value: Option<Value>,
}

impl<'de> de::VariantAccess<'de> for VariantDe {
    type Error = ConfigError;

    fn unit_variant(self) -> Result<(), ConfigError> {
        match self.value {
            None | Some(Value::Nil) => Ok(()),
            Some(other) => Err(ConfigError::conversion(
                other.kind(),
                "unit variant",
                "unexpected payload",
            )),
        }
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, ConfigError> {
        seed.deserialize(ValueDe(self.value.unwrap_or(Value::Nil)))
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        de::Deserializer::deserialize_seq(ValueDe(self.value.unwrap_or(Value::Nil)), visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ConfigError> {
        de::Deserializer::deserialize_map(ValueDe(self.value.unwrap_or(Value::Nil)), visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::net::IpAddr;
    use std::time::Duration;

    #[test]
    fn weakly_typed_scalars() {
        assert_eq!(decode_value::<i64>(Value::Str("8080".into())).unwrap(), 8080);
        assert_eq!(decode_value::<u16>(Value::Str("80".into())).unwrap(), 80);
        assert!(decode_value::<u16>(Value::Int(-1)).is_err());
        assert!(decode_value::<bool>(Value::Str("true".into())).unwrap());
        assert_eq!(decode_value::<String>(Value::Int(12)).unwrap(), "12");
        assert_eq!(decode_value::<f64>(Value::Str("2.5".into())).unwrap(), 2.5);
    }

    #[test]
    fn comma_split_sequences() {
        let tags: Vec<String> = decode_value(Value::Str("prod,staging".into())).unwrap();
        assert_eq!(tags, vec!["prod".to_string(), "staging".to_string()]);

        let empty: Vec<String> = decode_value(Value::Str(String::new())).unwrap();
        assert!(empty.is_empty());

        let singleton: Vec<i64> = decode_value(Value::Int(5)).unwrap();
        assert_eq!(singleton, vec![5]);
    }

    #[test]
    fn duration_interception() {
        let d: Duration = decode_value(Value::Str("1m30s".into())).unwrap();
        assert_eq!(d, Duration::from_secs(90));

        let native: Duration = decode_value(Value::Duration(Duration::from_millis(250))).unwrap();
        assert_eq!(native, Duration::from_millis(250));

        let secs: Duration = decode_value(Value::Int(30)).unwrap();
        assert_eq!(secs, Duration::from_secs(30));
    }

    #[test]
    fn network_types_parse_from_strings() {
        let ip: IpAddr = decode_value(Value::Str("192.168.1.100".into())).unwrap();
        assert_eq!(ip, "192.168.1.100".parse::<IpAddr>().unwrap());

        let url: url::Url = decode_value(Value::Str("https://example.com/".into())).unwrap();
        assert_eq!(url.as_str(), "https://example.com/");

        let net: ipnet::IpNet = decode_value(Value::Str("10.0.0.0/8".into())).unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/8");

        let ts: chrono::DateTime<chrono::Utc> =
            decode_value(Value::Str("2024-06-01T00:00:00Z".into())).unwrap();
        assert_eq!(ts.timestamp(), 1_717_200_000);
    }

    #[test]
    fn hook_caps_apply_to_string_targets() {
        use crate::domain::value::{MAX_IP_STR_LEN, MAX_URL_STR_LEN};

        // Oversize hook-shaped strings are rejected whatever the
        // destination type asks for.
        let long_ip = "ab:".repeat(2 * MAX_IP_STR_LEN);
        assert!(decode_value::<IpAddr>(Value::Str(long_ip.clone())).is_err());
        assert!(decode_value::<String>(Value::Str(long_ip)).is_err());

        let long_url = format!("https://example.com/{}", "a".repeat(MAX_URL_STR_LEN));
        assert!(decode_value::<url::Url>(Value::Str(long_url.clone())).is_err());
        assert!(decode_value::<String>(Value::Str(long_url.clone())).is_err());

        let long_cidr = format!("{}/64", "ab:".repeat(2 * MAX_IP_STR_LEN));
        assert!(decode_value::<ipnet::IpNet>(Value::Str(long_cidr)).is_err());

        // A typed URL value over the cap is refused at render time too.
        let typed = Value::Url(url::Url::parse(&long_url).unwrap());
        assert!(decode_value::<String>(typed).is_err());

        // Oversize text with no hook shape still decodes into a String.
        let prose = "word ".repeat(600);
        assert_eq!(
            decode_value::<String>(Value::Str(prose.clone())).unwrap(),
            prose
        );
    }

    #[test]
    fn options_and_enums() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "lowercase")]
        enum Level {
            Info,
            Debug,
        }

        let none: Option<String> = decode_value(Value::Nil).unwrap();
        assert_eq!(none, None);

        let some: Option<i64> = decode_value(Value::Str("4".into())).unwrap();
        assert_eq!(some, Some(4));

        let level: Level = decode_value(Value::Str("debug".into())).unwrap();
        assert_eq!(level, Level::Debug);
    }

    #[test]
    fn extra_keys_are_ignored() {
        #[derive(Debug, Deserialize, Default)]
        #[serde(default)]
        struct Small {
            a: i64,
        }

        let table = BTreeMap::from([
            ("a".to_string(), Value::Int(1)),
            ("unknown".to_string(), Value::Str("ignored".into())),
        ]);
        let small: Small = decode_value(Value::Table(table)).unwrap();
        assert_eq!(small.a, 1);
    }
}
