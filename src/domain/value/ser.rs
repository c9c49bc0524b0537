//! `Serialize` → [`Value`] bridge.
//!
//! Struct registration walks a `Serialize` impl instead of runtime
//! reflection: the defaults struct is serialized into a [`Value`] tree and
//! the tree's leaves become registered paths. `std::time::Duration` and
//! `std::time::SystemTime` serialize as two-field structs; those are
//! intercepted by struct name and captured as single typed leaves so a
//! duration field registers one path, not `secs`/`nanos` pairs.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::{self, Serialize};

use crate::domain::errors::ConfigError;
use crate::domain::value::Value;

/// Serializes any `Serialize` value into a [`Value`] tree.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, ConfigError> {
    value.serialize(ValueSerializer)
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = ConfigError;

    type SerializeSeq = SeqCollector;
    type SerializeTuple = SeqCollector;
    type SerializeTupleStruct = SeqCollector;
    type SerializeTupleVariant = VariantSeqCollector;
    type SerializeMap = MapCollector;
    type SerializeStruct = StructCollector;
    type SerializeStructVariant = VariantMapCollector;

    fn serialize_bool(self, v: bool) -> Result<Value, ConfigError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, ConfigError> {
        Ok(Value::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, ConfigError> {
        Ok(Value::Int(i64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, ConfigError> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| ConfigError::Serialize(format!("integer {v} overflows i64")))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, ConfigError> {
        Ok(Value::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, ConfigError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, ConfigError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, ConfigError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, ConfigError> {
        Ok(Value::Array(
            v.iter().map(|b| Value::Int(i64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value, ConfigError> {
        Ok(Value::Nil)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, ConfigError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, ConfigError> {
        Ok(Value::Nil)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, ConfigError> {
        Ok(Value::Nil)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, ConfigError> {
        Ok(Value::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, ConfigError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, ConfigError> {
        let mut table = BTreeMap::new();
        table.insert(variant.to_string(), value.serialize(ValueSerializer)?);
        Ok(Value::Table(table))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector, ConfigError> {
        Ok(SeqCollector {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector, ConfigError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCollector, ConfigError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqCollector, ConfigError> {
        Ok(VariantSeqCollector {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapCollector, ConfigError> {
        Ok(MapCollector {
            entries: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<StructCollector, ConfigError> {
        Ok(StructCollector {
            name,
            entries: BTreeMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapCollector, ConfigError> {
        Ok(VariantMapCollector {
            variant,
            entries: BTreeMap::new(),
        })
    }
}

pub struct SeqCollector {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConfigError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ConfigError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConfigError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, ConfigError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConfigError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, ConfigError> {
        ser::SerializeSeq::end(self)
    }
}

pub struct VariantSeqCollector {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConfigError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ConfigError> {
        let mut table = BTreeMap::new();
        table.insert(self.variant.to_string(), Value::Array(self.items));
        Ok(Value::Table(table))
    }
}

pub struct MapCollector {
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), ConfigError> {
        self.pending_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ConfigError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| ConfigError::Serialize("map value before key".into()))?;
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ConfigError> {
        Ok(Value::Table(self.entries))
    }
}

pub struct StructCollector {
    name: &'static str,
    entries: BTreeMap<String, Value>,
}

impl ser::SerializeStruct for StructCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConfigError> {
        self.entries
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn skip_field(&mut self, _key: &'static str) -> Result<(), ConfigError> {
        Ok(())
    }

    fn end(self) -> Result<Value, ConfigError> {
        // std::time types serialize as two-field structs; fold them back
        // into single typed leaves.
        match self.name {
            "Duration" => {
                if let (Some(Value::Int(secs)), Some(Value::Int(nanos))) =
                    (self.entries.get("secs"), self.entries.get("nanos"))
                {
                    if *secs >= 0 && (0..1_000_000_000).contains(nanos) {
                        return Ok(Value::Duration(Duration::new(*secs as u64, *nanos as u32)));
                    }
                }
            }
            "SystemTime" => {
                if let (Some(Value::Int(secs)), Some(Value::Int(nanos))) = (
                    self.entries.get("secs_since_epoch"),
                    self.entries.get("nanos_since_epoch"),
                ) {
                    if let Some(time) = DateTime::<Utc>::from_timestamp(*secs, *nanos as u32) {
                        return Ok(Value::Time(time));
                    }
                }
            }
            _ => {}
        }
        Ok(Value::Table(self.entries))
    }
}

pub struct VariantMapCollector {
    variant: &'static str,
    entries: BTreeMap<String, Value>,
}

impl ser::SerializeStructVariant for VariantMapCollector {
    type Ok = Value;
    type Error = ConfigError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ConfigError> {
        self.entries
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, ConfigError> {
        let mut table = BTreeMap::new();
        table.insert(self.variant.to_string(), Value::Table(self.entries));
        Ok(Value::Table(table))
    }
}

/// Map keys must stringify; non-scalar keys are refused.
struct KeySerializer;

macro_rules! key_from_display {
    ($method:ident, $ty:ty) => {
        fn $method(self, v: $ty) -> Result<String, ConfigError> {
            Ok(v.to_string())
        }
    };
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = ConfigError;

    type SerializeSeq = ser::Impossible<String, ConfigError>;
    type SerializeTuple = ser::Impossible<String, ConfigError>;
    type SerializeTupleStruct = ser::Impossible<String, ConfigError>;
    type SerializeTupleVariant = ser::Impossible<String, ConfigError>;
    type SerializeMap = ser::Impossible<String, ConfigError>;
    type SerializeStruct = ser::Impossible<String, ConfigError>;
    type SerializeStructVariant = ser::Impossible<String, ConfigError>;

    key_from_display!(serialize_bool, bool);
    key_from_display!(serialize_i8, i8);
    key_from_display!(serialize_i16, i16);
    key_from_display!(serialize_i32, i32);
    key_from_display!(serialize_i64, i64);
    key_from_display!(serialize_u8, u8);
    key_from_display!(serialize_u16, u16);
    key_from_display!(serialize_u32, u32);
    key_from_display!(serialize_u64, u64);
    key_from_display!(serialize_char, char);

    fn serialize_f32(self, _v: f32) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("float map keys unsupported".into()))
    }

    fn serialize_f64(self, _v: f64) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("float map keys unsupported".into()))
    }

    fn serialize_str(self, v: &str) -> Result<String, ConfigError> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("byte map keys unsupported".into()))
    }

    fn serialize_none(self) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("nil map keys unsupported".into()))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String, ConfigError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("unit map keys unsupported".into()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("unit map keys unsupported".into()))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, ConfigError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, ConfigError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, ConfigError> {
        Err(ConfigError::Serialize("variant map keys unsupported".into()))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, ConfigError> {
        Err(ConfigError::Serialize("sequence map keys unsupported".into()))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, ConfigError> {
        Err(ConfigError::Serialize("tuple map keys unsupported".into()))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, ConfigError> {
        Err(ConfigError::Serialize("tuple map keys unsupported".into()))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, ConfigError> {
        Err(ConfigError::Serialize("tuple map keys unsupported".into()))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, ConfigError> {
        Err(ConfigError::Serialize("map map keys unsupported".into()))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, ConfigError> {
        Err(ConfigError::Serialize("struct map keys unsupported".into()))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, ConfigError> {
        Err(ConfigError::Serialize("struct map keys unsupported".into()))
    }
}
