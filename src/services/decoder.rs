//! Typed decoding of the merged (or single-source) view.
//!
//! The registry snapshot is assembled into a nested tree under the
//! shared lock, the lock is released, and the conversion pipeline runs
//! over the private tree. Decoding is idempotent: the same registry
//! state always produces the same target.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::domain::errors::ConfigError;
use crate::domain::source::Source;
use crate::domain::tree;
use crate::domain::value::{de, Value};
use crate::services::registry::Config;

/// Version-gated cache for [`Config::as_struct`].
pub(crate) struct StructCache {
    type_id: TypeId,
    version: u64,
    value: Box<dyn Any + Send + Sync>,
}

impl Config {
    /// Decodes the merged view under `base_path` into `target`.
    ///
    /// The target is overwritten wholesale; an absent or empty subtree
    /// assigns `T::default()` and returns no error. A scalar at
    /// `base_path` is an error: scalars decode through
    /// [`decode_value`](Config::decode_value).
    pub fn decode<T>(&self, target: &mut T, base_path: &str) -> Result<(), ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        let root = Value::Table(self.merged_tree());
        decode_section(&root, base_path, target)
    }

    /// Decodes one source's entries under `base_path` into `target`.
    /// Paths the source has no opinion on are simply absent from the
    /// tree; no defaults are substituted.
    pub fn decode_from_source<T>(
        &self,
        target: &mut T,
        source: Source,
        base_path: &str,
    ) -> Result<(), ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        let root = Value::Table(self.source_tree(source));
        decode_section(&root, base_path, target)
    }

    /// Decodes a single registered value through the conversion
    /// pipeline.
    pub fn decode_value<T: DeserializeOwned>(&self, config_path: &str) -> Result<T, ConfigError> {
        let value = self
            .get(config_path)
            .ok_or_else(|| ConfigError::NotRegistered(config_path.to_string()))?;
        de::decode_value(value)
    }

    /// Allocates and decodes a `T` from the merged view under
    /// `base_path`.
    pub fn decode_typed<T>(&self, base_path: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        let mut target = T::default();
        self.decode(&mut target, base_path)?;
        Ok(target)
    }

    /// Returns the configuration decoded as `T`, repopulating an
    /// internal cache only when the version counter advanced since the
    /// last call (or the cached type differs).
    pub fn as_struct<T>(&self) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default + Clone + Send + Sync + 'static,
    {
        let current_version = self.version();

        {
            let cache = self.shared.struct_cache.lock().expect("struct cache lock");
            if let Some(cached) = cache.as_ref() {
                if cached.type_id == TypeId::of::<T>() && cached.version == current_version {
                    if let Some(value) = cached.value.downcast_ref::<T>() {
                        return Ok(value.clone());
                    }
                }
            }
        }

        let mut fresh = T::default();
        self.decode(&mut fresh, "")?;

        let mut cache = self.shared.struct_cache.lock().expect("struct cache lock");
        *cache = Some(StructCache {
            type_id: TypeId::of::<T>(),
            version: current_version,
            value: Box::new(fresh.clone()),
        });
        Ok(fresh)
    }

    /// Nested tree of every registered path's current value.
    pub(crate) fn merged_tree(&self) -> BTreeMap<String, Value> {
        let state = self.state_read();
        let mut nested = BTreeMap::new();
        for (item_path, item) in &state.items {
            tree::set_nested(&mut nested, item_path, item.current_value.clone());
        }
        nested
    }

    /// Nested tree of one source's entries only.
    pub(crate) fn source_tree(&self, source: Source) -> BTreeMap<String, Value> {
        let state = self.state_read();
        let mut nested = BTreeMap::new();
        for (item_path, item) in &state.items {
            if let Some(value) = item.values.get(&source) {
                tree::set_nested(&mut nested, item_path, value.clone());
            }
        }
        nested
    }
}

fn decode_section<T>(root: &Value, base_path: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: DeserializeOwned + Default,
{
    match tree::navigate(root, base_path) {
        None | Some(Value::Nil) => {
            *target = T::default();
            Ok(())
        }
        Some(section @ Value::Table(_)) => {
            *target = de::decode_value(section.clone())?;
            Ok(())
        }
        Some(other) => Err(ConfigError::NonMapAtPath {
            path: base_path.to_string(),
            found: other.kind(),
        }),
    }
}
