//! Response serializers keyed by format name.
//!
//! The registry is read on every request and written only by administrative
//! calls, so it holds an immutable snapshot behind `ArcSwap`: readers load
//! without locking, writers clone the map and swap the new one in.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::SerializeError;
use crate::handler::Payload;

pub const DEFAULT_FORMAT: &str = "json";

/// Encodes an envelope into a response body.
pub trait ResponseSerializer: Send + Sync {
    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>, SerializeError>;

    /// Value for the `Content-Type` response header.
    fn content_type(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ResponseSerializer for JsonSerializer {
    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>, SerializeError> {
        Ok(serde_json::to_vec(payload)?)
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl ResponseSerializer for YamlSerializer {
    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>, SerializeError> {
        Ok(serde_yaml::to_string(payload)?.into_bytes())
    }

    fn content_type(&self) -> &str {
        "application/yaml"
    }
}

type SerializerMap = BTreeMap<String, Arc<dyn ResponseSerializer>>;

pub struct SerializerRegistry {
    current: ArcSwap<SerializerMap>,
    // serializes writers; readers never take it
    write: Mutex<()>,
}

impl SerializerRegistry {
    /// Registry with only `json` installed.
    pub fn new() -> Self {
        let mut map = SerializerMap::new();
        map.insert(
            DEFAULT_FORMAT.to_string(),
            Arc::new(JsonSerializer) as Arc<dyn ResponseSerializer>,
        );
        Self::from_map(map)
    }

    pub fn empty() -> Self {
        Self::from_map(SerializerMap::new())
    }

    fn from_map(map: SerializerMap) -> Self {
        Self {
            current: ArcSwap::from_pointee(map),
            write: Mutex::new(()),
        }
    }

    /// Install or replace the serializer for `format`.
    pub fn register(&self, format: impl Into<String>, serializer: Arc<dyn ResponseSerializer>) {
        let format = format.into();
        let _guard = self.write.lock();
        let mut next = SerializerMap::clone(&self.current.load());
        if next.insert(format.clone(), serializer).is_some() {
            tracing::debug!(format = %format, "replaced response serializer");
        }
        self.current.store(Arc::new(next));
    }

    /// Remove a format. Returns whether it was present.
    pub fn unregister(&self, format: &str) -> bool {
        let _guard = self.write.lock();
        let mut next = SerializerMap::clone(&self.current.load());
        let removed = next.remove(format).is_some();
        if removed {
            self.current.store(Arc::new(next));
        }
        removed
    }

    pub fn get(&self, format: &str) -> Option<Arc<dyn ResponseSerializer>> {
        self.current.load().get(format).cloned()
    }

    /// Registered format names, sorted.
    pub fn available_formats(&self) -> Vec<String> {
        self.current.load().keys().cloned().collect()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("formats", &self.available_formats())
            .finish()
    }
}
