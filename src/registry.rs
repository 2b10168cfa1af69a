//! Registration table: runtime type → (numeric id, codec-or-passthrough).
//!
//! # Identity rules
//! At most one entry exists per runtime type.  Re-registering a type swaps
//! its codec in place — same id, same position — so callers can override a
//! default codec without disturbing the id assignment of everything
//! registered after it.  An explicit id already bound to a *different* type
//! is a fatal [`CodecError::IdConflict`]; ids are wire identity and are
//! never silently reassigned.
//!
//! Implicit ids are the lowest free ids in registration order, which makes
//! the registration order itself part of the wire contract: both sides of a
//! connection must install the same entries in the same order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{Codec, CodecError};

/// One table entry.  `codec == None` is a passthrough registration: the
/// engine serializes the type through its own native handling.
#[derive(Clone)]
pub struct Registration {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub id: u32,
    pub codec: Option<Arc<dyn Codec>>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .field("codec", &self.codec.as_ref().map(|_| "..."))
            .finish()
    }
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<Registration>,
    by_type: HashMap<TypeId, usize>,
    by_id: HashMap<u32, usize>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` with the lowest free id and no codec (engine-native
    /// passthrough).
    pub fn register<T: Any>(&mut self) -> Result<u32, CodecError> {
        self.upsert(TypeId::of::<T>(), std::any::type_name::<T>(), None, None)
    }

    /// Register `T` with an explicit id and no codec.
    pub fn register_with_id<T: Any>(&mut self, id: u32) -> Result<u32, CodecError> {
        self.upsert(TypeId::of::<T>(), std::any::type_name::<T>(), None, Some(id))
    }

    /// Register `T` with the lowest free id and the given codec.
    pub fn register_codec<T: Any>(&mut self, codec: Arc<dyn Codec>) -> Result<u32, CodecError> {
        self.upsert(TypeId::of::<T>(), std::any::type_name::<T>(), Some(codec), None)
    }

    /// Register `T` with an explicit id and the given codec.
    pub fn register_codec_with_id<T: Any>(
        &mut self,
        codec: Arc<dyn Codec>,
        id: u32,
    ) -> Result<u32, CodecError> {
        self.upsert(TypeId::of::<T>(), std::any::type_name::<T>(), Some(codec), Some(id))
    }

    /// Non-generic registration path used by the variant families, which
    /// register several runtime types against one shared codec instance.
    pub fn register_raw(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        codec: Option<Arc<dyn Codec>>,
    ) -> Result<u32, CodecError> {
        self.upsert(type_id, type_name, codec, None)
    }

    /// Non-generic registration with an explicit id, for callers that only
    /// hold a runtime [`TypeId`] (e.g. a management facade).
    pub fn register_raw_with_id(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        codec: Option<Arc<dyn Codec>>,
        id: u32,
    ) -> Result<u32, CodecError> {
        self.upsert(type_id, type_name, codec, Some(id))
    }

    fn upsert(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        codec: Option<Arc<dyn Codec>>,
        explicit_id: Option<u32>,
    ) -> Result<u32, CodecError> {
        if let Some(&pos) = self.by_type.get(&type_id) {
            // Existing type: overwrite the codec in place.  The entry keeps
            // its position and its id unless the caller binds a new explicit
            // id, which must not collide with a different type.
            if let Some(id) = explicit_id {
                match self.by_id.get(&id) {
                    Some(&other) if other != pos => {
                        return Err(CodecError::IdConflict {
                            id,
                            bound: self.entries[other].type_name,
                            requested: type_name,
                        });
                    }
                    Some(_) => {}
                    None => {
                        self.by_id.remove(&self.entries[pos].id);
                        self.entries[pos].id = id;
                        self.by_id.insert(id, pos);
                    }
                }
            }
            self.entries[pos].codec = codec;
            return Ok(self.entries[pos].id);
        }

        let id = match explicit_id {
            Some(id) => {
                if let Some(&other) = self.by_id.get(&id) {
                    return Err(CodecError::IdConflict {
                        id,
                        bound: self.entries[other].type_name,
                        requested: type_name,
                    });
                }
                id
            }
            None => {
                // Lowest free id, skipping anything explicitly claimed.
                while self.by_id.contains_key(&self.next_id) {
                    self.next_id += 1;
                }
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };

        let pos = self.entries.len();
        self.entries.push(Registration { type_id, type_name, id, codec });
        self.by_type.insert(type_id, pos);
        self.by_id.insert(id, pos);
        Ok(id)
    }

    pub fn resolve(&self, type_id: TypeId) -> Option<&Registration> {
        self.by_type.get(&type_id).map(|&pos| &self.entries[pos])
    }

    pub fn resolve_id(&self, id: u32) -> Option<&Registration> {
        self.by_id.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.iter()
    }
}
