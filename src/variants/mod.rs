//! Collection-variant codecs.
//!
//! Each family here covers several runtime shapes that are structurally
//! alike but behaviorally distinct — frozen vs. mutable, synchronized vs.
//! plain, sorted vs. unsorted, order-preserving vs. not, enum-keyed vs.
//! general-keyed, fixed view vs. growable.  Equal contents are not enough:
//! a round trip must hand back the *same concrete shape*, because callers
//! type-test decoded values and rely on the shape's guarantees.
//!
//! # Tag discovery
//! Families never hardcode type identities.  At construction, each family
//! builds one sample per variant through the same public factory its
//! decoder uses and records the sample's observed [`TypeId`] against the
//! variant's wire tag.  Factory and codec therefore cannot disagree about a
//! variant's concrete type, and the table is immutable for the codec's
//! lifetime.
//!
//! # Failure policy
//! An encode-time table miss is [`CodecError::UnsupportedVariant`]: the
//! registry dispatched a value this family was never taught, which is a
//! completeness defect in the registry, not bad data, and is never papered
//! over by encoding a generic shape.  A decode-time tag outside the closed
//! set is [`CodecError::MalformedPayload`].

mod enumkeyed;
mod singleton;
mod views;
mod wrappers;

pub use enumkeyed::EnumKeyedCodec;
pub use singleton::SingletonCodec;
pub use views::ViewCodec;
pub use wrappers::{FrozenCodec, SyncedCodec};

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{obj_type_id, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::registry::Registry;
use crate::wire::{Sink, Source};
use crate::wrap::Key;

pub(crate) struct TagEntry {
    pub type_id: TypeId,
    pub label: &'static str,
}

/// Observed-signature table: concrete runtime type → wire tag.
pub(crate) struct TagTable {
    family: &'static str,
    entries: Vec<TagEntry>,
    by_type: HashMap<TypeId, u32>,
}

impl TagTable {
    pub fn new(family: &'static str) -> Self {
        Self { family, entries: Vec::new(), by_type: HashMap::new() }
    }

    /// Record the concrete type of a factory-built sample under `tag`.
    pub fn observe(&mut self, sample: Obj, label: &'static str, tag: u32) {
        let type_id = obj_type_id(&sample);
        self.by_type.insert(type_id, tag);
        self.entries.push(TagEntry { type_id, label });
    }

    pub fn tag_for(&self, type_id: TypeId) -> Option<u32> {
        self.by_type.get(&type_id).copied()
    }

    /// The fatal encode-time miss.
    pub fn miss(&self, value: &Obj) -> CodecError {
        CodecError::UnsupportedVariant {
            family: self.family,
            detail: format!("{:?}", obj_type_id(value)),
        }
    }

    /// Register every member type of this family against one shared codec
    /// instance.
    pub fn register_all(
        &self,
        registry: &mut Registry,
        codec: Arc<dyn Codec>,
    ) -> Result<(), CodecError> {
        for entry in &self.entries {
            registry.register_raw(entry.type_id, entry.label, Some(codec.clone()))?;
        }
        Ok(())
    }
}

// ── Shared payload helpers ───────────────────────────────────────────────────
//
// Sequence payloads: varint count, then elements in order.  Set payloads:
// varint count, then keys.  Map payloads: varint count, then key/value
// pairs.  Order is whatever the backing structure's iteration yields, so
// order-preserving backings stay order-preserving on the wire for free.

pub(crate) fn write_objs(
    ctx: &mut WriteCtx<'_>,
    sink: &mut Sink,
    items: &[Obj],
) -> Result<(), CodecError> {
    sink.write_var_u64(items.len() as u64)?;
    for item in items {
        ctx.write_obj(sink, item)?;
    }
    Ok(())
}

pub(crate) fn read_objs(
    ctx: &mut ReadCtx<'_>,
    source: &mut Source<'_>,
) -> Result<Vec<Obj>, CodecError> {
    let len = source.read_var_u64()? as usize;
    let mut out = Vec::with_capacity(len.min(source.remaining()));
    for _ in 0..len {
        out.push(ctx.read_obj(source)?);
    }
    Ok(out)
}

pub(crate) fn write_keys<'k>(
    sink: &mut Sink,
    len: usize,
    keys: impl Iterator<Item = &'k Key>,
) -> Result<(), CodecError> {
    sink.write_var_u64(len as u64)?;
    for key in keys {
        key.write(sink)?;
    }
    Ok(())
}

pub(crate) fn read_keys(
    ctx: &mut ReadCtx<'_>,
    source: &mut Source<'_>,
) -> Result<Vec<Key>, CodecError> {
    let len = source.read_var_u64()? as usize;
    let mut out = Vec::with_capacity(len.min(source.remaining()));
    for _ in 0..len {
        out.push(Key::read(ctx, source)?);
    }
    Ok(out)
}

pub(crate) fn write_pairs<'k>(
    ctx: &mut WriteCtx<'_>,
    sink: &mut Sink,
    len: usize,
    pairs: impl Iterator<Item = (&'k Key, &'k Obj)>,
) -> Result<(), CodecError> {
    sink.write_var_u64(len as u64)?;
    for (key, value) in pairs {
        key.write(sink)?;
        ctx.write_obj(sink, value)?;
    }
    Ok(())
}

pub(crate) fn read_pairs(
    ctx: &mut ReadCtx<'_>,
    source: &mut Source<'_>,
) -> Result<Vec<(Key, Obj)>, CodecError> {
    let len = source.read_var_u64()? as usize;
    let mut out = Vec::with_capacity(len.min(source.remaining()));
    for _ in 0..len {
        let key = Key::read(ctx, source)?;
        let value = ctx.read_obj(source)?;
        out.push((key, value));
    }
    Ok(out)
}
