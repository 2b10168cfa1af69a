//! Frozen (unmodifiable) and synchronized wrapper families.
//!
//! A frozen wrapper is `Arc<C>`: shared, no mutation path while shared.  A
//! synchronized wrapper is `Mutex<C>`.  Within each family every member is
//! the same wrapper over a different backing collection, and the backing
//! decides the behavior — sorted iteration for the B-tree shapes, insertion
//! order for the index map, nothing for the hash shapes.  Decoding always
//! rebuilds the exact backing and re-wraps through the matching factory;
//! rebuilding a frozen sorted map as a frozen hash map would silently drop
//! the ordering guarantee downstream type tests depend on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::codec::{expect_obj, obj_type_id, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::registry::Registry;
use crate::variants::{read_keys, read_objs, read_pairs, write_keys, write_objs, write_pairs, TagTable};
use crate::wire::{Sink, Source};
use crate::wrap::{self, Key};

// Frozen variant tags are the wire contract.  Values are permanent: new
// variants append, nothing is ever renumbered or reused.
const FROZEN_LIST: u32 = 0;
const FROZEN_SET: u32 = 1;
const FROZEN_SORTED_SET: u32 = 2;
const FROZEN_MAP: u32 = 3;
const FROZEN_SORTED_MAP: u32 = 4;
const FROZEN_ORDERED_MAP: u32 = 5;

/// Codec for the frozen wrapper family.
pub struct FrozenCodec {
    table: TagTable,
}

impl FrozenCodec {
    pub fn new() -> Self {
        let mut table = TagTable::new("frozen");
        table.observe(wrap::frozen_list(Vec::new()), "frozen list", FROZEN_LIST);
        table.observe(wrap::frozen_set(HashSet::new()), "frozen set", FROZEN_SET);
        table.observe(
            wrap::frozen_sorted_set(BTreeSet::new()),
            "frozen sorted set",
            FROZEN_SORTED_SET,
        );
        table.observe(wrap::frozen_map(HashMap::new()), "frozen map", FROZEN_MAP);
        table.observe(
            wrap::frozen_sorted_map(BTreeMap::new()),
            "frozen sorted map",
            FROZEN_SORTED_MAP,
        );
        table.observe(
            wrap::frozen_ordered_map(IndexMap::new()),
            "frozen ordered map",
            FROZEN_ORDERED_MAP,
        );
        Self { table }
    }

    /// Register every frozen variant against one shared codec instance.
    pub fn register_all(registry: &mut Registry) -> Result<(), CodecError> {
        let codec = Arc::new(Self::new());
        codec.table.register_all(registry, codec.clone())
    }
}

impl Default for FrozenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for FrozenCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tag = self
            .table
            .tag_for(obj_type_id(value))
            .ok_or_else(|| self.table.miss(value))?;
        sink.write_var_u32(tag)?;
        match tag {
            FROZEN_LIST => {
                let v = expect_obj::<Arc<Vec<Obj>>>(value, "frozen list")?;
                write_objs(ctx, sink, &v)
            }
            FROZEN_SET => {
                let v = expect_obj::<Arc<HashSet<Key>>>(value, "frozen set")?;
                write_keys(sink, v.len(), v.iter())
            }
            FROZEN_SORTED_SET => {
                let v = expect_obj::<Arc<BTreeSet<Key>>>(value, "frozen sorted set")?;
                write_keys(sink, v.len(), v.iter())
            }
            FROZEN_MAP => {
                let v = expect_obj::<Arc<HashMap<Key, Obj>>>(value, "frozen map")?;
                write_pairs(ctx, sink, v.len(), v.iter())
            }
            FROZEN_SORTED_MAP => {
                let v = expect_obj::<Arc<BTreeMap<Key, Obj>>>(value, "frozen sorted map")?;
                write_pairs(ctx, sink, v.len(), v.iter())
            }
            FROZEN_ORDERED_MAP => {
                let v = expect_obj::<Arc<IndexMap<Key, Obj>>>(value, "frozen ordered map")?;
                write_pairs(ctx, sink, v.len(), v.iter())
            }
            _ => unreachable!("tag table yields only known tags"),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        match source.read_var_u32()? {
            FROZEN_LIST => Ok(wrap::frozen_list(read_objs(ctx, source)?)),
            FROZEN_SET => Ok(wrap::frozen_set(read_keys(ctx, source)?.into_iter().collect())),
            FROZEN_SORTED_SET => {
                Ok(wrap::frozen_sorted_set(read_keys(ctx, source)?.into_iter().collect()))
            }
            FROZEN_MAP => Ok(wrap::frozen_map(read_pairs(ctx, source)?.into_iter().collect())),
            FROZEN_SORTED_MAP => {
                Ok(wrap::frozen_sorted_map(read_pairs(ctx, source)?.into_iter().collect()))
            }
            FROZEN_ORDERED_MAP => {
                Ok(wrap::frozen_ordered_map(read_pairs(ctx, source)?.into_iter().collect()))
            }
            tag => Err(CodecError::MalformedPayload(format!(
                "frozen variant tag {tag} outside the closed set"
            ))),
        }
    }
}

// Synchronized variant tags.  Same contract as the frozen tags: append
// only, never renumber.
const SYNCED_LIST: u32 = 0;
const SYNCED_SET: u32 = 1;
const SYNCED_SORTED_SET: u32 = 2;
const SYNCED_MAP: u32 = 3;
const SYNCED_SORTED_MAP: u32 = 4;

/// Codec for the synchronized wrapper family.
///
/// The encoder holds the wrapper's lock for the whole element walk, so a
/// concurrently mutating writer can never produce a torn payload.
pub struct SyncedCodec {
    table: TagTable,
}

impl SyncedCodec {
    pub fn new() -> Self {
        let mut table = TagTable::new("synced");
        table.observe(wrap::synced_list(Vec::new()), "synced list", SYNCED_LIST);
        table.observe(wrap::synced_set(HashSet::new()), "synced set", SYNCED_SET);
        table.observe(
            wrap::synced_sorted_set(BTreeSet::new()),
            "synced sorted set",
            SYNCED_SORTED_SET,
        );
        table.observe(wrap::synced_map(HashMap::new()), "synced map", SYNCED_MAP);
        table.observe(
            wrap::synced_sorted_map(BTreeMap::new()),
            "synced sorted map",
            SYNCED_SORTED_MAP,
        );
        Self { table }
    }

    pub fn register_all(registry: &mut Registry) -> Result<(), CodecError> {
        let codec = Arc::new(Self::new());
        codec.table.register_all(registry, codec.clone())
    }
}

impl Default for SyncedCodec {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock is read through; serialization only reads.
fn read_locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Codec for SyncedCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tag = self
            .table
            .tag_for(obj_type_id(value))
            .ok_or_else(|| self.table.miss(value))?;
        sink.write_var_u32(tag)?;
        match tag {
            SYNCED_LIST => {
                let m = expect_obj::<Mutex<Vec<Obj>>>(value, "synced list")?;
                let v = read_locked(&m);
                write_objs(ctx, sink, &v)
            }
            SYNCED_SET => {
                let m = expect_obj::<Mutex<HashSet<Key>>>(value, "synced set")?;
                let v = read_locked(&m);
                write_keys(sink, v.len(), v.iter())
            }
            SYNCED_SORTED_SET => {
                let m = expect_obj::<Mutex<BTreeSet<Key>>>(value, "synced sorted set")?;
                let v = read_locked(&m);
                write_keys(sink, v.len(), v.iter())
            }
            SYNCED_MAP => {
                let m = expect_obj::<Mutex<HashMap<Key, Obj>>>(value, "synced map")?;
                let v = read_locked(&m);
                write_pairs(ctx, sink, v.len(), v.iter())
            }
            SYNCED_SORTED_MAP => {
                let m = expect_obj::<Mutex<BTreeMap<Key, Obj>>>(value, "synced sorted map")?;
                let v = read_locked(&m);
                write_pairs(ctx, sink, v.len(), v.iter())
            }
            _ => unreachable!("tag table yields only known tags"),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        match source.read_var_u32()? {
            SYNCED_LIST => Ok(wrap::synced_list(read_objs(ctx, source)?)),
            SYNCED_SET => Ok(wrap::synced_set(read_keys(ctx, source)?.into_iter().collect())),
            SYNCED_SORTED_SET => {
                Ok(wrap::synced_sorted_set(read_keys(ctx, source)?.into_iter().collect()))
            }
            SYNCED_MAP => Ok(wrap::synced_map(read_pairs(ctx, source)?.into_iter().collect())),
            SYNCED_SORTED_MAP => {
                Ok(wrap::synced_sorted_map(read_pairs(ctx, source)?.into_iter().collect()))
            }
            tag => Err(CodecError::MalformedPayload(format!(
                "synced variant tag {tag} outside the closed set"
            ))),
        }
    }
}
