//! Host object model: map/set keys, enum domains, singleton containers, and
//! the wrapper-construction factories the variant codecs reconstruct through.
//!
//! Wrapper shapes with a standard-library equivalent use it directly:
//! `Arc<C>` for frozen (unmodifiable) wrappers, `Mutex<C>` for synchronized
//! wrappers, `Box<[T]>` for fixed-size array views, `BTreeMap`/`BTreeSet`
//! for sorted shapes, [`IndexMap`] for order-preserving maps.  Singleton and
//! enum-keyed containers have no stdlib equivalent and are defined here.
//!
//! Every factory in this module is a *construction identity*: decoding a
//! value always goes back through the same factory that produced the
//! original, so the reconstructed value has the exact concrete type — and
//! therefore the exact behavior — of the source value.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::codec::{CodecError, Obj};
use crate::engine::ReadCtx;
use crate::wire::{Sink, Source};

/// Wrap any concrete value into an [`Obj`] handle.
pub fn obj<T: Any + Send + Sync>(v: T) -> Obj {
    Arc::new(v)
}

// ── Keys ─────────────────────────────────────────────────────────────────────

const KEY_BOOL: u8 = 0;
const KEY_INT: u8 = 1;
const KEY_STR: u8 = 2;
const KEY_ENUM: u8 = 3;

/// Scalar map/set key.
///
/// Dynamic keys must be hashable and totally ordered, which an `Obj` handle
/// cannot offer, so keys are drawn from this closed scalar set.  Floats are
/// deliberately excluded (no total order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(String),
    Enum(EnumVal),
}

impl Key {
    pub(crate) fn write(&self, sink: &mut Sink) -> Result<(), CodecError> {
        match self {
            Key::Bool(b) => {
                sink.write_u8(KEY_BOOL)?;
                sink.write_u8(u8::from(*b))
            }
            Key::Int(i) => {
                sink.write_u8(KEY_INT)?;
                sink.write_var_i64(*i)
            }
            Key::Str(s) => {
                sink.write_u8(KEY_STR)?;
                sink.write_str(s)
            }
            Key::Enum(e) => {
                sink.write_u8(KEY_ENUM)?;
                e.write(sink)
            }
        }
    }

    pub(crate) fn read(ctx: &ReadCtx<'_>, source: &mut Source<'_>) -> Result<Key, CodecError> {
        match source.read_u8()? {
            KEY_BOOL => Ok(Key::Bool(source.read_u8()? != 0)),
            KEY_INT => Ok(Key::Int(source.read_var_i64()?)),
            KEY_STR => Ok(Key::Str(source.read_str()?)),
            KEY_ENUM => Ok(Key::Enum(EnumVal::read(ctx, source)?)),
            tag => Err(CodecError::MalformedPayload(format!("unknown key tag {tag}"))),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

// ── Enum domains ─────────────────────────────────────────────────────────────

/// A runtime enum type: a stable name plus its constants in declaration
/// order.  Domains are `'static` and registered on the engine by the host;
/// the name is the wire identity.
#[derive(Debug)]
pub struct EnumDomain {
    pub name: &'static str,
    pub constants: &'static [&'static str],
}

impl EnumDomain {
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Constant at `ordinal`, if in range.
    pub fn value(&'static self, ordinal: u32) -> Option<EnumVal> {
        ((ordinal as usize) < self.constants.len()).then_some(EnumVal { domain: self, ordinal })
    }

    /// Constant with the given name, if declared.
    pub fn by_name(&'static self, name: &str) -> Option<EnumVal> {
        self.constants
            .iter()
            .position(|c| *c == name)
            .map(|i| EnumVal { domain: self, ordinal: i as u32 })
    }

    /// All constants in declaration order.
    pub fn values(&'static self) -> impl Iterator<Item = EnumVal> {
        (0..self.constants.len() as u32).map(move |ordinal| EnumVal { domain: self, ordinal })
    }
}

/// One enum constant: a domain plus an ordinal into its declaration order.
#[derive(Clone, Copy)]
pub struct EnumVal {
    pub domain: &'static EnumDomain,
    pub ordinal: u32,
}

impl EnumVal {
    pub fn name(&self) -> &'static str {
        self.domain.constants[self.ordinal as usize]
    }

    pub(crate) fn write(&self, sink: &mut Sink) -> Result<(), CodecError> {
        sink.write_str(self.domain.name)?;
        sink.write_var_u32(self.ordinal)
    }

    pub(crate) fn read(ctx: &ReadCtx<'_>, source: &mut Source<'_>) -> Result<Self, CodecError> {
        let name = source.read_str()?;
        let domain = ctx.resolve_domain(&name)?;
        let ordinal = source.read_var_u32()?;
        if ordinal as usize >= domain.constants.len() {
            return Err(CodecError::MalformedPayload(format!(
                "ordinal {ordinal} out of range for enum domain {name}"
            )));
        }
        Ok(EnumVal { domain, ordinal })
    }
}

// Domains are unique per name (the engine's domain table enforces it), so
// name-based equality keeps Eq, Hash and Ord mutually consistent.
impl PartialEq for EnumVal {
    fn eq(&self, other: &Self) -> bool {
        self.domain.name == other.domain.name && self.ordinal == other.ordinal
    }
}

impl Eq for EnumVal {}

impl std::hash::Hash for EnumVal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.domain.name.hash(state);
        self.ordinal.hash(state);
    }
}

impl PartialOrd for EnumVal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EnumVal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.domain.name, self.ordinal).cmp(&(other.domain.name, other.ordinal))
    }
}

impl std::fmt::Debug for EnumVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.domain.name, self.name())
    }
}

// ── Enum-keyed containers ────────────────────────────────────────────────────

/// Map keyed by the constants of one enum domain.
///
/// Backing storage is one slot per constant, so iteration is always in key
/// declaration order and lookups never hash.  The keying domain is fixed at
/// construction and cannot be inferred from contents; its codec persists
/// the domain identity unconditionally.
#[derive(Clone)]
pub struct EnumMap {
    domain: &'static EnumDomain,
    slots: Vec<Option<Obj>>,
}

impl EnumMap {
    pub fn new(domain: &'static EnumDomain) -> Self {
        Self { domain, slots: vec![None; domain.constants.len()] }
    }

    pub fn domain(&self) -> &'static EnumDomain {
        self.domain
    }

    /// Previous value for the key, if any.  Panics if `key` belongs to a
    /// different domain: cross-domain keys are an API contract violation,
    /// not a recoverable condition.
    pub fn insert(&mut self, key: EnumVal, value: Obj) -> Option<Obj> {
        assert!(
            std::ptr::eq(key.domain, self.domain),
            "key domain {} does not match map domain {}",
            key.domain.name,
            self.domain.name
        );
        self.slots[key.ordinal as usize].replace(value)
    }

    pub fn get(&self, key: EnumVal) -> Option<&Obj> {
        if !std::ptr::eq(key.domain, self.domain) {
            return None;
        }
        self.slots[key.ordinal as usize].as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Entries in key declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (EnumVal, &Obj)> {
        let domain = self.domain;
        self.slots.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref()
                .map(|v| (EnumVal { domain, ordinal: i as u32 }, v))
        })
    }
}

/// Set over the constants of one enum domain, stored as a bitset.
/// Domains are capped at 128 constants.
#[derive(Debug, Clone)]
pub struct EnumSet {
    domain: &'static EnumDomain,
    bits: u128,
}

impl EnumSet {
    pub fn new(domain: &'static EnumDomain) -> Self {
        assert!(
            domain.constants.len() <= 128,
            "enum domain {} has more than 128 constants",
            domain.name
        );
        Self { domain, bits: 0 }
    }

    /// Set containing every constant of the domain.
    pub fn all(domain: &'static EnumDomain) -> Self {
        let mut set = Self::new(domain);
        for v in domain.values() {
            set.insert(v);
        }
        set
    }

    pub fn domain(&self) -> &'static EnumDomain {
        self.domain
    }

    /// True if the value was newly inserted.  Panics on a cross-domain key,
    /// as [`EnumMap::insert`] does.
    pub fn insert(&mut self, value: EnumVal) -> bool {
        assert!(
            std::ptr::eq(value.domain, self.domain),
            "value domain {} does not match set domain {}",
            value.domain.name,
            self.domain.name
        );
        let mask = 1u128 << value.ordinal;
        let fresh = self.bits & mask == 0;
        self.bits |= mask;
        fresh
    }

    pub fn contains(&self, value: EnumVal) -> bool {
        std::ptr::eq(value.domain, self.domain) && self.bits & (1u128 << value.ordinal) != 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = EnumVal> + '_ {
        let domain = self.domain;
        (0..domain.constants.len() as u32)
            .filter(move |o| self.bits & (1u128 << o) != 0)
            .map(move |ordinal| EnumVal { domain, ordinal })
    }
}

// ── Singleton containers ─────────────────────────────────────────────────────

/// Immutable one-element list.  No mutation API exists: insertion into a
/// decoded singleton is rejected by construction.
#[derive(Clone)]
pub struct SingletonList(Obj);

impl SingletonList {
    pub fn element(&self) -> &Obj {
        &self.0
    }

    pub fn len(&self) -> usize {
        1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Immutable one-element set.
#[derive(Debug, Clone)]
pub struct SingletonSet(Key);

impl SingletonSet {
    pub fn element(&self) -> &Key {
        &self.0
    }

    pub fn contains(&self, key: &Key) -> bool {
        &self.0 == key
    }

    pub fn len(&self) -> usize {
        1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Immutable one-entry map.
#[derive(Clone)]
pub struct SingletonMap {
    key: Key,
    value: Obj,
}

impl SingletonMap {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> &Obj {
        &self.value
    }

    pub fn get(&self, key: &Key) -> Option<&Obj> {
        (&self.key == key).then_some(&self.value)
    }

    pub fn len(&self) -> usize {
        1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

// ── Wrapper-construction factories ───────────────────────────────────────────
//
// One factory per wrapper shape.  The variant codecs build their tag tables
// from samples produced by these factories and reconstruct decoded values
// through them, so factory and codec can never disagree about a variant's
// concrete type.

pub fn frozen_list(v: Vec<Obj>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn frozen_set(v: HashSet<Key>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn frozen_sorted_set(v: BTreeSet<Key>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn frozen_map(v: HashMap<Key, Obj>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn frozen_sorted_map(v: BTreeMap<Key, Obj>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn frozen_ordered_map(v: IndexMap<Key, Obj>) -> Obj {
    Arc::new(Arc::new(v))
}

pub fn synced_list(v: Vec<Obj>) -> Obj {
    Arc::new(Mutex::new(v))
}

pub fn synced_set(v: HashSet<Key>) -> Obj {
    Arc::new(Mutex::new(v))
}

pub fn synced_sorted_set(v: BTreeSet<Key>) -> Obj {
    Arc::new(Mutex::new(v))
}

pub fn synced_map(v: HashMap<Key, Obj>) -> Obj {
    Arc::new(Mutex::new(v))
}

pub fn synced_sorted_map(v: BTreeMap<Key, Obj>) -> Obj {
    Arc::new(Mutex::new(v))
}

pub fn singleton_list(element: Obj) -> Obj {
    Arc::new(SingletonList(element))
}

pub fn singleton_set(element: Key) -> Obj {
    Arc::new(SingletonSet(element))
}

pub fn singleton_map(key: Key, value: Obj) -> Obj {
    Arc::new(SingletonMap { key, value })
}

pub fn enum_map(m: EnumMap) -> Obj {
    Arc::new(m)
}

pub fn enum_set(s: EnumSet) -> Obj {
    Arc::new(s)
}

/// Fixed-size view over object elements.
pub fn array_view(v: Vec<Obj>) -> Obj {
    Arc::new(v.into_boxed_slice())
}

/// Fixed-size primitive-backed views.  These decode back into the same
/// primitive representation, never into object-boxed elements.
pub fn i64_view(v: Vec<i64>) -> Obj {
    Arc::new(v.into_boxed_slice())
}

pub fn f64_view(v: Vec<f64>) -> Obj {
    Arc::new(v.into_boxed_slice())
}

pub fn u8_view(v: Vec<u8>) -> Obj {
    Arc::new(v.into_boxed_slice())
}
