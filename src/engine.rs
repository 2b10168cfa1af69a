//! Reference engine — the boundary host the codecs plug into.
//!
//! # Object frame
//! Every object on the wire begins with a varint marker `k`.  `k = 0`
//! introduces an inline object: in polymorphic mode a varint registration id
//! follows, then the payload; in typed mode the payload follows directly and
//! the reader supplies the declared type.  `k >= 1` is a back-reference to
//! the `k - 1`th object decoded in this call.  Nested objects are always
//! polymorphic — only the top level has a typed form.
//!
//! # Reference tracking
//! With references enabled (the default), the per-call [`WriteCtx`] keys
//! every object it has written on `Arc` pointer identity and emits
//! back-references for repeats, so shared instances stay shared and cyclic
//! graphs terminate.  The [`ReadCtx`] mirrors this with an index table; a
//! decoder that must expose a partially built value to its children — the
//! cycle case — registers it early through [`ReadCtx::provide`].
//!
//! # Concurrency
//! The engine is immutable after setup.  Each encode/decode call owns its
//! context and buffer, so any number of calls may run concurrently against
//! one engine without locking.  Registration (`registry_mut`,
//! `register_domain`) must complete before concurrent traffic begins.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use fixedbitset::FixedBitSet;
use indexmap::{IndexMap, IndexSet};
use log::trace;

use crate::codec::{obj_type_id, CodecError, Obj};
use crate::registry::{Registration, Registry};
use crate::wire::{Sink, Source};
use crate::wrap::{EnumDomain, EnumVal, Key};

pub struct Engine {
    registry: Registry,
    domains: HashMap<&'static str, &'static EnumDomain>,
    references: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            domains: HashMap::new(),
            references: true,
        }
    }

    /// Toggle reference tracking.  Must be set before any traffic; both
    /// sides of a connection must agree.
    pub fn set_references(&mut self, enabled: bool) {
        self.references = enabled;
    }

    pub fn references(&self) -> bool {
        self.references
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Make an enum domain resolvable by name at decode time.  The analog
    /// of registering a class with the engine.
    pub fn register_domain(&mut self, domain: &'static EnumDomain) {
        self.domains.insert(domain.name, domain);
    }

    // ── Polymorphic encode/decode ────────────────────────────────────────────

    /// Encode one object, persisting its runtime type so the reader needs no
    /// prior knowledge of it.
    pub fn encode(&self, value: &Obj) -> Result<Vec<u8>, CodecError> {
        trace!("encode: polymorphic");
        let mut sink = Sink::new();
        let mut ctx = WriteCtx::new(self);
        ctx.write_obj(&mut sink, value)?;
        Ok(sink.into_bytes())
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Obj, CodecError> {
        trace!("decode: polymorphic, {} bytes", bytes.len());
        let mut source = Source::new(bytes);
        let mut ctx = ReadCtx::new(self);
        ctx.read_obj(&mut source)
    }

    // ── Typed encode/decode ──────────────────────────────────────────────────

    /// Encode one object without a top-level type id; the reader must name
    /// the declared type.  Nested objects are still polymorphic.
    pub fn encode_typed(&self, value: &Obj) -> Result<Vec<u8>, CodecError> {
        let mut sink = Sink::new();
        let mut ctx = WriteCtx::new(self);
        ctx.write_obj_typed(&mut sink, value)?;
        Ok(sink.into_bytes())
    }

    pub fn decode_typed(&self, bytes: &[u8], declared: TypeId) -> Result<Obj, CodecError> {
        let mut source = Source::new(bytes);
        let mut ctx = ReadCtx::new(self);
        ctx.read_obj_typed(&mut source, declared)
    }

    // ── Length-prefixed framing ──────────────────────────────────────────────

    /// Polymorphic encode behind a varint length prefix.
    pub fn encode_framed(&self, value: &Obj) -> Result<Vec<u8>, CodecError> {
        let body = self.encode(value)?;
        let mut sink = Sink::with_capacity(body.len() + 4);
        sink.write_var_u64(body.len() as u64)?;
        sink.write_bytes(&body)?;
        Ok(sink.into_bytes())
    }

    /// Decode one length-prefixed frame.  A frame whose body does not
    /// consume exactly its declared length is malformed.
    pub fn decode_framed(&self, bytes: &[u8]) -> Result<Obj, CodecError> {
        let mut source = Source::new(bytes);
        let len = source.read_var_u64()? as usize;
        if len > source.remaining() {
            return Err(CodecError::MalformedPayload(format!(
                "frame length {len} exceeds {} remaining",
                source.remaining()
            )));
        }
        let start = source.position();
        let mut ctx = ReadCtx::new(self);
        let obj = ctx.read_obj(&mut source)?;
        let consumed = source.position() - start;
        if consumed != len {
            return Err(CodecError::MalformedPayload(format!(
                "frame declared {len} bytes but decoding consumed {consumed}"
            )));
        }
        Ok(obj)
    }
}

// ── Write context ────────────────────────────────────────────────────────────

/// Per-call encode state: the engine handle plus the reference table.
/// Created fresh for every top-level encode; never shared.
pub struct WriteCtx<'a> {
    engine: &'a Engine,
    refs: HashMap<usize, u32>,
    count: u32,
}

impl<'a> WriteCtx<'a> {
    fn new(engine: &'a Engine) -> Self {
        Self { engine, refs: HashMap::new(), count: 0 }
    }

    /// Write one object polymorphically (marker, registration id, payload).
    /// Codecs call this for every child value.
    pub fn write_obj(&mut self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let key = ptr_key(value);
        if self.engine.references {
            if let Some(&idx) = self.refs.get(&key) {
                return sink.write_var_u32(idx + 1);
            }
        }
        sink.write_var_u32(0)?;
        let entry = self.resolve_entry(value)?;
        sink.write_var_u32(entry.id)?;
        self.note_written(key);
        self.write_payload(sink, value, &entry)
    }

    pub(crate) fn write_obj_typed(&mut self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let key = ptr_key(value);
        if self.engine.references {
            if let Some(&idx) = self.refs.get(&key) {
                return sink.write_var_u32(idx + 1);
            }
        }
        sink.write_var_u32(0)?;
        let entry = self.resolve_entry(value)?;
        self.note_written(key);
        self.write_payload(sink, value, &entry)
    }

    fn resolve_entry(&self, value: &Obj) -> Result<Registration, CodecError> {
        self.engine
            .registry
            .resolve(obj_type_id(value))
            .cloned()
            .ok_or_else(|| CodecError::Unregistered(format!("{:?}", obj_type_id(value))))
    }

    // Objects enter the table before their children are written, so a child
    // holding a handle back to its parent resolves to a back-reference
    // instead of recursing forever.
    fn note_written(&mut self, key: usize) {
        if self.engine.references {
            self.refs.insert(key, self.count);
            self.count += 1;
        }
    }

    fn write_payload(
        &mut self,
        sink: &mut Sink,
        value: &Obj,
        entry: &Registration,
    ) -> Result<(), CodecError> {
        match &entry.codec {
            Some(codec) => codec.encode(self, sink, value),
            None => builtin_encode(self, sink, value, entry.type_name),
        }
    }
}

// ── Read context ─────────────────────────────────────────────────────────────

/// Per-call decode state: the engine handle, the index table, and the stack
/// of objects currently being decoded.
pub struct ReadCtx<'a> {
    engine: &'a Engine,
    table: Vec<Option<Obj>>,
    pending: Vec<usize>,
}

impl<'a> ReadCtx<'a> {
    fn new(engine: &'a Engine) -> Self {
        Self { engine, table: Vec::new(), pending: Vec::new() }
    }

    /// Read one polymorphically framed object.
    pub fn read_obj(&mut self, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let marker = source.read_var_u32()?;
        if marker >= 1 {
            return self.back_reference(marker - 1);
        }
        let id = source.read_var_u32()?;
        let entry = self
            .engine
            .registry
            .resolve_id(id)
            .cloned()
            .ok_or_else(|| {
                CodecError::MalformedPayload(format!("unknown registration id {id}"))
            })?;
        self.read_payload(source, &entry)
    }

    pub(crate) fn read_obj_typed(
        &mut self,
        source: &mut Source<'_>,
        declared: TypeId,
    ) -> Result<Obj, CodecError> {
        let marker = source.read_var_u32()?;
        if marker >= 1 {
            return self.back_reference(marker - 1);
        }
        let entry = self
            .engine
            .registry
            .resolve(declared)
            .cloned()
            .ok_or_else(|| CodecError::Unregistered(format!("{declared:?}")))?;
        self.read_payload(source, &entry)
    }

    /// Register a partially built value under the in-flight decode slot so
    /// children can back-reference it.  Cycle-capable decoders call this
    /// immediately after allocating their shell and before reading children;
    /// everyone else ignores it and the engine fills the slot on return.
    pub fn provide(&mut self, obj: Obj) {
        if let Some(&idx) = self.pending.last() {
            if self.table[idx].is_none() {
                self.table[idx] = Some(obj);
            }
        }
    }

    /// Resolve an enum domain the wire named.  Domains are registered on the
    /// engine by the host; an unknown name is a decode failure.
    pub fn resolve_domain(&self, name: &str) -> Result<&'static EnumDomain, CodecError> {
        self.engine
            .domains
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::UnknownDomain(name.to_owned()))
    }

    fn back_reference(&self, idx: u32) -> Result<Obj, CodecError> {
        self.table
            .get(idx as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| {
                CodecError::MalformedPayload(format!("dangling back-reference {idx}"))
            })
    }

    fn read_payload(
        &mut self,
        source: &mut Source<'_>,
        entry: &Registration,
    ) -> Result<Obj, CodecError> {
        if !self.engine.references {
            return match &entry.codec {
                Some(codec) => codec.decode(self, source),
                None => builtin_decode(self, source, entry.type_id, entry.type_name),
            };
        }
        let idx = self.table.len();
        self.table.push(None);
        self.pending.push(idx);
        let result = match &entry.codec {
            Some(codec) => codec.decode(self, source),
            None => builtin_decode(self, source, entry.type_id, entry.type_name),
        };
        self.pending.pop();
        let obj = result?;
        if self.table[idx].is_none() {
            self.table[idx] = Some(obj.clone());
        }
        Ok(obj)
    }
}

#[inline]
fn ptr_key(value: &Obj) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

// ── Engine-native handling for passthrough registrations ─────────────────────
//
// Passthrough entries (codec = None) cover types the engine serializes
// natively: primitives, strings, raw arrays, plain collections, enum
// constants, and a handful of opaque value types whose canonical form is
// their display string.

fn builtin_encode(
    ctx: &mut WriteCtx<'_>,
    sink: &mut Sink,
    value: &Obj,
    type_name: &'static str,
) -> Result<(), CodecError> {
    if let Some(s) = value.downcast_ref::<String>() {
        return sink.write_str(s);
    }
    if let Some(b) = value.downcast_ref::<bool>() {
        return sink.write_u8(u8::from(*b));
    }
    if let Some(i) = value.downcast_ref::<i64>() {
        return sink.write_var_i64(*i);
    }
    if let Some(f) = value.downcast_ref::<f64>() {
        return sink.write_f64(*f);
    }
    if let Some(v) = value.downcast_ref::<Vec<u8>>() {
        sink.write_var_u64(v.len() as u64)?;
        return sink.write_bytes(v);
    }
    if let Some(v) = value.downcast_ref::<Vec<i64>>() {
        sink.write_var_u64(v.len() as u64)?;
        for x in v {
            sink.write_i64(*x)?;
        }
        return Ok(());
    }
    if let Some(v) = value.downcast_ref::<Vec<f64>>() {
        sink.write_var_u64(v.len() as u64)?;
        for x in v {
            sink.write_f64(*x)?;
        }
        return Ok(());
    }
    if let Some(v) = value.downcast_ref::<Vec<String>>() {
        sink.write_var_u64(v.len() as u64)?;
        for s in v {
            sink.write_str(s)?;
        }
        return Ok(());
    }
    if let Some(v) = value.downcast_ref::<Vec<Obj>>() {
        sink.write_var_u64(v.len() as u64)?;
        for child in v {
            ctx.write_obj(sink, child)?;
        }
        return Ok(());
    }
    if let Some(m) = value.downcast_ref::<HashMap<Key, Obj>>() {
        sink.write_var_u64(m.len() as u64)?;
        for (k, v) in m {
            k.write(sink)?;
            ctx.write_obj(sink, v)?;
        }
        return Ok(());
    }
    if let Some(s) = value.downcast_ref::<HashSet<Key>>() {
        sink.write_var_u64(s.len() as u64)?;
        for k in s {
            k.write(sink)?;
        }
        return Ok(());
    }
    if let Some(m) = value.downcast_ref::<IndexMap<Key, Obj>>() {
        sink.write_var_u64(m.len() as u64)?;
        for (k, v) in m {
            k.write(sink)?;
            ctx.write_obj(sink, v)?;
        }
        return Ok(());
    }
    if let Some(s) = value.downcast_ref::<IndexSet<Key>>() {
        sink.write_var_u64(s.len() as u64)?;
        for k in s {
            k.write(sink)?;
        }
        return Ok(());
    }
    if let Some(e) = value.downcast_ref::<EnumVal>() {
        return e.write(sink);
    }
    if let Some(e) = value.downcast_ref::<io::Error>() {
        // Kind is not preserved; no stable numeric mapping exists.
        return sink.write_str(&e.to_string());
    }
    if let Some(d) = value.downcast_ref::<BigDecimal>() {
        return sink.write_str(&d.to_string());
    }
    if let Some(b) = value.downcast_ref::<FixedBitSet>() {
        sink.write_var_u64(b.len() as u64)?;
        sink.write_var_u64(b.count_ones(..) as u64)?;
        for bit in b.ones() {
            sink.write_var_u64(bit as u64)?;
        }
        return Ok(());
    }
    Err(CodecError::Unregistered(format!(
        "{type_name}: passthrough type has no engine-native encoding"
    )))
}

fn builtin_decode(
    ctx: &mut ReadCtx<'_>,
    source: &mut Source<'_>,
    type_id: TypeId,
    type_name: &'static str,
) -> Result<Obj, CodecError> {
    if type_id == TypeId::of::<String>() {
        return Ok(Arc::new(source.read_str()?));
    }
    if type_id == TypeId::of::<bool>() {
        return Ok(Arc::new(source.read_u8()? != 0));
    }
    if type_id == TypeId::of::<i64>() {
        return Ok(Arc::new(source.read_var_i64()?));
    }
    if type_id == TypeId::of::<f64>() {
        return Ok(Arc::new(source.read_f64()?));
    }
    if type_id == TypeId::of::<Vec<u8>>() {
        let len = source.read_var_u64()? as usize;
        return Ok(Arc::new(source.read_bytes(len)?));
    }
    if type_id == TypeId::of::<Vec<i64>>() {
        let len = source.read_var_u64()? as usize;
        let mut out = Vec::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.push(source.read_i64()?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<Vec<f64>>() {
        let len = source.read_var_u64()? as usize;
        let mut out = Vec::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.push(source.read_f64()?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<Vec<String>>() {
        let len = source.read_var_u64()? as usize;
        let mut out = Vec::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.push(source.read_str()?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<Vec<Obj>>() {
        let len = source.read_var_u64()? as usize;
        let mut out: Vec<Obj> = Vec::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.push(ctx.read_obj(source)?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<HashMap<Key, Obj>>() {
        let len = source.read_var_u64()? as usize;
        let mut out: HashMap<Key, Obj> = HashMap::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            let k = Key::read(ctx, source)?;
            let v = ctx.read_obj(source)?;
            out.insert(k, v);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<HashSet<Key>>() {
        let len = source.read_var_u64()? as usize;
        let mut out: HashSet<Key> = HashSet::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.insert(Key::read(ctx, source)?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<IndexMap<Key, Obj>>() {
        let len = source.read_var_u64()? as usize;
        let mut out: IndexMap<Key, Obj> = IndexMap::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            let k = Key::read(ctx, source)?;
            let v = ctx.read_obj(source)?;
            out.insert(k, v);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<IndexSet<Key>>() {
        let len = source.read_var_u64()? as usize;
        let mut out: IndexSet<Key> = IndexSet::with_capacity(len.min(source.remaining()));
        for _ in 0..len {
            out.insert(Key::read(ctx, source)?);
        }
        return Ok(Arc::new(out));
    }
    if type_id == TypeId::of::<EnumVal>() {
        return Ok(Arc::new(EnumVal::read(ctx, source)?));
    }
    if type_id == TypeId::of::<io::Error>() {
        let msg = source.read_str()?;
        return Ok(Arc::new(io::Error::new(io::ErrorKind::Other, msg)));
    }
    if type_id == TypeId::of::<BigDecimal>() {
        let s = source.read_str()?;
        let d = BigDecimal::from_str(&s)
            .map_err(|e| CodecError::MalformedPayload(format!("invalid decimal: {e}")))?;
        return Ok(Arc::new(d));
    }
    if type_id == TypeId::of::<FixedBitSet>() {
        let nbits = source.read_var_u64()? as usize;
        let count = source.read_var_u64()? as usize;
        let mut bits = FixedBitSet::with_capacity(nbits);
        for _ in 0..count {
            let bit = source.read_var_u64()? as usize;
            if bit >= nbits {
                return Err(CodecError::MalformedPayload(format!(
                    "bit {bit} out of range for bitset of {nbits}"
                )));
            }
            bits.insert(bit);
        }
        return Ok(Arc::new(bits));
    }
    Err(CodecError::Unregistered(format!(
        "{type_name}: passthrough type has no engine-native decoding"
    )))
}
