//! Enum-keyed container family.
//!
//! An enum-keyed container's backing storage is sized and typed by its key
//! domain and cannot be built generically, so the payload always begins
//! with the domain's name, *including for empty containers*.  The decoder
//! resolves the name against the engine's domain table and materializes an
//! empty container of the right domain before inserting entries.  Empty
//! containers therefore decode like any other.

use std::sync::Arc;

use crate::codec::{expect_obj, obj_type_id, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::registry::Registry;
use crate::variants::TagTable;
use crate::wire::{Sink, Source};
use crate::wrap::{self, EnumDomain, EnumMap, EnumSet};

// Append only; never renumber.
const ENUM_MAP: u32 = 0;
const ENUM_SET: u32 = 1;

// Sample domain used only for signature discovery at construction time.
static PROBE_DOMAIN: EnumDomain = EnumDomain { name: "varcodec.probe", constants: &["probe"] };

pub struct EnumKeyedCodec {
    table: TagTable,
}

impl EnumKeyedCodec {
    pub fn new() -> Self {
        let mut table = TagTable::new("enum-keyed");
        table.observe(wrap::enum_map(EnumMap::new(&PROBE_DOMAIN)), "enum map", ENUM_MAP);
        table.observe(wrap::enum_set(EnumSet::new(&PROBE_DOMAIN)), "enum set", ENUM_SET);
        Self { table }
    }

    pub fn register_all(registry: &mut Registry) -> Result<(), CodecError> {
        let codec = Arc::new(Self::new());
        codec.table.register_all(registry, codec.clone())
    }
}

impl Default for EnumKeyedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for EnumKeyedCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tag = self
            .table
            .tag_for(obj_type_id(value))
            .ok_or_else(|| self.table.miss(value))?;
        sink.write_var_u32(tag)?;
        match tag {
            ENUM_MAP => {
                let m = expect_obj::<EnumMap>(value, "enum map")?;
                sink.write_str(m.domain().name)?;
                sink.write_var_u64(m.len() as u64)?;
                for (key, val) in m.iter() {
                    sink.write_var_u32(key.ordinal)?;
                    ctx.write_obj(sink, val)?;
                }
                Ok(())
            }
            ENUM_SET => {
                let s = expect_obj::<EnumSet>(value, "enum set")?;
                sink.write_str(s.domain().name)?;
                sink.write_var_u64(s.len() as u64)?;
                for member in s.iter() {
                    sink.write_var_u32(member.ordinal)?;
                }
                Ok(())
            }
            _ => unreachable!("tag table yields only known tags"),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        match source.read_var_u32()? {
            ENUM_MAP => {
                let name = source.read_str()?;
                let domain = ctx.resolve_domain(&name)?;
                let len = source.read_var_u64()? as usize;
                let mut map = EnumMap::new(domain);
                for _ in 0..len {
                    let ordinal = source.read_var_u32()?;
                    let key = domain.value(ordinal).ok_or_else(|| {
                        CodecError::MalformedPayload(format!(
                            "ordinal {ordinal} out of range for enum domain {name}"
                        ))
                    })?;
                    let val = ctx.read_obj(source)?;
                    map.insert(key, val);
                }
                Ok(wrap::enum_map(map))
            }
            ENUM_SET => {
                let name = source.read_str()?;
                let domain = ctx.resolve_domain(&name)?;
                let len = source.read_var_u64()? as usize;
                let mut set = EnumSet::new(domain);
                for _ in 0..len {
                    let ordinal = source.read_var_u32()?;
                    let member = domain.value(ordinal).ok_or_else(|| {
                        CodecError::MalformedPayload(format!(
                            "ordinal {ordinal} out of range for enum domain {name}"
                        ))
                    })?;
                    set.insert(member);
                }
                Ok(wrap::enum_set(set))
            }
            tag => Err(CodecError::MalformedPayload(format!(
                "enum-keyed variant tag {tag} outside the closed set"
            ))),
        }
    }
}
