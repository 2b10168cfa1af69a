//! Singleton container family.
//!
//! A singleton's size is implied by its tag, so the payload is the bare
//! element (list), key (set), or key/value pair (map) — no count prefix.

use std::sync::Arc;

use crate::codec::{expect_obj, obj_type_id, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::registry::Registry;
use crate::variants::TagTable;
use crate::wire::{Sink, Source};
use crate::wrap::{self, Key, SingletonList, SingletonMap, SingletonSet};

// Append only; never renumber.
const SINGLETON_LIST: u32 = 0;
const SINGLETON_SET: u32 = 1;
const SINGLETON_MAP: u32 = 2;

pub struct SingletonCodec {
    table: TagTable,
}

impl SingletonCodec {
    pub fn new() -> Self {
        let mut table = TagTable::new("singleton");
        table.observe(
            wrap::singleton_list(Arc::new(())),
            "singleton list",
            SINGLETON_LIST,
        );
        table.observe(
            wrap::singleton_set(Key::Int(0)),
            "singleton set",
            SINGLETON_SET,
        );
        table.observe(
            wrap::singleton_map(Key::Int(0), Arc::new(())),
            "singleton map",
            SINGLETON_MAP,
        );
        Self { table }
    }

    pub fn register_all(registry: &mut Registry) -> Result<(), CodecError> {
        let codec = Arc::new(Self::new());
        codec.table.register_all(registry, codec.clone())
    }
}

impl Default for SingletonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for SingletonCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tag = self
            .table
            .tag_for(obj_type_id(value))
            .ok_or_else(|| self.table.miss(value))?;
        sink.write_var_u32(tag)?;
        match tag {
            SINGLETON_LIST => {
                let v = expect_obj::<SingletonList>(value, "singleton list")?;
                ctx.write_obj(sink, v.element())
            }
            SINGLETON_SET => {
                let v = expect_obj::<SingletonSet>(value, "singleton set")?;
                v.element().write(sink)
            }
            SINGLETON_MAP => {
                let v = expect_obj::<SingletonMap>(value, "singleton map")?;
                v.key().write(sink)?;
                ctx.write_obj(sink, v.value())
            }
            _ => unreachable!("tag table yields only known tags"),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        match source.read_var_u32()? {
            SINGLETON_LIST => Ok(wrap::singleton_list(ctx.read_obj(source)?)),
            SINGLETON_SET => Ok(wrap::singleton_set(Key::read(ctx, source)?)),
            SINGLETON_MAP => {
                let key = Key::read(ctx, source)?;
                let value = ctx.read_obj(source)?;
                Ok(wrap::singleton_map(key, value))
            }
            tag => Err(CodecError::MalformedPayload(format!(
                "singleton variant tag {tag} outside the closed set"
            ))),
        }
    }
}
