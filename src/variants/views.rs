//! Fixed-size array view family (`Box<[T]>`).
//!
//! Views over primitive numeric arrays carry their elements as raw
//! little-endian runs and decode back into the same primitive-backed slice
//! type — never into an object-boxed sequence.  The element representation
//! is part of the variant's identity.

use std::sync::Arc;

use crate::codec::{expect_obj, obj_type_id, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::registry::Registry;
use crate::variants::{read_objs, write_objs, TagTable};
use crate::wire::{Sink, Source};
use crate::wrap;

// Append only; never renumber.
const VIEW_OBJ: u32 = 0;
const VIEW_I64: u32 = 1;
const VIEW_F64: u32 = 2;
const VIEW_U8: u32 = 3;

pub struct ViewCodec {
    table: TagTable,
}

impl ViewCodec {
    pub fn new() -> Self {
        let mut table = TagTable::new("view");
        table.observe(wrap::array_view(Vec::new()), "array view", VIEW_OBJ);
        table.observe(wrap::i64_view(Vec::new()), "i64 view", VIEW_I64);
        table.observe(wrap::f64_view(Vec::new()), "f64 view", VIEW_F64);
        table.observe(wrap::u8_view(Vec::new()), "u8 view", VIEW_U8);
        Self { table }
    }

    pub fn register_all(registry: &mut Registry) -> Result<(), CodecError> {
        let codec = Arc::new(Self::new());
        codec.table.register_all(registry, codec.clone())
    }
}

impl Default for ViewCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ViewCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tag = self
            .table
            .tag_for(obj_type_id(value))
            .ok_or_else(|| self.table.miss(value))?;
        sink.write_var_u32(tag)?;
        match tag {
            VIEW_OBJ => {
                let v = expect_obj::<Box<[Obj]>>(value, "array view")?;
                write_objs(ctx, sink, &v)
            }
            VIEW_I64 => {
                let v = expect_obj::<Box<[i64]>>(value, "i64 view")?;
                sink.write_var_u64(v.len() as u64)?;
                for x in v.iter() {
                    sink.write_i64(*x)?;
                }
                Ok(())
            }
            VIEW_F64 => {
                let v = expect_obj::<Box<[f64]>>(value, "f64 view")?;
                sink.write_var_u64(v.len() as u64)?;
                for x in v.iter() {
                    sink.write_f64(*x)?;
                }
                Ok(())
            }
            VIEW_U8 => {
                let v = expect_obj::<Box<[u8]>>(value, "u8 view")?;
                sink.write_var_u64(v.len() as u64)?;
                sink.write_bytes(&v)
            }
            _ => unreachable!("tag table yields only known tags"),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        match source.read_var_u32()? {
            VIEW_OBJ => Ok(wrap::array_view(read_objs(ctx, source)?)),
            VIEW_I64 => {
                let len = source.read_var_u64()? as usize;
                let mut out = Vec::with_capacity(len.min(source.remaining()));
                for _ in 0..len {
                    out.push(source.read_i64()?);
                }
                Ok(wrap::i64_view(out))
            }
            VIEW_F64 => {
                let len = source.read_var_u64()? as usize;
                let mut out = Vec::with_capacity(len.min(source.remaining()));
                for _ in 0..len {
                    out.push(source.read_f64()?);
                }
                Ok(wrap::f64_view(out))
            }
            VIEW_U8 => {
                let len = source.read_var_u64()? as usize;
                Ok(wrap::u8_view(source.read_bytes(len)?))
            }
            tag => Err(CodecError::MalformedPayload(format!(
                "view variant tag {tag} outside the closed set"
            ))),
        }
    }
}
