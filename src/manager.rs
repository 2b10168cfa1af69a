//! Management facade over a pool of engine instances.
//!
//! Interface only.  An implementation fronts concurrent callers sharing a
//! pool of engines; the pool's coordination is engine-internal and out of
//! scope here.  The trait is object-safe so a pool can live behind `dyn`.

use std::any::TypeId;
use std::sync::Arc;

use crate::codec::{Codec, CodecError, Obj};
use crate::wire::{Sink, Source};

pub trait SerializationManager: Send + Sync {
    /// Register the type using the lowest, next available integer id and the
    /// engine's native handling.  If the type is already registered, the
    /// existing entry is updated.
    ///
    /// Because the assigned id depends on the ids registered before it,
    /// registration order matters: it must be the same at deserialization as
    /// it was for serialization.
    fn register(&self, ty: TypeId, type_name: &'static str) -> Result<u32, CodecError>;

    /// Register the type using the specified id.  If the id is already in
    /// use by the same type, the old entry is overwritten.  If it is in use
    /// by a different type, the registration fails with
    /// [`CodecError::IdConflict`].
    ///
    /// Ids must be the same at deserialization as they were for
    /// serialization.  Smaller ids encode more compactly.
    fn register_with_id(
        &self,
        ty: TypeId,
        type_name: &'static str,
        id: u32,
    ) -> Result<u32, CodecError>;

    /// Register the type using the lowest, next available integer id and the
    /// specified codec.  Overwrites an existing entry for the same type.
    fn register_with_codec(
        &self,
        ty: TypeId,
        type_name: &'static str,
        codec: Arc<dyn Codec>,
    ) -> Result<u32, CodecError>;

    /// Register the type using the specified id and codec.  Same id rules as
    /// [`SerializationManager::register_with_id`].
    fn register_with_codec_and_id(
        &self,
        ty: TypeId,
        type_name: &'static str,
        codec: Arc<dyn Codec>,
        id: u32,
    ) -> Result<u32, CodecError>;

    /// Write one value behind a varint length prefix, using whichever pooled
    /// engine is available.
    fn write(&self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError>;

    /// Read one length-prefixed value.  The frame must consume exactly its
    /// declared length.
    fn read(&self, source: &mut Source<'_>) -> Result<Obj, CodecError>;

    /// Write one value together with its runtime type, so the reader can
    /// resolve the codec without prior knowledge of the value's type.
    fn write_polymorphic(&self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError>;

    /// Read one value whose runtime type is persisted in the stream.
    fn read_polymorphic(&self, source: &mut Source<'_>) -> Result<Obj, CodecError>;
}
