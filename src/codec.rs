//! The codec contract: stateless encode/decode pairs bound to runtime types.
//!
//! # Identity rules
//! A codec is bound to one concrete runtime type — or to one closed *family*
//! of runtime variants (see `variants`) — through the engine's registration
//! table, which is keyed on [`TypeId`].  A codec never writes a type
//! discriminator of its own: the engine's per-type dispatch already
//! determined the target type before the codec runs.  Variant families write
//! a family-internal tag, which identifies a wrapper shape, not a type.
//!
//! # Statelessness
//! Codecs carry no per-call and no per-engine state.  One `Arc<dyn Codec>`
//! may serve unboundedly many concurrent encode/decode operations without
//! locking; all mutable state lives in the per-call [`WriteCtx`]/[`ReadCtx`]
//! and the per-call sink/source buffers.
//!
//! # Failure policy
//! Errors are propagated synchronously and never retried.  Malformed input
//! is a data error ([`CodecError::MalformedPayload`]); an unanticipated
//! wrapper variant is a registry-completeness defect
//! ([`CodecError::UnsupportedVariant`]) and MUST NOT be downgraded to a
//! generic shape — reconstructing the wrong variant silently changes the
//! semantics of the decoded value.

use std::any::{Any, TypeId};
use std::io;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::{ReadCtx, WriteCtx};
use crate::wire::{Sink, Source};

/// Type-erased, shareable object handle.
///
/// Reference identity is `Arc` pointer identity: two handles to the same
/// object compare equal under [`Arc::ptr_eq`], and the engine's reference
/// table is keyed on it.
pub type Obj = Arc<dyn Any + Send + Sync>;

// ── Error taxonomy ───────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    /// Wire bytes do not match the expected shape: truncated stream,
    /// out-of-range tag, corrupt length prefix, invalid UTF-8.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Encode-time: a value's concrete runtime shape has no tag in its
    /// variant family.  A registry-completeness defect, not a data error.
    #[error("unsupported {family} variant: {detail}")]
    UnsupportedVariant { family: &'static str, detail: String },

    /// Registration-time: an explicit numeric id is already bound to a
    /// different runtime type.
    #[error("id {id} already bound to {bound}, cannot rebind to {requested}")]
    IdConflict {
        id: u32,
        bound: &'static str,
        requested: &'static str,
    },

    /// No registration entry exists for the value's runtime type.
    #[error("type {0} is not registered")]
    Unregistered(String),

    /// Decode-time: the wire names an enum domain this engine was never told
    /// about.
    #[error("unknown enum domain {0:?}")]
    UnknownDomain(String),

    /// A codec was handed a value of a type it is not bound to.  Logic
    /// error; cannot be produced by wire input.
    #[error("value does not match codec type (expected {0})")]
    TypeMismatch(&'static str),
}

// In-memory buffers cannot meaningfully fail mid-write; every io::Error this
// crate can see is a read shortfall, which is malformed input by definition.
impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::MalformedPayload(e.to_string())
    }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    /// Write the self-delimiting canonical form of `value`.
    ///
    /// Advances the sink only; either the full encoding is appended or the
    /// call fails and the caller discards the buffer.  Never writes a type
    /// discriminator.
    fn encode(
        &self,
        ctx: &mut WriteCtx<'_>,
        sink: &mut Sink,
        value: &Obj,
    ) -> Result<(), CodecError>;

    /// Read exactly the bytes the matching `encode` wrote and reconstruct an
    /// equivalent value through the type's public construction path.
    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError>;

    /// True if values of this type can never be mutated after construction.
    /// The engine need not track such values for mutation-aware reuse;
    /// reference-identity tracking is independent and always
    /// engine-controlled.
    fn immutable_hint(&self) -> bool {
        false
    }
}

/// TypeId of the concrete value behind an [`Obj`] handle.
#[inline]
pub fn obj_type_id(value: &Obj) -> TypeId {
    (**value).type_id()
}

/// Downcast helper used by every codec: resolves to the concrete type the
/// codec is bound to, or reports the binding violation.
pub fn expect_obj<T: Any + Send + Sync>(
    value: &Obj,
    expected: &'static str,
) -> Result<Arc<T>, CodecError> {
    value
        .clone()
        .downcast::<T>()
        .map_err(|_| CodecError::TypeMismatch(expected))
}
