//! Codecs for externally opaque immutable value types.
//!
//! Each codec reduces its type to the minimal canonical form and
//! reconstructs through the type's public factory — never by field copying,
//! and never through a validating parse the original value may not satisfy
//! (the wire form came from a valid instance and is taken as valid).
//!
//! The two address codecs never inspect the byte count to pick an address
//! family: which codec runs is decided by the engine's per-type dispatch,
//! and each reads exactly its own fixed width.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono_tz::Tz;
use regex::{Regex, RegexBuilder};
use url::Url;
use uuid::Uuid;

use crate::codec::{expect_obj, Codec, CodecError, Obj};
use crate::engine::{ReadCtx, WriteCtx};
use crate::wire::{Sink, Source};

// Regex flag bits.  The encoder writes 0 — Rust patterns carry their flags
// inline — but the decoder honors set bits for writers that externalize
// them.  Append-only.
const RX_CASE_INSENSITIVE: u64 = 1 << 0;
const RX_MULTI_LINE: u64 = 1 << 1;
const RX_DOT_MATCHES_NEW_LINE: u64 = 1 << 2;
const RX_IGNORE_WHITESPACE: u64 = 1 << 3;
const RX_SWAP_GREED: u64 = 1 << 4;

/// IPv4 address as its 4 raw octets.
pub struct Ipv4Codec;

impl Codec for Ipv4Codec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let addr = expect_obj::<Ipv4Addr>(value, "Ipv4Addr")?;
        sink.write_bytes(&addr.octets())
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let mut octets = [0u8; 4];
        source.read_exact(&mut octets)?;
        Ok(Arc::new(Ipv4Addr::from(octets)))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// IPv6 address as its 16 raw octets.
pub struct Ipv6Codec;

impl Codec for Ipv6Codec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let addr = expect_obj::<Ipv6Addr>(value, "Ipv6Addr")?;
        sink.write_bytes(&addr.octets())
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let mut octets = [0u8; 16];
        source.read_exact(&mut octets)?;
        Ok(Arc::new(Ipv6Addr::from(octets)))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// Filesystem path as its string form.  Non-UTF-8 paths are encoded lossily.
pub struct PathCodec;

impl Codec for PathCodec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let path = expect_obj::<PathBuf>(value, "PathBuf")?;
        sink.write_str(&path.to_string_lossy())
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        Ok(Arc::new(PathBuf::from(source.read_str()?)))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// URL as its serialized string form.
pub struct UrlCodec;

impl Codec for UrlCodec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let url = expect_obj::<Url>(value, "Url")?;
        sink.write_str(url.as_str())
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let s = source.read_str()?;
        let url = Url::parse(&s)
            .map_err(|e| CodecError::MalformedPayload(format!("invalid url {s:?}: {e}")))?;
        Ok(Arc::new(url))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// Compiled regex as its source text plus a flags bitset.
pub struct RegexCodec;

impl Codec for RegexCodec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let rx = expect_obj::<Regex>(value, "Regex")?;
        sink.write_str(rx.as_str())?;
        sink.write_var_u64(0)
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let src = source.read_str()?;
        let flags = source.read_var_u64()?;
        let rx = RegexBuilder::new(&src)
            .case_insensitive(flags & RX_CASE_INSENSITIVE != 0)
            .multi_line(flags & RX_MULTI_LINE != 0)
            .dot_matches_new_line(flags & RX_DOT_MATCHES_NEW_LINE != 0)
            .ignore_whitespace(flags & RX_IGNORE_WHITESPACE != 0)
            .swap_greed(flags & RX_SWAP_GREED != 0)
            .build()
            .map_err(|e| CodecError::MalformedPayload(format!("invalid pattern {src:?}: {e}")))?;
        Ok(Arc::new(rx))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// UUID as its two 64-bit words, high word first.
pub struct UuidCodec;

impl Codec for UuidCodec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let uuid = expect_obj::<Uuid>(value, "Uuid")?;
        let (hi, lo) = uuid.as_u64_pair();
        sink.write_u64(hi)?;
        sink.write_u64(lo)
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let hi = source.read_u64()?;
        let lo = source.read_u64()?;
        Ok(Arc::new(Uuid::from_u64_pair(hi, lo)))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}

/// Time zone as its IANA identifier.
pub struct TzCodec;

impl Codec for TzCodec {
    fn encode(&self, _: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let tz = expect_obj::<Tz>(value, "Tz")?;
        sink.write_str(tz.name())
    }

    fn decode(&self, _: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let name = source.read_str()?;
        let tz = Tz::from_str(&name)
            .map_err(|e| CodecError::MalformedPayload(format!("unknown time zone {name:?}: {e}")))?;
        Ok(Arc::new(tz))
    }

    fn immutable_hint(&self) -> bool {
        true
    }
}
