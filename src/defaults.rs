//! Default registration set.
//!
//! [`install_defaults`] populates an engine's table with every codec this
//! crate ships plus passthrough entries for the types the engine handles
//! natively.  Installation order is fixed: implicit ids are assigned in
//! order, and ids are wire identity, so both sides of a connection must
//! install the same defaults.  Re-installing on the same engine overwrites
//! codecs in place without disturbing ids — the operation is idempotent.
//!
//! [`describe_defaults`] builds the identical table in isolation, for
//! introspection and tests, without touching any live engine.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono_tz::Tz;
use fixedbitset::FixedBitSet;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use regex::Regex;
use url::Url;
use uuid::Uuid;

use crate::codec::{CodecError, Obj};
use crate::engine::Engine;
use crate::registry::Registry;
use crate::scalar::{Ipv4Codec, Ipv6Codec, PathCodec, RegexCodec, TzCodec, UrlCodec, UuidCodec};
use crate::variants::{EnumKeyedCodec, FrozenCodec, SingletonCodec, SyncedCodec, ViewCodec};
use crate::wrap::{EnumVal, Key};

/// Install the default registrations into a live engine.
///
/// Must run during the single-writer setup phase, before concurrent
/// encode/decode traffic begins.
pub fn install_defaults(engine: &mut Engine) -> Result<(), CodecError> {
    install_into(engine.registry_mut())
}

/// Build an isolated registry holding exactly what [`install_defaults`]
/// would install.  Never touches a live engine.
pub fn describe_defaults() -> Result<Registry, CodecError> {
    let mut registry = Registry::new();
    install_into(&mut registry)?;
    Ok(registry)
}

fn install_into(registry: &mut Registry) -> Result<(), CodecError> {
    // Engine-native passthroughs: primitives, strings, raw arrays, plain
    // collections, enum constants, and string-canonical value types.
    registry.register::<String>()?;
    registry.register::<bool>()?;
    registry.register::<i64>()?;
    registry.register::<f64>()?;
    registry.register::<Vec<u8>>()?;
    registry.register::<Vec<i64>>()?;
    registry.register::<Vec<f64>>()?;
    registry.register::<Vec<String>>()?;
    registry.register::<Vec<Obj>>()?;
    registry.register::<HashMap<Key, Obj>>()?;
    registry.register::<HashSet<Key>>()?;
    registry.register::<IndexMap<Key, Obj>>()?;
    registry.register::<IndexSet<Key>>()?;
    registry.register::<EnumVal>()?;
    registry.register::<io::Error>()?;
    registry.register::<BigDecimal>()?;
    registry.register::<FixedBitSet>()?;

    // Opaque immutable scalars.
    registry.register_codec::<Regex>(Arc::new(RegexCodec))?;
    registry.register_codec::<Url>(Arc::new(UrlCodec))?;
    registry.register_codec::<Uuid>(Arc::new(UuidCodec))?;
    registry.register_codec::<Ipv4Addr>(Arc::new(Ipv4Codec))?;
    registry.register_codec::<Ipv6Addr>(Arc::new(Ipv6Codec))?;
    registry.register_codec::<PathBuf>(Arc::new(PathCodec))?;
    registry.register_codec::<Tz>(Arc::new(TzCodec))?;

    // Variant families: one shared codec instance per family, registered
    // against every member type.
    EnumKeyedCodec::register_all(registry)?;
    ViewCodec::register_all(registry)?;
    SingletonCodec::register_all(registry)?;
    FrozenCodec::register_all(registry)?;
    SyncedCodec::register_all(registry)?;

    debug!(
        "varcodec {}: {} default registrations installed",
        env!("CARGO_PKG_VERSION"),
        registry.len()
    );
    Ok(())
}
