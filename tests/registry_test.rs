use std::any::TypeId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use varcodec::wrap::{self, Key};
use varcodec::{
    describe_defaults, install_defaults, Codec, CodecError, Engine, Obj, Registry,
    SerializationManager, Sink, Source,
};

// ── Installer ────────────────────────────────────────────────────────────────

#[test]
fn test_describe_defaults_lists_expected_entries() {
    let reg = describe_defaults().unwrap();

    // Scalars carry codecs; engine-native types are passthrough entries.
    let uuid = reg.resolve(TypeId::of::<Uuid>()).unwrap();
    assert!(uuid.codec.is_some());
    let string = reg.resolve(TypeId::of::<String>()).unwrap();
    assert!(string.codec.is_none());

    // Every variant family member resolves to a codec.
    assert!(reg.resolve(TypeId::of::<Arc<Vec<Obj>>>()).unwrap().codec.is_some());
    assert!(reg.resolve(TypeId::of::<Mutex<HashMap<Key, Obj>>>()).unwrap().codec.is_some());
    assert!(reg.resolve(TypeId::of::<wrap::SingletonMap>()).unwrap().codec.is_some());
    assert!(reg.resolve(TypeId::of::<wrap::EnumMap>()).unwrap().codec.is_some());
    assert!(reg.resolve(TypeId::of::<Box<[i64]>>()).unwrap().codec.is_some());
}

#[test]
fn test_describe_defaults_is_isolated_and_deterministic() {
    let a = describe_defaults().unwrap();
    let b = describe_defaults().unwrap();
    assert_eq!(a.len(), b.len());
    for (ea, eb) in a.iter().zip(b.iter()) {
        assert_eq!(ea.type_id, eb.type_id);
        assert_eq!(ea.id, eb.id);
    }
}

#[test]
fn test_install_defaults_is_idempotent() {
    let mut e = Engine::new();
    install_defaults(&mut e).unwrap();
    let len = e.registry().len();
    let ids: Vec<u32> = e.registry().iter().map(|r| r.id).collect();

    install_defaults(&mut e).unwrap();
    assert_eq!(e.registry().len(), len);
    let ids_after: Vec<u32> = e.registry().iter().map(|r| r.id).collect();
    assert_eq!(ids, ids_after);

    // Entries still resolve and the engine still works.
    let out = e.decode(&e.encode(&wrap::obj(Uuid::nil())).unwrap()).unwrap();
    assert_eq!(*out.downcast_ref::<Uuid>().unwrap(), Uuid::nil());
}

#[test]
fn test_installed_ids_match_described_ids() {
    let mut e = Engine::new();
    install_defaults(&mut e).unwrap();
    let described = describe_defaults().unwrap();
    for entry in described.iter() {
        let live = e.registry().resolve(entry.type_id).unwrap();
        assert_eq!(live.id, entry.id);
    }
}

// ── Registration rules ───────────────────────────────────────────────────────

#[test]
fn test_explicit_id_collision_across_types_is_fatal() {
    let mut reg = Registry::new();
    reg.register_with_id::<String>(500).unwrap();
    let err = reg.register_with_id::<bool>(500).unwrap_err();
    assert!(matches!(err, CodecError::IdConflict { id: 500, .. }));
}

#[test]
fn test_reregistering_same_type_keeps_id_and_position() {
    let mut reg = Registry::new();
    reg.register::<String>().unwrap();
    let id = reg.register::<bool>().unwrap();
    reg.register::<i64>().unwrap();

    // Overwrite bool's entry with a codec; id and order are untouched.
    let again = reg
        .register_codec::<bool>(Arc::new(varcodec::scalar::UuidCodec))
        .unwrap();
    assert_eq!(again, id);
    assert_eq!(reg.len(), 3);
    let entry = reg.resolve(TypeId::of::<bool>()).unwrap();
    assert!(entry.codec.is_some());
}

#[test]
fn test_implicit_ids_skip_explicitly_claimed_ones() {
    let mut reg = Registry::new();
    reg.register_with_id::<String>(1).unwrap();
    assert_eq!(reg.register::<bool>().unwrap(), 0);
    assert_eq!(reg.register::<i64>().unwrap(), 2);
}

#[test]
fn test_same_id_same_type_overwrites() {
    let mut reg = Registry::new();
    reg.register_with_id::<String>(9).unwrap();
    let id = reg.register_with_id::<String>(9).unwrap();
    assert_eq!(id, 9);
    assert_eq!(reg.len(), 1);
}

// ── Management facade ────────────────────────────────────────────────────────

/// Minimal single-engine pool proving the facade is implementable and
/// object-safe.  A real implementation fronts several engines.
struct SoloPool {
    engine: Mutex<Engine>,
}

impl SoloPool {
    fn new() -> Self {
        let mut engine = Engine::new();
        install_defaults(&mut engine).unwrap();
        Self { engine: Mutex::new(engine) }
    }
}

impl SerializationManager for SoloPool {
    fn register(&self, ty: TypeId, type_name: &'static str) -> Result<u32, CodecError> {
        self.engine.lock().unwrap().registry_mut().register_raw(ty, type_name, None)
    }

    fn register_with_id(
        &self,
        ty: TypeId,
        type_name: &'static str,
        id: u32,
    ) -> Result<u32, CodecError> {
        self.engine
            .lock()
            .unwrap()
            .registry_mut()
            .register_raw_with_id(ty, type_name, None, id)
    }

    fn register_with_codec(
        &self,
        ty: TypeId,
        type_name: &'static str,
        codec: Arc<dyn Codec>,
    ) -> Result<u32, CodecError> {
        self.engine
            .lock()
            .unwrap()
            .registry_mut()
            .register_raw(ty, type_name, Some(codec))
    }

    fn register_with_codec_and_id(
        &self,
        ty: TypeId,
        type_name: &'static str,
        codec: Arc<dyn Codec>,
        id: u32,
    ) -> Result<u32, CodecError> {
        self.engine
            .lock()
            .unwrap()
            .registry_mut()
            .register_raw_with_id(ty, type_name, Some(codec), id)
    }

    fn write(&self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let frame = self.engine.lock().unwrap().encode_framed(value)?;
        sink.write_bytes(&frame)
    }

    fn read(&self, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let len = source.read_var_u64()? as usize;
        let body = source.read_bytes(len)?;
        self.engine.lock().unwrap().decode(&body)
    }

    fn write_polymorphic(&self, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let bytes = self.engine.lock().unwrap().encode(value)?;
        sink.write_bytes(&bytes)
    }

    fn read_polymorphic(&self, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let rest = source.read_bytes(source.remaining())?;
        self.engine.lock().unwrap().decode(&rest)
    }
}

#[test]
fn test_facade_length_prefixed_write_read() {
    let pool: Box<dyn SerializationManager> = Box::new(SoloPool::new());

    let mut sink = Sink::new();
    pool.write(&mut sink, &wrap::obj(Ipv4Addr::new(10, 0, 0, 1))).unwrap();
    let bytes = sink.into_bytes();

    let mut source = Source::new(&bytes);
    let out = pool.read(&mut source).unwrap();
    assert_eq!(*out.downcast_ref::<Ipv4Addr>().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(source.remaining(), 0);
}

#[test]
fn test_facade_polymorphic_write_read() {
    let pool = SoloPool::new();

    let mut sink = Sink::new();
    pool.write_polymorphic(&mut sink, &wrap::obj("typed".to_string())).unwrap();
    let bytes = sink.into_bytes();

    let mut source = Source::new(&bytes);
    let out = pool.read_polymorphic(&mut source).unwrap();
    assert_eq!(out.downcast_ref::<String>().unwrap(), "typed");
}

#[test]
fn test_facade_id_conflict_propagates() {
    let pool = SoloPool::new();
    pool.register_with_id(TypeId::of::<u16>(), "u16", 900).unwrap();
    let err = pool.register_with_id(TypeId::of::<u32>(), "u32", 900).unwrap_err();
    assert!(matches!(err, CodecError::IdConflict { id: 900, .. }));
}
