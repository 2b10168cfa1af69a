use std::any::TypeId;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use uuid::Uuid;

use varcodec::variants::FrozenCodec;
use varcodec::wrap::{self, EnumDomain, EnumSet};
use varcodec::{install_defaults, Codec, CodecError, Engine, Obj, ReadCtx, Sink, Source, WriteCtx};

static SWITCH: EnumDomain = EnumDomain { name: "Switch", constants: &["Off", "On"] };

fn engine() -> Engine {
    let mut e = Engine::new();
    install_defaults(&mut e).unwrap();
    e.register_domain(&SWITCH);
    e
}

fn str_obj(s: &str) -> Obj {
    wrap::obj(s.to_string())
}

// ── Reference identity ───────────────────────────────────────────────────────

#[test]
fn test_shared_instance_stays_shared() {
    let e = engine();
    let shared = str_obj("once");
    let value = wrap::obj(vec![shared.clone(), shared.clone()]);

    let out = e.decode(&e.encode(&value).unwrap()).unwrap();
    let list = out.downcast_ref::<Vec<Obj>>().unwrap();
    assert!(Arc::ptr_eq(&list[0], &list[1]));
}

#[test]
fn test_equal_but_distinct_instances_stay_distinct() {
    let e = engine();
    let value = wrap::obj(vec![str_obj("twin"), str_obj("twin")]);

    let out = e.decode(&e.encode(&value).unwrap()).unwrap();
    let list = out.downcast_ref::<Vec<Obj>>().unwrap();
    assert_eq!(list[0].downcast_ref::<String>(), list[1].downcast_ref::<String>());
    assert!(!Arc::ptr_eq(&list[0], &list[1]));
}

#[test]
fn test_references_disabled_duplicates_shared_instances() {
    let mut e = Engine::new();
    install_defaults(&mut e).unwrap();
    e.set_references(false);

    let shared = str_obj("copied");
    let value = wrap::obj(vec![shared.clone(), shared.clone()]);
    let out = e.decode(&e.encode(&value).unwrap()).unwrap();
    let list = out.downcast_ref::<Vec<Obj>>().unwrap();
    assert!(!Arc::ptr_eq(&list[0], &list[1]));
}

// ── Cycles ───────────────────────────────────────────────────────────────────

struct Node {
    name: String,
    next: Mutex<Option<Obj>>,
}

struct NodeCodec;

impl Codec for NodeCodec {
    fn encode(&self, ctx: &mut WriteCtx<'_>, sink: &mut Sink, value: &Obj) -> Result<(), CodecError> {
        let node = value
            .downcast_ref::<Node>()
            .ok_or(CodecError::TypeMismatch("Node"))?;
        sink.write_str(&node.name)?;
        match node.next.lock().unwrap().as_ref() {
            Some(next) => {
                sink.write_u8(1)?;
                ctx.write_obj(sink, next)
            }
            None => sink.write_u8(0),
        }
    }

    fn decode(&self, ctx: &mut ReadCtx<'_>, source: &mut Source<'_>) -> Result<Obj, CodecError> {
        let name = source.read_str()?;
        let node = Arc::new(Node { name, next: Mutex::new(None) });
        // Expose the shell before reading children so a back-reference into
        // this node resolves.
        ctx.provide(node.clone());
        if source.read_u8()? == 1 {
            let next = ctx.read_obj(source)?;
            *node.next.lock().unwrap() = Some(next);
        }
        Ok(node)
    }
}

#[test]
fn test_mutually_referencing_nodes_survive() {
    let mut e = engine();
    e.registry_mut().register_codec::<Node>(Arc::new(NodeCodec)).unwrap();

    let a = Arc::new(Node { name: "a".into(), next: Mutex::new(None) });
    let b = Arc::new(Node { name: "b".into(), next: Mutex::new(None) });
    let a_handle: Obj = a.clone();
    let b_handle: Obj = b.clone();
    *a.next.lock().unwrap() = Some(b_handle);
    *b.next.lock().unwrap() = Some(a_handle);

    let a_obj: Obj = a;
    let out = e.decode(&e.encode(&a_obj).unwrap()).unwrap();

    let da = out.downcast_ref::<Node>().unwrap();
    assert_eq!(da.name, "a");
    let db_obj = da.next.lock().unwrap().clone().unwrap();
    let db = db_obj.downcast_ref::<Node>().unwrap();
    assert_eq!(db.name, "b");
    // The cycle closed: b's next is the decoded a itself.
    let back = db.next.lock().unwrap().clone().unwrap();
    assert!(Arc::ptr_eq(&back, &out));
}

#[test]
fn test_self_referencing_node_survives() {
    let mut e = engine();
    e.registry_mut().register_codec::<Node>(Arc::new(NodeCodec)).unwrap();

    let n = Arc::new(Node { name: "loop".into(), next: Mutex::new(None) });
    let n_handle: Obj = n.clone();
    *n.next.lock().unwrap() = Some(n_handle);

    let n_obj: Obj = n;
    let out = e.decode(&e.encode(&n_obj).unwrap()).unwrap();
    let dn = out.downcast_ref::<Node>().unwrap();
    let next = dn.next.lock().unwrap().clone().unwrap();
    assert!(Arc::ptr_eq(&next, &out));
}

// ── Framing ──────────────────────────────────────────────────────────────────

#[test]
fn test_framed_roundtrip() {
    let e = engine();
    let id = Uuid::new_v4();
    let frame = e.encode_framed(&wrap::obj(id)).unwrap();
    let out = e.decode_framed(&frame).unwrap();
    assert_eq!(*out.downcast_ref::<Uuid>().unwrap(), id);
}

#[test]
fn test_framed_rejects_truncated_body() {
    let e = engine();
    let frame = e.encode_framed(&wrap::obj(Uuid::new_v4())).unwrap();
    let err = e.decode_framed(&frame[..frame.len() - 3]).unwrap_err();
    assert!(matches!(err, CodecError::MalformedPayload(_)));
}

#[test]
fn test_typed_roundtrip_writes_no_type_id() {
    let e = engine();
    let id = Uuid::nil();
    let typed = e.encode_typed(&wrap::obj(id)).unwrap();
    let poly = e.encode(&wrap::obj(id)).unwrap();
    // Typed framing drops exactly the registration id varint.
    assert!(typed.len() < poly.len());

    let out = e.decode_typed(&typed, TypeId::of::<Uuid>()).unwrap();
    assert_eq!(*out.downcast_ref::<Uuid>().unwrap(), id);
}

// ── Failure modes ────────────────────────────────────────────────────────────

#[test]
fn test_truncated_payload_is_malformed() {
    let e = engine();
    let bytes = e.encode(&wrap::obj(Uuid::new_v4())).unwrap();
    let err = e.decode(&bytes[..bytes.len() - 4]).unwrap_err();
    assert!(matches!(err, CodecError::MalformedPayload(_)));
}

#[test]
fn test_out_of_range_variant_tag_is_malformed() {
    let e = engine();
    let frozen_list_id = e
        .registry()
        .resolve(TypeId::of::<Arc<Vec<Obj>>>())
        .unwrap()
        .id;
    assert!(frozen_list_id < 0x80, "single-byte varint expected");

    // marker 0, registration id, then a tag outside the closed set.
    let bytes = vec![0x00, frozen_list_id as u8, 0x63];
    let err = e.decode(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::MalformedPayload(_)));
}

#[test]
fn test_unknown_registration_id_is_malformed() {
    let e = engine();
    let err = e.decode(&[0x00, 0x7f]).unwrap_err();
    assert!(matches!(err, CodecError::MalformedPayload(_)));
}

#[test]
fn test_unanticipated_family_member_is_unsupported_variant() {
    let mut e = engine();
    // Point a type the frozen family was never taught at the family codec.
    e.registry_mut()
        .register_codec::<Arc<Vec<String>>>(Arc::new(FrozenCodec::new()))
        .unwrap();

    let bogus: Obj = Arc::new(Arc::new(vec!["x".to_string()]));
    let err = e.encode(&bogus).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedVariant { family: "frozen", .. }));
}

#[test]
fn test_unregistered_type_fails_encode() {
    let e = engine();
    let value: Obj = Arc::new(0u16);
    assert!(matches!(e.encode(&value).unwrap_err(), CodecError::Unregistered(_)));
}

#[test]
fn test_unknown_enum_domain_fails_decode() {
    let writer = engine();
    let bytes = writer.encode(&wrap::enum_set(EnumSet::all(&SWITCH))).unwrap();

    // A reader that was never told about the domain cannot materialize it.
    let mut reader = Engine::new();
    install_defaults(&mut reader).unwrap();
    let err = reader.decode(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::UnknownDomain(name) if name == "Switch"));
}

// ── Wire primitives ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_var_u64_roundtrip(v in any::<u64>()) {
        let mut sink = Sink::new();
        sink.write_var_u64(v).unwrap();
        let bytes = sink.into_bytes();
        let mut source = Source::new(&bytes);
        prop_assert_eq!(source.read_var_u64().unwrap(), v);
        prop_assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn prop_var_i64_roundtrip(v in any::<i64>()) {
        let mut sink = Sink::new();
        sink.write_var_i64(v).unwrap();
        let bytes = sink.into_bytes();
        let mut source = Source::new(&bytes);
        prop_assert_eq!(source.read_var_i64().unwrap(), v);
    }

    #[test]
    fn prop_string_roundtrip(s in ".*") {
        let mut sink = Sink::new();
        sink.write_str(&s).unwrap();
        let bytes = sink.into_bytes();
        let mut source = Source::new(&bytes);
        prop_assert_eq!(source.read_str().unwrap(), s);
    }
}

#[test]
fn test_string_length_prefix_is_validated_before_allocation() {
    // A length prefix far past the end of input must fail cleanly.
    let mut sink = Sink::new();
    sink.write_var_u64(1 << 40).unwrap();
    sink.write_bytes(b"short").unwrap();
    let bytes = sink.into_bytes();
    let mut source = Source::new(&bytes);
    assert!(matches!(source.read_str().unwrap_err(), CodecError::MalformedPayload(_)));
}
