use criterion::{black_box, criterion_group, criterion_main, Criterion};

use indexmap::IndexMap;
use uuid::Uuid;

use varcodec::wrap::{self, Key};
use varcodec::{install_defaults, Engine, Obj};

fn engine() -> Engine {
    let mut e = Engine::new();
    install_defaults(&mut e).unwrap();
    e
}

fn ordered_map(entries: usize) -> Obj {
    let mut m = IndexMap::new();
    for i in 0..entries {
        m.insert(Key::Str(format!("key-{i:04}")), wrap::obj(i as i64));
    }
    wrap::frozen_ordered_map(m)
}

fn bench_scalar(c: &mut Criterion) {
    let e = engine();
    let value = wrap::obj(Uuid::new_v4());
    let bytes = e.encode(&value).unwrap();

    c.bench_function("encode_uuid", |b| {
        b.iter(|| e.encode(black_box(&value)).unwrap())
    });
    c.bench_function("decode_uuid", |b| {
        b.iter(|| e.decode(black_box(&bytes)).unwrap())
    });
}

fn bench_frozen_ordered_map(c: &mut Criterion) {
    let e = engine();
    let value = ordered_map(1000);
    let bytes = e.encode(&value).unwrap();

    c.bench_function("encode_frozen_ordered_map_1k", |b| {
        b.iter(|| e.encode(black_box(&value)).unwrap())
    });
    c.bench_function("decode_frozen_ordered_map_1k", |b| {
        b.iter(|| e.decode(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_scalar, bench_frozen_ordered_map);
criterion_main!(benches);
