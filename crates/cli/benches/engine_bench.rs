use config::EngineConfig;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::Engine;
use tempfile::tempdir;

const N_KEYS: u64 = 4_096;
const VALUE_SIZE: usize = 100;

fn filled_engine(dir: &std::path::Path) -> Engine {
    let mut engine = Engine::open(EngineConfig::in_dir(dir)).unwrap();
    for k in 0..N_KEYS {
        engine.put(k, vec![b'x'; VALUE_SIZE]).unwrap();
    }
    engine.force_flush().unwrap();
    engine
}

fn engine_put_benchmark(c: &mut Criterion) {
    c.bench_function("engine_put_4k", |b| {
        b.iter_batched(
            || tempdir().unwrap(),
            |dir| {
                let mut engine = Engine::open(EngineConfig::in_dir(dir.path())).unwrap();
                for k in 0..N_KEYS {
                    engine.put(k, vec![b'x'; VALUE_SIZE]).unwrap();
                }
                (engine, dir)
            },
            BatchSize::PerIteration,
        );
    });
}

fn engine_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut engine = filled_engine(dir.path());

    // Even keys below N_KEYS hit, the rest miss.
    c.bench_function("engine_get_half_hits_4k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                engine.get(2 * i).unwrap();
            }
        });
    });
}

fn engine_scan_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut engine = filled_engine(dir.path());

    c.bench_function("engine_scan_half_4k", |b| {
        b.iter(|| engine.scan(0, N_KEYS / 2 - 1).unwrap());
    });
    c.bench_function("engine_merge_scan_half_4k", |b| {
        b.iter(|| engine.merge_scan(0, N_KEYS / 2 - 1).unwrap());
    });
}

fn engine_gc_benchmark(c: &mut Criterion) {
    c.bench_function("engine_gc_after_overwrite_4k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let mut engine = filled_engine(dir.path());
                for k in 0..N_KEYS / 2 {
                    engine.put(k, vec![b'y'; VALUE_SIZE]).unwrap();
                }
                engine.force_flush().unwrap();
                (dir, engine)
            },
            |(_dir, mut engine)| {
                engine.gc(1 << 20).unwrap();
                engine
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(
    benches,
    engine_put_benchmark,
    engine_get_benchmark,
    engine_scan_benchmark,
    engine_gc_benchmark
);
criterion_main!(benches);
