use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use resource_fetch::CacheConfig;
use resource_fetch::test_utils::{TestEnv, response, url};
use resource_fetch::variants::RawResourceFactory;
use std::hint::black_box;

const ENTRIES: usize = 1_000;
const BODY: &[u8] = &[0; 1024];

/// Environment whose cache holds `ENTRIES` dead raw resources.
fn populated_env() -> TestEnv {
    let env = TestEnv::with_cache_config(CacheConfig::builder().with_capacity(usize::MAX).build());
    for i in 0..ENTRIES {
        let target = format!("https://example.com/asset/{i}.bin");
        let resource = env.new_resource(&RawResourceFactory::default(), &target);
        env.cache.add(&resource);
        resource.response_received(response(&target, 200, &[]));
        resource.append_data(BODY);
        resource.finish();
    }
    env
}

fn prune_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("MemoryCache");

    group.bench_function("prune_all", |b| {
        b.iter_batched(
            populated_env,
            |env| {
                env.cache.prune_all();
                black_box(env.cache.size())
            },
            BatchSize::LargeInput,
        )
    });

    let env = populated_env();
    let hit = url("https://example.com/asset/500.bin");
    let miss = url("https://example.com/missing.bin");
    group.bench_function("lookup_hit", |b| {
        b.iter(|| black_box(env.cache.lookup(&hit, "")))
    });
    group.bench_function("lookup_miss", |b| {
        b.iter(|| black_box(env.cache.lookup(&miss, "")))
    });

    group.finish();
}

criterion_group!(benches, prune_benchmark);
criterion_main!(benches);
