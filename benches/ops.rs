use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use volnas::nas::OpsRegistry;
use volnas::ops::OpsConfig;
use volnas::layers::Volume;

fn random_volume(channels: usize, size: usize) -> Volume {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
    Volume::from_shape_simple_fn((2, channels, size, size, size), || rng.gen::<f64>())
}

fn bench_registry_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    group.sample_size(10);

    let registry = OpsRegistry::new(OpsConfig::default().with_seed(42)).unwrap();
    let x = random_volume(16, 16);

    for name in ["identity", "conv", "dep_conv", "se_conv", "down_conv", "up_conv", "max_pool"] {
        let mut op = registry.create(name, 16, 2).unwrap();
        group.bench_with_input(BenchmarkId::new("op", name), &x, |b, x| {
            b.iter(|| op.apply(black_box(x)).unwrap())
        });
    }

    group.finish();
}

fn bench_conv_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_channels");
    group.sample_size(10);

    let registry = OpsRegistry::new(OpsConfig::default().with_seed(42)).unwrap();
    for channels in [8, 16, 32].iter() {
        let x = random_volume(*channels, 8);
        let mut op = registry.create("conv", *channels, 1).unwrap();
        group.bench_with_input(BenchmarkId::new("apply", channels), &x, |b, x| {
            b.iter(|| op.apply(black_box(x)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registry_ops, bench_conv_channels);
criterion_main!(benches);
