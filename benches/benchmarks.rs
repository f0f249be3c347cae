//! Benchmarks for ndspc operations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndspc::{Classifier, NdspcConfig, PrototypeMemory, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_tensor(rng: &mut ChaCha8Rng, shape: &[usize]) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Tensor::from_data(data, shape)
}

fn benchmark_gate_forward(c: &mut Criterion) {
    let config = NdspcConfig {
        img_size: 16,
        ..NdspcConfig::default()
    };
    let model = Classifier::new(&config);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let features = random_tensor(&mut rng, &[8, 16, 16, 16]);

    c.bench_function("gate_forward", |b| {
        b.iter(|| model.gate.forward(black_box(&features)))
    });
}

fn benchmark_memory_search(c: &mut Criterion) {
    let dim = 512;
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let mut memory = PrototypeMemory::new(dim);
    memory
        .add_prototypes(random_tensor(&mut rng, &[256, dim]))
        .unwrap();
    let queries = random_tensor(&mut rng, &[8, dim]);

    c.bench_function("memory_search_256x512", |b| {
        b.iter(|| memory.search(black_box(&queries)).unwrap())
    });
}

fn benchmark_classifier_forward(c: &mut Criterion) {
    let config = NdspcConfig {
        img_size: 16,
        ..NdspcConfig::default()
    };
    let mut model = Classifier::new(&config);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let images = random_tensor(&mut rng, &[16, 3, 16, 16]);
    let features = model.extract_features(&images);
    model.memory.add_prototypes(features.flatten_batch()).unwrap();

    c.bench_function("classifier_forward", |b| {
        b.iter(|| model.forward(black_box(&images)).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_gate_forward,
    benchmark_memory_search,
    benchmark_classifier_forward
);
criterion_main!(benches);
