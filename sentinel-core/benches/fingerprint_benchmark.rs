//! Fingerprint and verification benchmarks
//! Target: re-verifying an unchanged model should cost little more than hashing it

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sentinel_core::fingerprint::{fingerprint_bytes, fingerprint_set};
use sentinel_core::prompt::FixedPrompter;
use sentinel_core::target::{FileSelector, LocalTarget};
use sentinel_core::{TrustStore, Verifier};
use std::fs;
use tempfile::TempDir;

/// A model directory shaped like a typical remote-code repository
fn create_model_dir(files: usize, lines: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..files {
        let body: String = (0..lines)
            .map(|line| format!("    value_{line} = compute({i}, {line})\n"))
            .collect();
        let dir = temp_dir.path().join(format!("module_{}", i % 4));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("layer_{i}.py")),
            format!("def layer_{i}():\n{body}"),
        )
        .unwrap();
    }
    fs::write(temp_dir.path().join("config.json"), "{}").unwrap();
    temp_dir
}

fn benchmark_fingerprint_set(c: &mut Criterion) {
    let contents: Vec<(String, Vec<u8>)> = (0..64)
        .map(|i| (format!("module/layer_{i}.py"), vec![b'x'; 16 * 1024]))
        .collect();

    c.bench_function("fingerprint_set_64_files_16k", |b| {
        b.iter(|| {
            let entries = contents.iter().map(|(p, c)| (p.as_str(), c.as_slice()));
            black_box(fingerprint_set(entries).unwrap())
        })
    });

    let large = vec![b'y'; 4 * 1024 * 1024];
    c.bench_function("fingerprint_bytes_4m", |b| {
        b.iter(|| black_box(fingerprint_bytes(&large)))
    });
}

fn benchmark_unchanged_reverify(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let model_dir = create_model_dir(40, 200);
    let store_dir = TempDir::new().unwrap();

    let verifier = Verifier::new(TrustStore::open(store_dir.path()));
    let target = LocalTarget::new(model_dir.path(), FileSelector::default()).unwrap();

    // First run approves everything so later runs short-circuit
    runtime
        .block_on(verifier.verify(&target, &FixedPrompter(true)))
        .unwrap();

    c.bench_function("reverify_unchanged_local_model", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(verifier.verify(&target, &FixedPrompter(false)).await.unwrap())
            })
        })
    });
}

criterion_group!(benches, benchmark_fingerprint_set, benchmark_unchanged_reverify);
criterion_main!(benches);
