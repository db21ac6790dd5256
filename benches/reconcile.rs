use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::PathBuf;
use treesync::core::{reconcile, FileRecord, Location};

fn local(i: usize) -> FileRecord {
    let relative_path = format!("dir{}/sub{}", i % 50, i % 7);
    let name = format!("file{}.bin", i);
    FileRecord {
        location: Location::Local {
            path: PathBuf::from("/data").join(&relative_path).join(&name),
            root: PathBuf::from("/data"),
        },
        name,
        relative_path,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        modified_at: "2024-01-02T00:00:00Z".to_string(),
        size: Some(i as u64),
        content_digest: format!("{:064x}", i),
    }
}

fn remote(i: usize) -> FileRecord {
    let mut record = local(i);
    record.location = Location::Remote {
        id: i as u64 + 1,
        folder: false,
        is_empty: false,
        ancestors: Vec::new(),
    };
    // 每 10 个文件有一个内容不同
    if i % 10 == 0 {
        record.content_digest = format!("{:064x}", i + 1);
    }
    record
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for size in [1_000usize, 10_000, 50_000] {
        // 两侧各有四分之一独有的文件
        let locals: Vec<FileRecord> = (0..size).map(local).collect();
        let remotes: Vec<FileRecord> = (size / 4..size + size / 4).map(remote).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| reconcile(black_box(&locals), black_box(&remotes)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
