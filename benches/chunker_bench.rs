use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use surfsync::chunker::{compute_blocks, hash_list};
use surfsync::index::{format_line, parse_line};
use surfsync::meta::FileMetaData;
use surfsync::sync::{classify, local_candidate};

fn make_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn bench_compute_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_blocks");
    let data = make_data(8 * 1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for block_size in [1024, 4096, 65536].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            block_size,
            |b, &size| {
                b.iter(|| compute_blocks(black_box(&data), size));
            },
        );
    }
    group.finish();
}

fn bench_index_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_line");

    for block_count in [1, 64, 1024].iter() {
        let data = make_data(block_count * 4096);
        let meta = FileMetaData::new("some/long-ish file name.bin", 7, hash_list(&data, 4096));
        let line = format_line(&meta);

        group.bench_with_input(
            BenchmarkId::new("format", block_count),
            &meta,
            |b, meta| b.iter(|| format_line(black_box(meta))),
        );
        group.bench_with_input(
            BenchmarkId::new("parse", block_count),
            &line,
            |b, line| b.iter(|| parse_line(black_box(line)).unwrap()),
        );
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for file_count in [100, 1000, 10000].iter() {
        let pairs: Vec<(FileMetaData, FileMetaData)> = (0..*file_count)
            .map(|i| {
                let hashes = hash_list(format!("file{i}").as_bytes(), 4096);
                let previous = FileMetaData::new(format!("file{i}.txt"), 3, hashes.clone());
                let remote = if i % 2 == 0 {
                    previous.clone()
                } else {
                    previous.next_version(vec![]).unwrap()
                };
                let local = local_candidate(&previous.filename, hashes, Some(&previous)).unwrap();
                (local, remote)
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(file_count),
            &pairs,
            |b, pairs| {
                b.iter(|| {
                    pairs
                        .iter()
                        .map(|(local, remote)| classify(Some(local), Some(remote)))
                        .count()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_compute_blocks, bench_index_lines, bench_classify);
criterion_main!(benches);
