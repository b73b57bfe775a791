//! Benchmarks for free-bitmap allocation.

use affs_fs::Allocator;

fn main() {
    divan::main();
}

#[divan::bench]
fn bench_allocate_single(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut a = Allocator::new(1760, 512);
        divan::black_box(a.allocate())
    });
}

#[divan::bench]
fn bench_allocate_many_small(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut a = Allocator::new(1760, 512);
        divan::black_box(a.allocate_many(16))
    });
}

#[divan::bench]
fn bench_allocate_file_blocks_ofs(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut a = Allocator::new(2000, 512);
        divan::black_box(a.allocate_file_blocks(64 * 1024, true))
    });
}

#[divan::bench]
fn bench_allocate_file_blocks_ffs(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut a = Allocator::new(2000, 512);
        divan::black_box(a.allocate_file_blocks(64 * 1024, false))
    });
}

#[divan::bench]
fn bench_allocate_exhaust_and_wrap(bencher: divan::Bencher) {
    bencher.bench_local(|| {
        let mut a = Allocator::new(1760, 512);
        let blocks = a.allocate_many(1000).unwrap();
        a.deallocate_many(&blocks[..500]);
        divan::black_box(a.allocate_many(400))
    });
}
