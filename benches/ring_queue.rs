//! Throughput benchmarks for the ring queue: the plain FIFO cycle, the
//! steady-state ring, and the cost of the copy-on-write barrier.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ringqueue::RingQueue;

fn bench_push_pop_cycle(c: &mut Criterion) {
    c.bench_function("push_pop_cycle_1024", |b| {
        b.iter(|| {
            let mut queue = RingQueue::with_capacity(1024);
            for i in 0..1024u64 {
                queue.push_back(black_box(i));
            }
            while let Some(value) = queue.pop_front() {
                black_box(value);
            }
        })
    });
}

fn bench_steady_state_ring(c: &mut Criterion) {
    c.bench_function("steady_state_ring_512", |b| {
        let mut queue: RingQueue<u64> = (0..512).collect();
        b.iter(|| {
            queue.push_back(black_box(1));
            black_box(queue.pop_front());
        })
    });
}

fn bench_clone_then_write(c: &mut Criterion) {
    c.bench_function("clone_then_write_1024", |b| {
        let base: RingQueue<u64> = (0..1024).collect();
        b.iter(|| {
            let mut copy = base.clone();
            copy.push_back(black_box(1));
            black_box(copy.len());
        })
    });
}

fn bench_clone_read_only(c: &mut Criterion) {
    c.bench_function("clone_read_only_1024", |b| {
        let base: RingQueue<u64> = (0..1024).collect();
        b.iter(|| {
            let copy = base.clone();
            black_box(copy.front());
        })
    });
}

criterion_group!(
    benches,
    bench_push_pop_cycle,
    bench_steady_state_ring,
    bench_clone_then_write,
    bench_clone_read_only
);
criterion_main!(benches);
