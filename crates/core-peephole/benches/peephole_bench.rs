use core_encoder::encode;
use core_encoder::stream::InstructionStream;
use core_peephole::PeepholeOptimizer;
use criterion::{Criterion, criterion_group, criterion_main};

fn synthetic_stream(repeats: usize) -> InstructionStream {
    let mut s = InstructionStream::new();
    for i in 0..repeats {
        let base = 29;
        let off = ((i % 8) * 8) as i64;
        s.push(encode::movz(9, 8, 0));
        s.push(encode::mul(0, 1, 9));
        s.push(encode::str_imm(0, base, off));
        s.push(encode::ldr_imm(2, base, off));
        s.push(encode::add_imm(2, 2, 0));
        s.push(encode::mov_reg(3, 3));
    }
    s.push(encode::ret());
    s
}

fn bench_optimize(c: &mut Criterion) {
    c.bench_function("peephole_5_passes_600_instructions", |b| {
        b.iter(|| {
            let mut stream = synthetic_stream(100);
            let mut opt = PeepholeOptimizer::new();
            opt.optimize(&mut stream, 5);
            stream.len()
        })
    });
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);
