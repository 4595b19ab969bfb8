use criterion::{Criterion, criterion_group, criterion_main};
use genvm::{Runtime, Value};
use std::hint::black_box;

// cargo bench --profile dev

// Initialize logger for benchmark so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_bench_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).try_init();
}

const COUNTER: &str = r#"
fn counter($n)
    $i = 0
loop:
    $more = $i < $n
    if_false $more goto done
    yield $i
    $i = $i + 1
    goto loop
done:
    return $i
end

fn relay($depth, $n)
    $last = $depth < 1
    if_false $last goto deeper
    $r = yield from counter($n)
    return $r
deeper:
    $d = $depth - 1
    $r = yield from relay($d, $n)
    return $r
end

fn sink()
    $total = 0
loop:
    $x = yield $total
    $total = $total + $x
    goto loop
end

fn guarded()
    try {
        yield 1
        yield 2
    } finally {
        echo "done"
    }
end
"#;

fn drain(rt: &mut Runtime<genvm::Interpreter>, name: &str, args: Vec<Value>) -> usize {
    let g = rt.spawn(name, args).unwrap();
    rt.iter(&g, false).unwrap().map(|pair| pair.unwrap()).count()
}

fn benchmark_resume(c: &mut Criterion) {
    // plain yield loop
    c.bench_function("resume_plain_1000", |b| {
        let mut rt = Runtime::from_source(COUNTER).unwrap();
        b.iter(|| black_box(drain(&mut rt, "counter", vec![Value::Int(1000)])))
    });

    // every value crosses a delegation chain of 10 generators
    c.bench_function("resume_delegated_depth_10", |b| {
        let mut rt = Runtime::from_source(COUNTER).unwrap();
        b.iter(|| black_box(drain(&mut rt, "relay", vec![Value::Int(10), Value::Int(200)])))
    });

    c.bench_function("yield_from_array_1000", |b| {
        let mut rt = Runtime::from_source("fn spread($a)\n    yield from $a\nend").unwrap();
        let array = Value::list((0..1000).map(Value::Int));
        b.iter(|| black_box(drain(&mut rt, "spread", vec![array.clone()])))
    });

    c.bench_function("send_1000", |b| {
        let mut rt = Runtime::from_source(COUNTER).unwrap();
        b.iter(|| {
            let g = rt.spawn("sink", vec![]).unwrap();
            for i in 0..1000 {
                black_box(rt.send(&g, Value::Int(i)).unwrap());
            }
        })
    });

    // destroying a generator suspended in a try block runs its finally
    c.bench_function("destroy_with_finally", |b| {
        let mut rt = Runtime::from_source(COUNTER).unwrap();
        b.iter(|| {
            let g = rt.spawn("guarded", vec![]).unwrap();
            rt.ensure_initialized(&g).unwrap();
            rt.destroy(&g).unwrap();
            black_box(rt.take_output());
        })
    });
}

criterion_group!(benches, benchmark_resume);
criterion_main!(benches);
