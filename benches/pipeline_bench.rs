use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tally::arch::Architecture;
use tally::parser::parse;
use tally::id::UnitId;
use tally::plugin::PluginRegistry;
use tally::session::Session;

// Sample programs of varying complexity
const ARITHMETIC: &str = "5 + 6 * 7 - 8 / 2";

const RECORDS: &str = r#"
record Point(x: Int, y: Int)
sum Shape { record Circle(r: Int); record Rect(w: Int, h: Int); object Empty }
def area(s: Shape): Int {
    match (s) { case Circle(c) { 3 * c.r * c.r } case Rect(q) { q.w * q.h } case Empty { 0 } }
}
area(Rect(3, 4)) + area(Circle(2)) + area(Empty)
"#;

const GENERIC: &str = r#"
def fill<#N>(xs: List<Int, N>): Int {
    mutable out = MutableList<Int, N>()
    for (x in xs) { out.add(x * x) }
    total(out.toList())
}
def twice(f: (Int) -> Int, x: Int): Int { f(f(x)) }
fill(List(1, 2, 3, 4, 5, 6, 7, 8)) + twice(lambda (y: Int) -> y + 1, 3)
"#;

fn scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("arithmetic", ARITHMETIC),
        ("records", RECORDS),
        ("generic", GENERIC),
    ]
}

/// Compile-scaling generator: `n` chained functions, each calling the last.
fn generate_chain(n: usize) -> String {
    let mut src = String::from("def f0(x: Int): Int { x + 1 }\n");
    for i in 1..n {
        src.push_str(&format!("def f{}(x: Int): Int {{ f{}(x) * 2 }}\n", i, i - 1));
    }
    src.push_str(&format!("f{}(1)\n", n - 1));
    src
}

fn session() -> Session {
    Session::new(Architecture::default().with_ceiling(u64::MAX), PluginRegistry::standard())
        .expect("standard plugins register")
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, src) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), src, |b, src| {
            b.iter(|| parse(black_box(src), UnitId(1)))
        });
    }
    group.finish();
}

fn bench_compile_and_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_and_run");
    for (name, src) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), src, |b, src| {
            b.iter(|| {
                let mut s = session();
                s.run("main", black_box(src)).expect("benchmark scenario must run")
            })
        });
    }
    group.finish();
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_scaling");
    for n in [8usize, 32, 128] {
        let src = generate_chain(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &src, |b, src| {
            b.iter(|| {
                let mut s = session();
                s.compile("main", black_box(src)).expect("chain compiles")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile_and_run, bench_scaling);
criterion_main!(benches);
