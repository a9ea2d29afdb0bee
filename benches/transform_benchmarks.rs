use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use RustLaplace::*;

fn bench_worksheet(c: &mut Criterion) {
    let mut group = c.benchmark_group("worksheet");

    let worksheet = r#"
.title RLC ladder
1k * i(in,mid)
10m * ddt(i(mid,out))
1meg * int(i(out,0), 0, t)
v(in,0) + 5
ddt(v(out,0)) + 2*i(in,mid)
int(v(mid,out), 0, t)
e^(-3*t)
.end
"#;

    let parser = WorksheetParser::new();

    group.bench_function("parse_worksheet", |b| {
        b.iter(|| parser.parse_worksheet(worksheet).unwrap());
    });

    group.bench_function("analyze", |b| {
        b.iter(|| {
            let mut analyzer = Analyzer::with_config(AnalyzerConfig {
                verify_round_trip: true,
                ..AnalyzerConfig::default()
            });
            analyzer.load_worksheet_from_str(worksheet).unwrap();
            analyzer.run().unwrap();
        });
    });

    group.finish();
}

/// Sum of `n` scaled derivative terms over distinct voltages
fn wide_sum(n: usize) -> Expression {
    Expression::sum_of(
        (0..n)
            .map(|k| {
                let v = Expression::voltage(Voltage::new(PinId(k), PinId(k + 1)), Domain::Time);
                Expression::constant(k as f64 + 1.0) * Expression::derivative(v)
            })
            .collect::<Vec<_>>(),
    )
}

fn bench_transform_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    for size in [10, 100, 1000].iter() {
        let time = wide_sum(*size);
        let frequency = time.to_frequency().unwrap();

        group.bench_with_input(BenchmarkId::new("domain", size), &time, |b, expr| {
            b.iter(|| expr.domain().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("to_frequency", size), &time, |b, expr| {
            b.iter(|| expr.to_frequency().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("to_time", size), &frequency, |b, expr| {
            b.iter(|| expr.to_time().unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_worksheet, bench_transform_sizes);
criterion_main!(benches);
