use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dreval::correlation::kendall;
use dreval::{PartialCorrelationOptions, WarningRegistry, partial_correlation};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Slice {
    predictions: Vec<f64>,
    response: Vec<f64>,
    cells: Vec<usize>,
    drugs: Vec<usize>,
}

fn random_slice(n_cells: usize, n_drugs: usize) -> Slice {
    let mut rng = StdRng::seed_from_u64(0x5EED_D2E + (n_cells * n_drugs) as u64);
    let mut slice = Slice {
        predictions: Vec::new(),
        response: Vec::new(),
        cells: Vec::new(),
        drugs: Vec::new(),
    };
    for c in 0..n_cells {
        for d in 0..n_drugs {
            let truth: f64 = rng.sample(Standard);
            let noise: f64 = rng.sample(Standard);
            slice.response.push(truth + c as f64 * 0.1);
            slice.predictions.push(truth + 0.5 * noise + d as f64 * 0.05);
            slice.cells.push(c);
            slice.drugs.push(d);
        }
    }
    slice
}

fn benchmark_partial_correlation(c: &mut Criterion) {
    let shapes = [(10_usize, 10_usize), (50, 20), (100, 50)];
    let options = PartialCorrelationOptions::default().with_seed(7);
    let warnings = WarningRegistry::new();

    let mut group = c.benchmark_group("partial_correlation");
    for &(n_cells, n_drugs) in &shapes {
        let slice = random_slice(n_cells, n_drugs);
        let rows = (n_cells * n_drugs) as u64;
        group.throughput(Throughput::Elements(rows));

        let label = format!("{n_cells}x{n_drugs}");
        group.bench_with_input(BenchmarkId::new("pearson", &label), &slice, |b, input| {
            b.iter(|| {
                let score = partial_correlation(
                    black_box(&input.predictions),
                    black_box(&input.response),
                    &input.cells,
                    &input.drugs,
                    &options,
                    true,
                    &warnings,
                );
                black_box(score)
            });
        });

        group.bench_with_input(BenchmarkId::new("kendall", &label), &slice, |b, input| {
            b.iter(|| black_box(kendall(black_box(&input.predictions), &input.response)));
        });
    }
    group.finish();
}

criterion_group!(partial, benchmark_partial_correlation);
criterion_main!(partial);
