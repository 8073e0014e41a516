use criterion::Throughput;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use jetntuple::gen_matcher::{GenJetMatcher, MatchParams};
use jetntuple::objects::{EnergyFractions, GenJet, Jet, RecoJet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_jet(rng: &mut StdRng) -> Jet {
    Jet::new(
        rng.random_range(10.0..500.0),
        rng.random_range(-4.7..4.7),
        rng.random_range(-std::f64::consts::PI..std::f64::consts::PI),
        rng.random_range(0.0..30.0),
    )
}

fn bench_gen_matcher(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let matcher = GenJetMatcher::new(MatchParams::builder().dr_match(0.4).build().unwrap());

    let mut group = c.benchmark_group("add_gen_jet_match");
    for n_jets in [8usize, 32, 128, 256] {
        let mut reco: Vec<RecoJet> = (0..n_jets)
            .map(|_| RecoJet::new(random_jet(&mut rng), 0.5, 0.1, EnergyFractions::default(), 6))
            .collect();
        let gen: Vec<GenJet> = (0..n_jets)
            .map(|_| GenJet::new(random_jet(&mut rng), None, 21, 0))
            .collect();

        group.throughput(Throughput::Elements((n_jets * n_jets) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_jets), &n_jets, |b, _| {
            b.iter(|| matcher.add_gen_jet_match(&mut reco, &gen))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gen_matcher);
criterion_main!(benches);
