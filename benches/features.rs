use border_flows::{
    CovariateFuser, FeatureDeriver, FillPlan, Month, Observation, ObservationTable,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;

fn observations(nationalities: usize, months: i32) -> ObservationTable {
    let start = Month::new(1, 2013);
    let rows = (0..nationalities)
        .flat_map(|n| {
            (0..months).map(move |m| {
                Observation::new(
                    format!("Country {n}"),
                    start.add_months(m),
                    (n as i64 + 1) * 100 + i64::from(m % 12) * 7,
                )
            })
        })
        .collect();
    border_flows::deduplicate(rows, vec![])
}

fn bench_features(c: &mut Criterion) {
    let table = observations(40, 140);
    let fuser = CovariateFuser::new(BTreeMap::new(), FillPlan::new());
    let fused = fuser.fuse(&table, &[]).expect("fusion");
    let deriver = FeatureDeriver::default();

    c.bench_function("fuse", |b| b.iter(|| fuser.fuse(black_box(&table), &[])));
    c.bench_function("derive", |b| b.iter(|| deriver.derive(black_box(&fused))));
}

criterion_group!(benches, bench_features);
criterion_main!(benches);
