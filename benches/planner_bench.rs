use criterion::{criterion_group, criterion_main, Criterion};
use prism_federation::{parse_query, plan_query, MemorySource, SourceRegistry, Value};
use std::hint::black_box;
use std::sync::Arc;

const JOIN_SQL: &str = "SELECT d.id, o.name, SUM(d.amount) AS total \
    FROM crm.deals d JOIN crm.owners o ON d.owner_id = o.id \
    WHERE d.stage = 'won' AND o.region IN ('EU', 'US') \
    GROUP BY d.id, o.name ORDER BY total DESC LIMIT 10";

const CTE_SQL: &str = "WITH won AS (SELECT id, owner_id, amount FROM crm.deals WHERE stage = 'won'), \
    big AS (SELECT owner_id FROM won WHERE amount > 100) \
    SELECT o.name FROM crm.owners o WHERE o.id IN (SELECT owner_id FROM big) ORDER BY o.name";

fn registry() -> SourceRegistry {
    let deals: Vec<Vec<Value>> = (0..1000)
        .map(|i| {
            vec![
                Value::BigInt(i),
                Value::from(if i % 3 == 0 { "won" } else { "open" }),
                Value::BigInt(i * 7 % 500),
                Value::BigInt(i % 20),
            ]
        })
        .collect();
    let owners: Vec<Vec<Value>> = (0..20)
        .map(|i| {
            vec![
                Value::BigInt(i),
                Value::from(format!("owner{}", i).as_str()),
                Value::from(if i % 2 == 0 { "EU" } else { "US" }),
            ]
        })
        .collect();

    let mut registry = SourceRegistry::new();
    let deals = MemorySource::new(
        vec!["id".into(), "stage".into(), "amount".into(), "owner_id".into()],
        deals,
        true,
    )
    .unwrap();
    let owners = MemorySource::new(vec!["id".into(), "name".into(), "region".into()], owners, true)
        .unwrap();
    registry.register("crm", "deals", Arc::new(deals)).unwrap();
    registry.register("crm", "owners", Arc::new(owners)).unwrap();
    registry
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_join_query", |b| {
        b.iter(|| parse_query(black_box(JOIN_SQL)).unwrap())
    });
}

fn bench_plan(c: &mut Criterion) {
    let registry = registry();
    let join = parse_query(JOIN_SQL).unwrap();
    let cte = parse_query(CTE_SQL).unwrap();

    c.bench_function("plan_join_query", |b| {
        b.iter(|| plan_query(black_box(&join), &registry).unwrap())
    });
    c.bench_function("plan_cte_query", |b| {
        b.iter(|| plan_query(black_box(&cte), &registry).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_plan);
criterion_main!(benches);
