use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mixledger_core::{OperatorId, Quantity};
use mixledger_infra::adjustment_engine::InventoryAdjustmentEngine;
use mixledger_infra::ledger_query::{LedgerFilter, LedgerQuery};
use mixledger_infra::stock_store::InMemoryStockStore;
use mixledger_inventory::{
    CatalogItem, ChangeEvent, ChangeReason, ItemKind, ItemRef, Operator, StockAdjustment,
};
use mixledger_production::RatioCalculator;
use rust_decimal::Decimal;

fn seeded_engine(items: usize, stock: i64) -> (InventoryAdjustmentEngine<InMemoryStockStore>, Vec<ItemRef>) {
    let catalog: Vec<CatalogItem> = (0..items)
        .map(|i| {
            CatalogItem::new(ItemKind::Material, format!("RM-{i:05}"), format!("raw {i}"), "kg")
                .unwrap()
                .with_opening_stock(Quantity::from_i64(stock))
                .unwrap()
        })
        .collect();
    let refs = catalog.iter().map(CatalogItem::item_ref).collect();
    let store = InMemoryStockStore::with_items(catalog).unwrap();
    (InventoryAdjustmentEngine::new(store), refs)
}

fn manual(operator: &Operator, refs: &[ItemRef], delta: i64) -> ChangeEvent {
    ChangeEvent::new(
        ChangeReason::ManualAdjustment,
        operator.clone(),
        refs.iter()
            .map(|r| StockAdjustment::strict(*r, Quantity::from_i64(delta)))
            .collect(),
    )
}

fn bench_change_event_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_event_latency");
    group.sample_size(500);
    let operator = Operator::new(OperatorId::new(), "bench");

    group.bench_function("single_item", |b| {
        let (engine, refs) = seeded_engine(1, 0);
        let event = manual(&operator, &refs, 1);
        b.iter(|| {
            black_box(engine.apply_change_event(black_box(&event)).unwrap());
        });
    });

    group.bench_function("single_item_after_long_ledger", |b| {
        let (engine, refs) = seeded_engine(1, 0);
        let event = manual(&operator, &refs, 1);
        for _ in 0..10_000 {
            engine.apply_change_event(&event).unwrap();
        }
        b.iter(|| {
            black_box(engine.apply_change_event(black_box(&event)).unwrap());
        });
    });

    group.finish();
}

fn bench_items_per_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("items_per_event");
    let operator = Operator::new(OperatorId::new(), "bench");

    for items in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), items, |b, &items| {
            let (engine, refs) = seeded_engine(items, 0);
            let event = manual(&operator, &refs, 1);
            b.iter(|| {
                black_box(engine.apply_change_event(&event).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_net_change_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("net_change_scan");
    let operator = Operator::new(OperatorId::new(), "bench");
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    for entries in [100usize, 1_000, 10_000].iter() {
        let (engine, refs) = seeded_engine(10, 0);
        let event = manual(&operator, &refs, 1);
        for _ in 0..*entries {
            engine.apply_change_event(&event).unwrap();
        }
        group.throughput(Throughput::Elements(*entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), entries, |b, _| {
            b.iter(|| {
                let net = runtime
                    .block_on(engine.store().net_change(LedgerFilter::default()))
                    .unwrap();
                black_box(net);
            });
        });
    }

    group.finish();
}

fn bench_ratio_rule(c: &mut Criterion) {
    let calculator = RatioCalculator::default();
    c.bench_function("calculate_ratios", |b| {
        b.iter(|| {
            for p in 0..=100 {
                black_box(calculator.calculate_ratios(Decimal::from(p)).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_change_event_latency,
    bench_items_per_event,
    bench_net_change_scan,
    bench_ratio_rule
);
criterion_main!(benches);
