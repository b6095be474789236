use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use stockbook_core::{ItemId, LocationId, UserId};
use stockbook_infra::{InMemoryLedgerStore, LedgerConfig, SaleComposer, StockLedger};
use stockbook_infra::store::MovementFilter;
use stockbook_inventory::{AdjustStock, MovementType, OpenStockLevel, StockLevel};
use stockbook_sales::{NewSale, NewSaleLine, PaymentMethod, Percent, SaleStatus};
use std::sync::Arc;

fn open_level(ledger: &StockLedger<Arc<InMemoryLedgerStore>>, location_id: LocationId) -> StockLevel {
    ledger
        .create_stock_level(OpenStockLevel {
            initial_quantity: 1_000_000,
            ..OpenStockLevel::empty(location_id, ItemId::new(), UserId::new(), Utc::now())
        })
        .unwrap()
}

fn adjust_cmd(level: &StockLevel, delta: i64) -> AdjustStock {
    AdjustStock {
        location_id: level.location_id(),
        item_id: level.item_id(),
        delta,
        movement_type: MovementType::Adjustment,
        reference: None,
        notes: None,
        actor: UserId::new(),
        occurred_at: Utc::now(),
    }
}

fn bench_adjustment_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjustment_latency");

    // Each adjustment clones the staged tables, so latency grows with the log size.
    for history in [0usize, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("adjust_with_history", history),
            history,
            |b, &size| {
                let store = Arc::new(InMemoryLedgerStore::new());
                let ledger = StockLedger::new(Arc::clone(&store), LedgerConfig::default());
                let level = open_level(&ledger, LocationId::new());
                for _ in 0..size {
                    ledger.adjust(adjust_cmd(&level, -1)).unwrap();
                }

                b.iter(|| {
                    black_box(ledger.adjust(adjust_cmd(&level, black_box(-1))).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_sale_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("sale_composition");

    for lines in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*lines as u64));

        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = StockLedger::new(Arc::clone(&store), LedgerConfig::default());
        let composer = SaleComposer::new(Arc::clone(&store), LedgerConfig::default());
        let location_id = LocationId::new();
        let items: Vec<ItemId> = (0..*lines)
            .map(|_| open_level(&ledger, location_id).item_id())
            .collect();

        let new_sale = || NewSale {
            customer_id: None,
            cashier_id: UserId::new(),
            location_id,
            payment_method: PaymentMethod::Card,
            status: SaleStatus::Completed,
            discount_pct: Percent::ZERO,
            tax_pct: Percent::new(8.0).unwrap(),
            notes: None,
            lines: items
                .iter()
                .map(|item_id| NewSaleLine {
                    item_id: *item_id,
                    quantity: 1,
                    unit_price: 9.99,
                    discount_pct: Percent::ZERO,
                    tax_rate: None,
                })
                .collect(),
            occurred_at: Utc::now(),
        };

        group.bench_with_input(BenchmarkId::new("create_sale", lines), lines, |b, _| {
            b.iter(|| black_box(composer.create_sale(new_sale()).unwrap()));
        });

        group.bench_with_input(
            BenchmarkId::new("create_sale_with_stock_decrement", lines),
            lines,
            |b, _| {
                b.iter(|| black_box(composer.create_sale_with_stock_decrement(new_sale()).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_movement_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement_query");

    let store = Arc::new(InMemoryLedgerStore::new());
    let ledger = StockLedger::new(Arc::clone(&store), LedgerConfig::default());
    let location_id = LocationId::new();
    let levels: Vec<StockLevel> = (0..20).map(|_| open_level(&ledger, location_id)).collect();
    for level in &levels {
        for _ in 0..250 {
            ledger.adjust(adjust_cmd(level, 1)).unwrap();
        }
    }

    group.bench_function("first_page_for_item", |b| {
        let filter = MovementFilter::for_item(levels[7].item_id());
        b.iter(|| black_box(ledger.movements(&filter, None).unwrap()));
    });

    group.bench_function("first_page_for_location", |b| {
        let filter = MovementFilter::for_location(location_id);
        b.iter(|| black_box(ledger.movements(&filter, None).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_adjustment_latency,
    bench_sale_composition,
    bench_movement_query
);
criterion_main!(benches);
