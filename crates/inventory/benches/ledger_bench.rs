use std::sync::Arc;

use common::{CartItem, OrderPayload, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use futures_util::future::join_all;
use inventory::{
    CartStore, FinalizationEngine, InMemoryLedger, Product, ReservationEngine,
};

fn stocked_ledger() -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::with_products(
        (1..=10).map(|id| Product::new(id, 1_000_000)),
    ))
}

fn five_line_order(user: i64) -> OrderPayload {
    OrderPayload::new(
        user,
        "bench@example.com",
        (1..=5).map(|id| CartItem::new(id, 1)).collect(),
    )
}

fn bench_place_and_compensate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = ReservationEngine::new(stocked_ledger());
    let order = five_line_order(1);

    c.bench_function("inventory/place_and_compensate_5_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.place(&order, None).await.unwrap();
                engine.compensate_place(&order, None).await.unwrap();
            });
        });
    });
}

fn bench_finalize(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = FinalizationEngine::new(stocked_ledger());
    let order = five_line_order(1);
    let restock = order.restock_lines();

    c.bench_function("inventory/finalize_and_restock_5_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.finalize(&order, None).await.unwrap();
                engine.compensate_finalize(&restock, None).await.unwrap();
            });
        });
    });
}

fn bench_contended_cart_adds(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cart = Arc::new(CartStore::new(stocked_ledger()));

    c.bench_function("inventory/cart_add_16_concurrent_same_product", |b| {
        b.iter(|| {
            rt.block_on(async {
                let adds = (0..16).map(|user| {
                    let cart = cart.clone();
                    async move {
                        cart.add_to_cart(UserId::new(user), ProductId::new(1), 1)
                            .await
                            .unwrap();
                    }
                });
                join_all(adds).await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_place_and_compensate,
    bench_finalize,
    bench_contended_cart_adds,
);
criterion_main!(benches);
