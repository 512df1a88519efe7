use common::Money;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::Product;
use store::{InMemoryStore, ProductCatalog, StockLedger, TransactionalStore};

fn bench_reserve_and_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = Product::new("Widget", Money::from_dollars(5), u32::MAX);
    rt.block_on(store.insert_product(&product)).unwrap();

    c.bench_function("store/reserve_and_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                tx.reserve(product.id, 1).await.unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

fn bench_reserve_and_rollback(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = Product::new("Widget", Money::from_dollars(5), 10);
    rt.block_on(store.insert_product(&product)).unwrap();

    c.bench_function("store/reserve_and_rollback", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut tx = store.begin().await.unwrap();
                tx.reserve(product.id, 1).await.unwrap();
                drop(tx);
            });
        });
    });
}

criterion_group!(benches, bench_reserve_and_commit, bench_reserve_and_rollback);
criterion_main!(benches);
