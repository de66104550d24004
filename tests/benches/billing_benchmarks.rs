//! # StrayWatch Billing Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Registry register + resolve | < 10µs |
//! | Broadcast reject over N entries | linear in N |
//! | Fallback purchase through the service | < 100µs |

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use sw_01_billing::adapters::mock::{InMemoryProfileStore, MockNativeStore};
use sw_01_billing::ports::{PurchaseUpdate, StoreTransaction, SystemClock};
use sw_01_billing::{
    BillingApi, BillingConfig, BillingDependencies, BillingService, PendingTransactionRegistry,
    ProductId, PurchaseRequest, TransactionEvent, TransactionOutcome,
};

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("sw-01-pending-registry");
    let registry = PendingTransactionRegistry::new(Duration::from_secs(30));

    group.bench_function("register_resolve", |b| {
        let product = ProductId::from("tier.gold");
        b.iter(|| {
            let request = PurchaseRequest::new(product.clone(), None, Utc::now());
            let rx = registry.register(&request, None);
            registry.resolve(
                &product,
                TransactionEvent::broadcast(product.clone(), TransactionOutcome::Success),
            );
            black_box(rx)
        })
    });

    for size in [10usize, 100, 1000] {
        let products: Vec<ProductId> = (0..size)
            .map(|i| ProductId::from(format!("donation.{}", i)))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("reject_all", size), &products, |b, products| {
            b.iter(|| {
                let receivers: Vec<_> = products
                    .iter()
                    .map(|p| {
                        let request = PurchaseRequest::new(p.clone(), None, Utc::now());
                        registry.register(&request, None)
                    })
                    .collect();
                black_box(registry.reject_all(TransactionOutcome::UserCancelled));
                receivers
            })
        });
    }

    group.finish();
}

fn bench_fallback_purchase(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");

    let store = Arc::new(MockNativeStore::with_products(&["tier.gold"]));
    let service = BillingService::new(
        BillingConfig::default(),
        BillingDependencies {
            primary: None,
            native: Some(store.clone()),
            profiles: Arc::new(InMemoryProfileStore::new()),
            clock: Arc::new(SystemClock),
        },
    )
    .expect("billing service");
    let product = ProductId::from("tier.gold");

    let mut group = c.benchmark_group("sw-01-fallback");
    let mut tx = 0u64;
    group.bench_function("purchase_matched_by_listener", |b| {
        b.to_async(&runtime).iter(|| {
            tx += 1;
            store.respond_to_next_purchase(PurchaseUpdate::ok(vec![StoreTransaction::new(
                "tier.gold",
                format!("t{}", tx),
            )]));
            let service = &service;
            let product = &product;
            async move { black_box(service.purchase_product(product, None).await) }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_registry, bench_fallback_purchase);
criterion_main!(benches);
