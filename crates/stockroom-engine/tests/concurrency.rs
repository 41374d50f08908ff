//! Concurrent callers against a file-backed database with a real pool.

mod common;

use std::collections::HashSet;

use common::{add_variant, cents, file_coordinator, units};
use stockroom_core::{HistoryEvent, Money, Quantity};
use stockroom_engine::{AddLine, CreateAggregate, EngineError, LineRequest};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_sales_for_the_last_stock_one_wins() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-x", 1000, units(5)).await;

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let coordinator = coordinator.clone();
        tasks.spawn(async move {
            coordinator
                .create(CreateAggregate::sale(
                    vec![LineRequest::new("v-x", units(5))],
                    cents(5000),
                ))
                .await
        });
    }

    let mut won = 0;
    let mut short = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::InsufficientStock { available, .. }) => {
                assert_eq!(available, Quantity::zero());
                short += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!((won, short), (1, 1));
    assert_eq!(coordinator.available("v-x").await.unwrap(), Quantity::zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_single_unit_sales_never_oversell() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-x", 100, units(10)).await;

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let coordinator = coordinator.clone();
        tasks.spawn(async move {
            coordinator
                .create(CreateAggregate::sale(
                    vec![LineRequest::new("v-x", units(1))],
                    cents(100),
                ))
                .await
        });
    }

    let mut won = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert!(
                matches!(e, EngineError::InsufficientStock { .. }),
                "unexpected error: {:?}",
                e
            ),
        }
    }

    assert_eq!(won, 10);
    assert_eq!(coordinator.available("v-x").await.unwrap(), Quantity::zero());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_variant_order_does_not_deadlock() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-a", 100, units(100)).await;
    add_variant(&coordinator, "v-b", 100, units(100)).await;

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let coordinator = coordinator.clone();
        let (first, second) = if i % 2 == 0 { ("v-a", "v-b") } else { ("v-b", "v-a") };
        tasks.spawn(async move {
            coordinator
                .create(CreateAggregate::sale(
                    vec![
                        LineRequest::new(first, units(1)),
                        LineRequest::new(second, units(1)),
                    ],
                    cents(200),
                ))
                .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(coordinator.available("v-a").await.unwrap(), units(80));
    assert_eq!(coordinator.available("v-b").await.unwrap(), units(80));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_release_once() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-x", 1000, units(5)).await;

    let sale = coordinator
        .create(CreateAggregate::sale(
            vec![LineRequest::new("v-x", units(3))],
            cents(3000),
        ))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let id = sale.id.clone();
        tasks.spawn(async move { coordinator.cancel(&id).await });
    }

    while let Some(joined) = tasks.join_next().await {
        let cancelled = joined.unwrap().unwrap();
        assert!(cancelled.is_cancelled());
    }

    assert_eq!(coordinator.available("v-x").await.unwrap(), units(5));
    let cancels = coordinator
        .history(&sale.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event == HistoryEvent::Cancelled)
        .count();
    assert_eq!(cancels, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_lines_all_land() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-base", 100, units(10)).await;
    for i in 0..4 {
        add_variant(&coordinator, &format!("v-extra-{}", i), 100, units(10)).await;
    }

    let order = coordinator
        .create(CreateAggregate::order(
            "CUST-1",
            vec![LineRequest::new("v-base", units(1))],
            cents(100),
        ))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..4 {
        let coordinator = coordinator.clone();
        let id = order.id.clone();
        tasks.spawn(async move {
            coordinator
                .add_line(AddLine::new(id, format!("v-extra-{}", i), units(2)))
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let stored = coordinator.get(&order.id).await.unwrap();
    assert_eq!(stored.lines.len(), 5);
    assert_eq!(stored.version, order.version + 4);
    assert_eq!(stored.total, cents(900));

    let positions: HashSet<i64> = stored.lines.iter().map(|l| l.position).collect();
    assert_eq!(positions.len(), 5);

    for i in 0..4 {
        assert_eq!(
            coordinator.available(&format!("v-extra-{}", i)).await.unwrap(),
            units(8)
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_sales_keeps_stock_conserved() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-x", 100, units(25)).await;

    let mut sales = Vec::new();
    for _ in 0..5 {
        let sale = coordinator
            .create(CreateAggregate::sale(
                vec![LineRequest::new("v-x", units(2))],
                cents(200),
            ))
            .await
            .unwrap();
        sales.push(sale.id);
    }

    let mut tasks = JoinSet::new();
    for id in sales.clone() {
        let coordinator = coordinator.clone();
        tasks.spawn(async move { coordinator.cancel(&id).await.map(|_| ()) });
    }
    for _ in 0..5 {
        let coordinator = coordinator.clone();
        tasks.spawn(async move {
            coordinator
                .create(CreateAggregate::sale(
                    vec![LineRequest::new("v-x", units(3))],
                    cents(300),
                ))
                .await
                .map(|_| ())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    // Only the second wave still holds stock
    assert_eq!(coordinator.available("v-x").await.unwrap(), units(10));
    for id in sales {
        assert!(coordinator.get(&id).await.unwrap().is_cancelled());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_never_see_a_half_applied_aggregate() {
    let (_dir, coordinator) = file_coordinator().await;
    add_variant(&coordinator, "v-base", 1000, units(10)).await;
    add_variant(&coordinator, "v-churn", 1000, units(10)).await;

    let order = coordinator
        .create(CreateAggregate::order(
            "CUST-1",
            vec![LineRequest::new("v-base", units(1))],
            cents(1000),
        ))
        .await
        .unwrap();

    let writer = {
        let coordinator = coordinator.clone();
        let id = order.id.clone();
        tokio::spawn(async move {
            for _ in 0..60 {
                let grown = coordinator
                    .add_line(AddLine::new(&id, "v-churn", units(1)))
                    .await
                    .unwrap();
                let added = grown.lines[grown.lines.len() - 1].id.clone();
                coordinator.remove_line(&id, &added).await.unwrap();
            }
        })
    };

    let mut reads = 0;
    loop {
        let done = writer.is_finished();
        let seen = coordinator.get(&order.id).await.unwrap();
        let sum: Money = seen.lines.iter().map(|l| l.line_total).sum();
        assert_eq!(
            seen.total, sum,
            "version {} has {} lines",
            seen.version,
            seen.lines.len()
        );
        // Odd versions carry the churn line, even ones do not
        assert_eq!(seen.lines.len() as i64, 1 + (seen.version - order.version) % 2);
        reads += 1;
        if done {
            break;
        }
    }
    writer.await.unwrap();

    assert!(reads > 0);
    let settled = coordinator.get(&order.id).await.unwrap();
    assert_eq!(settled.lines.len(), 1);
    assert_eq!(settled.total, cents(1000));
    assert_eq!(coordinator.available("v-churn").await.unwrap(), units(10));
}
