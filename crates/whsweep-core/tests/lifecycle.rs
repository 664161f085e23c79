//! Warehouse state machine against the in-memory provisioning API.

mod common;

use common::{config, Harness, FakeWorkload};
use whsweep_api::{ApiError, WarehouseState, WarehouseType};
use whsweep_core::{ComputeType, LifecycleState, WarehouseSize};

#[tokio::test]
async fn acquire_then_release_leaves_nothing_live() {
    let h = Harness::new(FakeWorkload::new(0));
    h.warehouses.inner.lock().unwrap().startup_polls = 3;
    let lifecycle = h.lifecycle();
    let cfg = config(WarehouseSize::Small, ComputeType::Pro, 8);

    let handle = lifecycle.acquire(&cfg).await.unwrap();
    assert_eq!(handle.state, LifecycleState::Active);
    assert_eq!(handle.resource_name, "tpcdi-pro-small-8-1");
    assert_eq!(
        h.warehouses.state_of(&handle.resource_id),
        Some(WarehouseState::Running)
    );
    assert!(h.warehouses.count("get:") >= 4, "readiness must be polled");

    lifecycle.release(&handle).await.unwrap();
    assert!(h.warehouses.live().is_empty());
}

#[tokio::test]
async fn serverless_is_requested_as_pro_with_flag() {
    let h = Harness::new(FakeWorkload::new(0));
    let cfg = config(WarehouseSize::Medium, ComputeType::Serverless, 8);
    let handle = h.lifecycle().acquire(&cfg).await.unwrap();
    assert!(handle.serverless);

    let request = h.warehouses.inner.lock().unwrap().last_create.clone().unwrap();
    assert_eq!(request.warehouse_type, WarehouseType::Pro);
    assert!(request.enable_serverless_compute);
    assert_eq!(request.max_num_clusters, 1);
    assert_eq!(request.auto_stop_mins, 10);
    assert_eq!(request.cluster_size, "Medium");
}

#[tokio::test]
async fn name_conflict_restarts_existing_stopped_warehouse() {
    let h = Harness::new(FakeWorkload::new(0));
    h.warehouses
        .seed("leftover", "tpcdi-serverless-small-8-1", WarehouseState::Stopped);
    let cfg = config(WarehouseSize::Small, ComputeType::Serverless, 8);

    let handle = h.lifecycle().acquire(&cfg).await.unwrap();
    assert_eq!(handle.resource_id, "leftover");
    assert_eq!(handle.state, LifecycleState::Active);
    assert_eq!(h.warehouses.state_of("leftover"), Some(WarehouseState::Running));
    assert_eq!(h.warehouses.count("start:leftover"), 1);
    assert_eq!(h.warehouses.live().len(), 1, "no second warehouse may carry the name");
}

#[tokio::test]
async fn name_conflict_with_running_warehouse_stops_then_starts() {
    let h = Harness::new(FakeWorkload::new(0));
    h.warehouses
        .seed("busy", "tpcdi-pro-small-8-1", WarehouseState::Running);
    let cfg = config(WarehouseSize::Small, ComputeType::Pro, 8);

    let handle = h.lifecycle().acquire(&cfg).await.unwrap();
    assert_eq!(handle.resource_id, "busy");
    let calls = h.warehouses.calls();
    let stop = calls.iter().position(|c| c == "stop:busy").unwrap();
    let start = calls.iter().position(|c| c == "start:busy").unwrap();
    assert!(stop < start);
}

#[tokio::test]
async fn other_create_failures_are_provisioning_errors() {
    let h = Harness::new(FakeWorkload::new(0));
    h.warehouses.inner.lock().unwrap().create_error = Some(|| ApiError::Rejected {
        status: 400,
        error_code: "INVALID_PARAMETER_VALUE".into(),
        message: "quota exceeded".into(),
    });
    let cfg = config(WarehouseSize::Small, ComputeType::Pro, 8);

    let err = h.lifecycle().acquire(&cfg).await.unwrap_err();
    assert_eq!(err.resource_name, "tpcdi-pro-small-8-1");
    assert!(err.resource_id.is_none());
    assert!(err.source.is_some());
    assert_eq!(h.warehouses.count("list"), 0, "no recovery for non-conflict errors");
}

#[tokio::test]
async fn readiness_timeout_keeps_assigned_id() {
    let h = Harness::new(FakeWorkload::new(0));
    h.warehouses.inner.lock().unwrap().startup_polls = 1_000_000;
    let cfg = config(WarehouseSize::Small, ComputeType::Classic, 8);

    let err = h.lifecycle().acquire(&cfg).await.unwrap_err();
    assert_eq!(err.resource_id.as_deref(), Some("wh0001"));
    assert!(err.reason.contains("Running"), "{}", err.reason);
}

#[tokio::test]
async fn release_is_idempotent() {
    let h = Harness::new(FakeWorkload::new(0));
    let lifecycle = h.lifecycle();
    let handle = lifecycle
        .acquire(&config(WarehouseSize::Small, ComputeType::Pro, 8))
        .await
        .unwrap();

    lifecycle.release(&handle).await.unwrap();
    lifecycle.release(&handle).await.unwrap();
    lifecycle.release_id("never-created", "nope").await.unwrap();
    assert!(h.warehouses.live().is_empty());
}
