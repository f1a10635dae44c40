//! End-to-end task lifecycle tests against the simulated worker network.
//!
//! Covers compute -> poll -> fetch -> decrypt through the individual client
//! calls, the spawned `run_task` lifecycle with its event stream, and the
//! failure paths in between.

mod common;

use std::time::{Duration, Instant};

use common::{Network, CONTRACT, GAS_PER_CALL, SENDER};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sealed_compute::abi::{self, AbiType, TaskArg};
use sealed_compute::types::{to_grains, EngStatus, EthStatus, StatusCodes, TaskError};
use sealed_compute::{KeyPair, Ledger, ResultFetcher, RetryConfig, TaskEvent, TaskRequest};

/// Retry settings whose backoff outlasts any test.
fn slow_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        base_delay_ms: 30_000,
        max_delay_ms: 60_000,
    }
}

/// Waits until the worker has seen at least `calls` result requests.
async fn wait_for_result_calls(net: &Network, calls: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while net.worker.result_calls() < calls {
        assert!(Instant::now() < deadline, "worker never received a result request");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn add_args() -> Vec<TaskArg> {
    vec![
        TaskArg::new(json!(24), "uint256"),
        TaskArg::new(json!(67), "uint256"),
    ]
}

fn add_request(gas_limit: u64) -> TaskRequest {
    TaskRequest::new("add(uint256,uint256)", CONTRACT, SENDER)
        .with_arg(json!(24), "uint256")
        .with_arg(json!(67), "uint256")
        .with_gas_limit(gas_limit)
        .with_gas_price(to_grains(1))
}

#[tokio::test]
async fn add_with_one_gas_fails_with_error_message() {
    let net = Network::new();
    let executor = net.worker.spawn_executor();

    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 1, to_grains(1), SENDER, CONTRACT)
        .await
        .unwrap();
    let descriptor = task.descriptor();

    let record = net
        .client
        .await_task_record(descriptor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.eth_status, EthStatus::Failed);

    let raw = net.ledger.read_record(&descriptor.task_id).await.unwrap();
    assert_eq!(raw.eth_status, 3);

    let result = net.client.get_task_result(descriptor).await.unwrap();
    assert_eq!(result.eng_status, EngStatus::Failed);
    assert!(!result.is_decrypted());

    let result = net.client.decrypt_task_result(&task, result).unwrap();
    let message = result.error_message().unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("out of gas"), "unexpected message: {message}");

    executor.cancel();
}

#[tokio::test]
async fn add_with_enough_gas_returns_the_sum() {
    let net = Network::new();
    let executor = net.worker.spawn_executor();

    let task = net
        .client
        .compute_task(
            "add(uint,uint)",
            &add_args(),
            GAS_PER_CALL * 2,
            to_grains(1),
            SENDER,
            CONTRACT,
        )
        .await
        .unwrap();

    let record = net
        .client
        .await_task_record(task.descriptor(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.eth_status, EthStatus::ReceiptVerified);

    let result = net.client.get_task_result(task.descriptor()).await.unwrap();
    let result = net.client.decrypt_task_result(&task, result).unwrap();
    assert_eq!(result.eng_status, EngStatus::Success);

    let output = result.decrypted_output.unwrap();
    assert_eq!(
        abi::decode(&[AbiType::Uint(256)], &output).unwrap(),
        vec![json!(91)]
    );

    executor.cancel();
}

#[tokio::test]
async fn submission_charges_the_fee() {
    let net = Network::new();
    let before = net.ledger.balance(&SENDER);
    net.client
        .compute_task("add(uint256,uint256)", &add_args(), 3, to_grains(1), SENDER, CONTRACT)
        .await
        .unwrap();
    assert_eq!(before - net.ledger.balance(&SENDER), to_grains(3));
}

#[tokio::test]
async fn result_is_not_fetched_before_terminal() {
    let net = Network::new();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();

    let status = net.client.get_task_record_status(task.descriptor()).await.unwrap();
    assert_eq!(status.eth_status, EthStatus::RecordCreated);

    let err = net.client.get_task_result(task.descriptor()).await.unwrap_err();
    assert_eq!(
        err,
        TaskError::NotReady {
            task_id: task.task_id(),
            current_status: EthStatus::RecordCreated,
        }
    );
    assert_eq!(net.worker.result_calls(), 0);
}

#[tokio::test]
async fn transport_failures_are_retried() {
    let net = Network::new();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();
    net.worker.execute(task.descriptor()).await.unwrap();

    net.worker.fail_next(2);
    let result = net.client.get_task_result(task.descriptor()).await.unwrap();
    assert_eq!(result.eng_status, EngStatus::Success);
    assert_eq!(net.worker.result_calls(), 3);
}

#[tokio::test]
async fn transport_failures_surface_after_max_attempts() {
    let net = Network::new();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();
    net.worker.execute(task.descriptor()).await.unwrap();

    net.worker.fail_next(10);
    let err = net.client.get_task_result(task.descriptor()).await.unwrap_err();
    match err {
        TaskError::Transport {
            task_id, attempts, ..
        } => {
            assert_eq!(task_id, Some(task.task_id()));
            assert_eq!(attempts, 3);
        },
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(net.worker.result_calls(), 3);
}

#[tokio::test]
async fn forged_signature_is_rejected_without_retry() {
    let net = Network::new();
    net.worker.forge_signatures();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();
    net.worker.execute(task.descriptor()).await.unwrap();

    let err = net.client.get_task_result(task.descriptor()).await.unwrap_err();
    assert!(matches!(err, TaskError::Verification { .. }), "{err:?}");
    assert_eq!(net.worker.result_calls(), 1);
}

#[tokio::test]
async fn decrypting_an_unsigned_result_is_refused() {
    let net = Network::new();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();
    net.worker.execute(task.descriptor()).await.unwrap();
    let fetched = net.client.get_task_result(task.descriptor()).await.unwrap();

    let mut unsigned = fetched.clone();
    unsigned.worker_task_sig = Vec::new();
    let err = net.client.decrypt_task_result(&task, unsigned).unwrap_err();
    assert!(matches!(err, TaskError::Verification { .. }), "{err:?}");

    let mut resigned = fetched.clone();
    resigned.worker_task_sig =
        sealed_compute::crypto::sign(KeyPair::generate().secret_key(), &resigned.signed_message());
    let err = net.client.decrypt_task_result(&task, resigned).unwrap_err();
    assert!(matches!(err, TaskError::Verification { .. }), "{err:?}");

    // The genuine result still opens.
    let opened = net.client.decrypt_task_result(&task, fetched).unwrap();
    assert!(opened.is_decrypted());
}

#[tokio::test]
async fn cancel_interrupts_retry_backoff() {
    let net = Network::new();
    let task = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap();
    net.worker.execute(task.descriptor()).await.unwrap();
    net.worker.fail_next(u32::MAX);

    let fetcher = ResultFetcher::new(
        net.ledger.clone(),
        net.worker.clone(),
        slow_retry(),
        StatusCodes::default(),
    );
    let cancel = CancellationToken::new();
    let descriptor = task.descriptor().clone();
    let fetch = {
        let cancel = cancel.clone();
        tokio::spawn(async move { fetcher.fetch_with_cancel(&descriptor, &cancel).await })
    };

    wait_for_result_calls(&net, 1).await;
    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(2), fetch)
        .await
        .expect("cancel should end the backoff sleep")
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::Cancelled {
            task_id: Some(task.task_id())
        }
    );

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(net.worker.result_calls(), 1);
}

#[tokio::test]
async fn cancelled_lifecycle_stops_retrying() {
    let net = Network::with_config(common::test_config().with_retry(slow_retry()));
    net.worker.fail_next(u32::MAX);
    let executor = net.worker.spawn_executor();

    let lifecycle = net.client.run_task(add_request(GAS_PER_CALL));
    wait_for_result_calls(&net, 1).await;
    lifecycle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(2), lifecycle.outcome())
        .await
        .expect("cancel should end the backoff sleep")
        .unwrap_err();
    assert!(matches!(err, TaskError::Cancelled { task_id: Some(_) }), "{err:?}");

    let calls = net.worker.result_calls();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(net.worker.result_calls(), calls);
    assert_eq!(calls, 1);

    executor.cancel();
}

#[tokio::test]
async fn pinned_worker_address_must_match() {
    let net = Network::with_config(
        common::test_config().with_worker_address(sealed_compute::KeyPair::generate().address()),
    );
    let err = net
        .client
        .compute_task("add(uint256,uint256)", &add_args(), 10, 1, SENDER, CONTRACT)
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Crypto(_)));
    assert_eq!(net.ledger.current_block(), 0);
}

#[tokio::test]
async fn encoding_errors_stop_before_submission() {
    let net = Network::new();
    let err = net
        .client
        .compute_task(
            "add(uint256,uint256)",
            &[TaskArg::new(json!("twenty-four"), "uint256"), TaskArg::new(json!(67), "uint256")],
            10,
            1,
            SENDER,
            CONTRACT,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Encoding { .. }));
    assert_eq!(net.ledger.current_block(), 0);
}

#[tokio::test]
async fn run_task_emits_ordered_events() {
    let net = Network::new();
    let executor = net.worker.spawn_executor();

    let mut lifecycle = net.client.run_task(add_request(GAS_PER_CALL));
    let mut events = Vec::new();
    while let Some(event) = lifecycle.next_event().await {
        let last = event.is_final();
        events.push(event);
        if last {
            break;
        }
    }

    let task_id = match &events[0] {
        TaskEvent::Submitted { task_id } => *task_id,
        other => panic!("first event should be Submitted, got {other:?}"),
    };

    let statuses: Vec<EthStatus> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::StatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.last(), Some(&EthStatus::ReceiptVerified));
    assert!(statuses.windows(2).all(|w| w[0].rank() < w[1].rank()));

    assert!(events.iter().any(|e| matches!(
        e,
        TaskEvent::ResultFetched { eng_status: EngStatus::Success, .. }
    )));
    match events.last() {
        Some(TaskEvent::Completed { result }) => assert_eq!(result.task_id, task_id),
        other => panic!("last event should be Completed, got {other:?}"),
    }

    let result = lifecycle.outcome().await.unwrap();
    assert_eq!(result.task_id, task_id);
    assert!(result.is_decrypted());

    executor.cancel();
}

#[tokio::test]
async fn run_task_reports_failed_computation_as_completed() {
    let net = Network::new();
    let executor = net.worker.spawn_executor();

    let lifecycle = net.client.run_task(add_request(1));
    let result = lifecycle.outcome().await.unwrap();
    assert_eq!(result.eng_status, EngStatus::Failed);
    assert!(result.error_message().unwrap().contains("out of gas"));

    executor.cancel();
}

#[tokio::test]
async fn run_task_without_funds_fails_before_submission() {
    let net = Network::new();
    let poor = sealed_compute::types::Address::repeat_byte(0x99);
    let request = TaskRequest::new("add(uint256,uint256)", CONTRACT, poor)
        .with_arg(json!(1), "uint256")
        .with_arg(json!(2), "uint256")
        .with_gas_price(to_grains(1));

    let mut lifecycle = net.client.run_task(request);
    match lifecycle.next_event().await {
        Some(TaskEvent::Failed {
            task_id: None,
            error: TaskError::Submission { reason },
        }) => assert!(reason.contains("insufficient balance")),
        other => panic!("expected submission failure, got {other:?}"),
    }
    assert!(matches!(
        lifecycle.outcome().await,
        Err(TaskError::Submission { .. })
    ));
}

#[tokio::test]
async fn run_task_verification_failure_follows_submission() {
    let net = Network::new();
    net.worker.forge_signatures();
    let executor = net.worker.spawn_executor();

    let mut lifecycle = net.client.run_task(add_request(GAS_PER_CALL));
    let mut events = Vec::new();
    while let Some(event) = lifecycle.next_event().await {
        let last = event.is_final();
        events.push(event);
        if last {
            break;
        }
    }

    assert!(matches!(events.first(), Some(TaskEvent::Submitted { .. })));
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Failed {
            task_id: Some(_),
            error: TaskError::Verification { .. },
        })
    ));

    executor.cancel();
}

#[tokio::test]
async fn cancelled_lifecycle_resolves_with_cancelled() {
    let net = Network::new();
    // No executor: the task never settles.
    let lifecycle = net.client.run_task(add_request(GAS_PER_CALL));
    tokio::time::sleep(Duration::from_millis(30)).await;
    lifecycle.cancel();

    let err = lifecycle.outcome().await.unwrap_err();
    assert!(matches!(err, TaskError::Cancelled { .. }), "{err:?}");
}

#[tokio::test]
async fn concurrent_tasks_complete_independently() {
    let net = Network::new();
    let executor = net.worker.spawn_executor();

    let lifecycles: Vec<_> = (0..5u64)
        .map(|i| {
            net.client.run_task(
                TaskRequest::new("add(uint256,uint256)", CONTRACT, SENDER)
                    .with_arg(json!(i), "uint256")
                    .with_arg(json!(100), "uint256")
                    .with_gas_limit(GAS_PER_CALL),
            )
        })
        .collect();

    let results = futures::future::join_all(lifecycles.into_iter().map(|l| l.outcome())).await;

    let mut ids = std::collections::HashSet::new();
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert!(ids.insert(result.task_id));
        let output = result.decrypted_output.unwrap();
        assert_eq!(
            abi::decode(&[AbiType::Uint(256)], &output).unwrap(),
            vec![json!(100 + i as u64)]
        );
    }

    executor.cancel();
}
