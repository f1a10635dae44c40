//! # sealed-compute
//!
//! Client SDK for confidential computation tasks. A task is encrypted on the
//! client, submitted through a ledger, executed off-chain by a secure worker,
//! and its encrypted, signed result fetched back and decrypted locally.
//!
//! ## Lifecycle
//!
//! ```text
//! TaskBuilder ─► Ledger::submit ─► StatusPoller ─► ResultFetcher ─► decryptor
//!  (encrypt)                        (until terminal)  (verify sig)    (open)
//! ```
//!
//! Each stage is a plain async call on [`SealedComputeClient`]; the whole
//! sequence can also run as one spawned, cancellable task with typed progress
//! events via [`SealedComputeClient::run_task`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sealed_compute::ledger::InMemoryLedger;
//! use sealed_compute::types::{to_grains, Address};
//! use sealed_compute::{ClientConfig, SealedComputeClient, TaskEvent, TaskRequest};
//! use serde_json::json;
//!
//! # async fn example() -> sealed_compute::Result<()> {
//! let config = ClientConfig::new().with_worker_url("http://localhost:3346");
//! let ledger = Arc::new(InMemoryLedger::new());
//! let client = SealedComputeClient::over_http(config, ledger)?;
//!
//! let request = TaskRequest::new("add(uint256,uint256)", Address::repeat_byte(1), Address::repeat_byte(2))
//!     .with_arg(json!(24), "uint256")
//!     .with_arg(json!(67), "uint256")
//!     .with_gas_price(to_grains(1));
//!
//! let mut lifecycle = client.run_task(request);
//! while let Some(event) = lifecycle.next_event().await {
//!     println!("{event:?}");
//!     if event.is_final() {
//!         break;
//!     }
//! }
//! let result = lifecycle.outcome().await?;
//! println!("{:?}", result.outcome());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`crypto`] - Key agreement, AES-256-GCM, recoverable signatures
//! - [`abi`] - Function signatures and argument encoding
//! - [`builder`] - Encrypted task construction
//! - [`ledger`] - Ledger boundary and in-memory ledger
//! - [`poller`] - Status polling with cancellation
//! - [`worker`] - Worker Service boundary and JSON-RPC client
//! - [`fetcher`] - Result fetching with retry and signature verification
//! - [`decryptor`] - Result decryption
//! - [`lifecycle`] - Spawned end-to-end lifecycle and its events
//! - [`client`] - Caller-facing client
//! - [`config`] - Client configuration
//! - `logging` - Subscriber setup (feature `logging`)

pub mod abi;
pub mod builder;
pub mod client;
pub mod config;
pub mod crypto;
pub mod decryptor;
pub mod fetcher;
pub mod ledger;
pub mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
pub mod poller;
pub mod worker;

/// Wire and domain types shared with other sealed-compute crates.
pub use sealed_compute_types as types;

pub use sealed_compute_types::{Result, TaskError};

pub use abi::TaskArg;
pub use builder::{PendingTask, TaskBuilder, WorkerKey};
pub use client::{SealedComputeClient, TaskRequest};
pub use config::{Backoff, ClientConfig, PollConfig, RetryConfig};
pub use crypto::{KeyPair, SymmetricKey};
pub use fetcher::ResultFetcher;
pub use ledger::{InMemoryLedger, Ledger};
pub use lifecycle::{TaskEvent, TaskLifecycle};
pub use poller::{PollHandle, StatusPoller};
pub use worker::{WorkerEncryptionKey, WorkerResult, WorkerService};

#[cfg(feature = "http-client")]
pub use worker::HttpWorkerService;
