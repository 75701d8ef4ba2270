//! spindle-core
//!
//! Bounded, single-consumer work processing for in-process producers.
//!
//! # モジュール構成
//! - **request**: Request / Completion / Ticket（1 件ごとの結果受け渡し）
//! - **queue**: 容量制限付き FIFO（満杯なら enqueue が待つ）
//! - **worker**: start / stop のライフサイクルと消費ループ
//! - **handler**: ワーカーに差し込む計算
//! - **domain**: RequestId, WorkerState
//! - **config**: WorkerConfig, DrainPolicy
//! - **stats**: ワーカーのカウンタ
//! - **error**: エラー型
//!
//! # 例
//! ```ignore
//! let worker = Worker::from_config(handler_fn(|x: i64| Ok(x * 2)), &WorkerConfig::default())?;
//! worker.start(CancellationToken::new())?;
//! let ticket = worker.submit(21).await?;
//! assert_eq!(ticket.wait().await?, 42);
//! worker.stop(Duration::from_secs(5)).await?;
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod queue;
pub mod request;
pub mod stats;
pub mod worker;

pub use config::{DrainPolicy, WorkerConfig};
pub use domain::{RequestId, WorkerState};
pub use error::{HandlerError, SpindleError};
pub use handler::{FnHandler, Handler, Passthrough, handler_fn};
pub use queue::WorkQueue;
pub use request::{Completion, Outcome, Request, Ticket};
pub use stats::WorkerStats;
pub use worker::{WorkRequest, Worker};
