mod config;
mod console;
mod logging;
mod operation;

use std::future::Future;

use clap::Parser;
use spindle_core::{SpindleError, Worker, WorkerStats};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use config::{CliArgs, CliConfig};
use operation::Arithmetic;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    logging::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        serve(&config, stdin, &mut stdout, signal::ctrl_c()).await
    });
    // stdin の read は blocking thread 上で続いているので待たずに捨てる
    // （drop だと Ctrl+C の後も次の改行まで終了しない）
    runtime.shutdown_background();

    let stats = result?;
    tracing::info!(stats = %serde_json::to_string(&stats)?, "shutdown complete");
    Ok(())
}

/// Run one console session: start the worker, feed it `input` until end of
/// input or `interrupt`, then stop it exactly once.
async fn serve<R, W, S>(
    config: &CliConfig,
    input: R,
    output: &mut W,
    interrupt: S,
) -> anyhow::Result<WorkerStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = std::io::Result<()>>,
{
    tracing::info!(
        capacity = config.worker.capacity,
        policy = ?config.worker.drain_policy,
        operation = ?config.operation,
        "starting console worker"
    );

    let worker = Worker::from_config(Arithmetic::new(config.operation), &config.worker)?;
    let cancel = CancellationToken::new();
    worker.start(cancel.clone())?;

    tokio::select! {
        result = console::run(input, output, &worker) => {
            let submitted = result?;
            tracing::info!(submitted, "input finished");
        }
        result = interrupt => {
            result?;
            tracing::info!("received Ctrl+C");
        }
    }

    // 入力が終わったら一度だけ stop する
    match worker.stop(config.worker.stop_timeout()).await {
        Ok(()) => {}
        Err(SpindleError::ShutdownTimedOut) => {
            tracing::warn!("worker still busy after stop timeout, cancelling");
            cancel.cancel();
        }
        Err(err) => return Err(err.into()),
    }

    Ok(worker.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use spindle_core::{WorkerConfig, WorkerState};
    use std::time::Duration;
    use tokio::time::timeout;

    fn config(operation: Operation) -> CliConfig {
        CliConfig {
            worker: WorkerConfig {
                capacity: 1,
                ..WorkerConfig::default()
            },
            operation,
        }
    }

    #[tokio::test]
    async fn session_ends_at_end_of_input() {
        let mut output = Vec::new();
        let stats = serve(
            &config(Operation::Double),
            &b"3\n4\n5\n"[..],
            &mut output,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "6\n8\n10\n");
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.state, WorkerState::Stopped);
    }

    #[tokio::test]
    async fn interrupt_ends_session_while_input_is_silent() {
        // 書き込み側を保持したままなので read は永遠に返らない
        let (_keep_open, input) = tokio::io::duplex(64);
        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };

        let mut output = Vec::new();
        let stats = timeout(
            Duration::from_secs(1),
            serve(
                &config(Operation::Passthrough),
                BufReader::new(input),
                &mut output,
                interrupt,
            ),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(output.is_empty());
        assert_eq!(stats.state, WorkerState::Stopped);
    }

    #[test]
    fn background_shutdown_does_not_wait_for_blocking_reads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        // 終わらない stdin read の代わり
        runtime.spawn_blocking(move || {
            let _ = blocked.recv();
        });

        let started = std::time::Instant::now();
        runtime.shutdown_background();
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(release);
    }
}
