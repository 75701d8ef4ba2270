//! Line-oriented front-end: one integer per line in, one result per line out.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use spindle_core::{Handler, Worker};

/// Input that ends the session besides EOF or any other non-integer line.
pub const QUIT: &str = "QUIT";

/// Parse one input line as a 32-bit integer. `None` means the session is
/// over, which includes values outside the `i32` range.
pub fn parse_command(line: &str) -> Option<i32> {
    let line = line.trim().to_uppercase();
    if line == QUIT {
        return None;
    }
    line.parse().ok()
}

/// Feed `input` to `worker` until end of input, writing each result to
/// `output`. Each request is awaited before the next line is read.
///
/// Returns how many requests were submitted. Stopping the worker is left to
/// the caller.
pub async fn run<R, W, H>(input: R, output: &mut W, worker: &Worker<H>) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler<Input = i32, Output = i32>,
{
    let mut lines = input.lines();
    let mut submitted = 0;

    while let Some(line) = lines.next_line().await? {
        let Some(value) = parse_command(&line) else {
            tracing::debug!(line = %line, "end of input");
            break;
        };

        let ticket = worker.submit(value).await?;
        submitted += 1;

        let rendered = match ticket.wait().await {
            Ok(result) => format!("{result}\n"),
            Err(err) => format!("error: {err}\n"),
        };
        output.write_all(rendered.as_bytes()).await?;
        output.flush().await?;
    }

    Ok(submitted)
}
