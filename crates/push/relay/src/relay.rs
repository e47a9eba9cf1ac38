//! Line-delimited JSON bridge between stdio and a pusher.

use color_eyre::eyre::WrapErr as _;
use push_core::Message;
use push_engine::Pusher;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Counts reported when the relay finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub queued: usize,
    pub skipped: usize,
    pub responses: usize,
}

/// Queue every message read from `input` and write each response to `output`.
///
/// The pusher is dropped at end of input, so this returns once every
/// in-flight message has produced its response.
pub async fn run<P, R, W>(pusher: P, input: R, output: &mut W) -> color_eyre::eyre::Result<Summary>
where
    P: Pusher,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let listener = pusher.listen();

    let read = async move {
        let mut lines = input.lines();
        let (mut queued, mut skipped) = (0, 0);

        while let Some(line) = lines.next_line().await.wrap_err("failed to read input")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) => {
                    pusher.queue(message).await;
                    queued += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed message");
                    skipped += 1;
                }
            }
        }

        drop(pusher);
        color_eyre::eyre::Ok((queued, skipped))
    };

    let write = async {
        let mut responses = 0;
        while let Some(response) = listener.recv().await {
            let mut line =
                serde_json::to_vec(&response).wrap_err("failed to encode response")?;
            line.push(b'\n');
            output
                .write_all(&line)
                .await
                .wrap_err("failed to write response")?;
            output.flush().await.wrap_err("failed to flush output")?;
            responses += 1;
        }
        color_eyre::eyre::Ok(responses)
    };

    let (read, write) = tokio::join!(read, write);
    let (queued, skipped) = read?;
    let responses = write?;

    Ok(Summary {
        queued,
        skipped,
        responses,
    })
}
