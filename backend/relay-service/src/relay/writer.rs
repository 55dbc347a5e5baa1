use super::UserId;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::Receiver;

/// Drain a session's outbound queue into its transport.
///
/// Runs until every sender is dropped (session closed and registry entry
/// removed), a write fails, or a write makes no progress within
/// `write_timeout`. In the last two cases the queue is dropped, so further
/// enqueues from the router fail and that recipient gets skipped.
pub async fn run_writer<W>(
    mut transport: W,
    mut queue: Receiver<String>,
    user_id: UserId,
    write_timeout: Option<Duration>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = queue.recv().await {
        let write = async {
            transport.write_all(line.as_bytes()).await?;
            transport.flush().await
        };
        let written = match write_timeout {
            Some(limit) => match tokio::time::timeout(limit, write).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(user_id = %user_id, ?limit, "peer stopped reading, stopping writer");
                    queue.close();
                    return;
                }
            },
            None => write.await,
        };

        if let Err(e) = written {
            tracing::warn!(user_id = %user_id, error = %e, "transport write failed, stopping writer");
            queue.close();
            return;
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(user_id = %user_id, error = %e, "transport shutdown failed");
    }
    tracing::debug!(user_id = %user_id, "writer finished");
}
