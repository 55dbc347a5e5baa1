//! Minimal line client for `--join` mode.

use crate::error::{AppError, AppResult};
use crate::relay::message_types::STOP_SENTINEL;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Copy `input` lines to the relay and everything the relay sends to `output`.
///
/// When `input` reaches EOF the client sends `STOP` and keeps printing until
/// the relay closes the connection. Returns `output` so callers can inspect it.
pub async fn pump<I, O, S>(input: I, output: O, stream: S) -> AppResult<O>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut relay_rx, mut relay_tx) = tokio::io::split(stream);

    let printer = tokio::spawn(async move {
        let mut output = output;
        tokio::io::copy(&mut relay_rx, &mut output).await?;
        output.flush().await?;
        Ok::<_, std::io::Error>(output)
    });

    let mut lines = BufReader::new(input).lines();
    let mut stopped = false;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::TransportRead(format!("stdin: {e}")))?
    {
        relay_tx
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| AppError::TransportWrite(e.to_string()))?;
        if line.trim() == STOP_SENTINEL {
            stopped = true;
            break;
        }
    }
    if !stopped {
        // best effort: the relay may already be gone
        let _ = relay_tx
            .write_all(format!("{STOP_SENTINEL}\n").as_bytes())
            .await;
    }

    printer
        .await
        .map_err(|e| AppError::TransportRead(format!("printer task: {e}")))?
        .map_err(|e| AppError::TransportRead(e.to_string()))
}

/// Connect to `addr` and bridge it to stdin/stdout
pub async fn run(addr: &str) -> AppResult<()> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| AppError::StartServer(format!("connect {addr}: {e}")))?;
    tracing::info!(%addr, "connected to relay");

    pump(tokio::io::stdin(), tokio::io::stdout(), stream).await?;
    Ok(())
}
