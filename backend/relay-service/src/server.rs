use crate::{
    config::Config,
    error::{AppError, AppResult},
    relay::session::run_session,
    state::AppState,
};
use std::future::Future;
use tokio::net::TcpListener;

pub async fn bind(config: &Config) -> AppResult<TcpListener> {
    let bind_addr = config.bind_addr();
    TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))
}

/// Accept connections and run one session task per connection.
///
/// Returns when `shutdown` resolves, or with an error if `accept` fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => {
                accepted.map_err(|e| AppError::StartServer(format!("accept: {e}")))?
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_session(state, socket, peer.to_string()).await {
                tracing::warn!(%peer, error = %e, "connection dropped");
            }
        });
    }
}

/// Bind the configured address and serve until Ctrl-C
pub async fn run(config: Config) -> AppResult<()> {
    let state = AppState::new(config)?;
    let listener = bind(&state.config).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| AppError::StartServer(format!("local_addr: {e}")))?;
    tracing::info!(
        %local_addr,
        key_bits = state.config.key_bits,
        idle_timeout = ?state.config.idle_timeout,
        "relay listening"
    );

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await
}
