use anyhow::Result;
use tokio::signal;

/// Resolves once the process receives Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    let ctrl_c = async {
        signal::ctrl_c().await?;
        Ok::<_, std::io::Error>("Ctrl+C")
    };

    let received = tokio::select! {
        r = ctrl_c => r,
        r = terminate => r,
    };

    match received {
        Ok(name) => {
            tracing::info!(signal = name, "shutdown signal received, stopping application");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%e, "failed to install signal handler");
            Err(e.into())
        }
    }
}
