/// Resolves with the signal number once SIGTERM, SIGINT or SIGHUP arrives.
///
/// As PID 1 in a container the default dispositions do not terminate the
/// process, so the entrypoint has to relay the signal and exit on its own.
#[cfg(unix)]
pub async fn shutdown_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int, mut hup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(term), Ok(int), Ok(hup)) => (term, int, hup),
        _ => {
            tracing::warn!("Could not install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = term.recv() => libc::SIGTERM,
        _ = int.recv() => libc::SIGINT,
        _ = hup.recv() => libc::SIGHUP,
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> i32 {
    match tokio::signal::ctrl_c().await {
        Ok(()) => 2,
        Err(_) => std::future::pending().await,
    }
}
