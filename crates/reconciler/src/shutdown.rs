//! Cooperative shutdown signal shared by the controller's tasks.

use tokio::sync::watch;

/// Create a shutdown channel. Send `true` to stop every task holding a
/// receiver.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve once shutdown was requested or the sender is gone.
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A closed channel also means stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
