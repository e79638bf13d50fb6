use std::{future::Future, io, net::SocketAddr, time::Duration};

use tracing::warn;

const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Waits for the next connection. Accept errors such as running out of
/// file descriptors are transient, so they are logged and retried after a
/// short pause instead of stopping the listener.
pub async fn next_connection<S, F, Fut>(mut accept: F) -> (S, SocketAddr)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<(S, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!("can't accept connection: {e}");
                tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
            }
        }
    }
}
