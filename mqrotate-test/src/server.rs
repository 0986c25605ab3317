//! In-process test server management

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// An axum router served on a random local port
pub struct TestServer {
    /// Serving task
    handle: JoinHandle<()>,
    /// Base URL
    base_url: String,
}

impl TestServer {
    /// Bind `127.0.0.1:0` and serve `router` until dropped
    pub async fn start(router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Test server stopped");
            }
        });

        info!(addr = %addr, "Test server listening");
        Ok(Self { handle, base_url })
    }

    /// Get the base URL
    pub fn url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
