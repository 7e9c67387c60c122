//! Loopback fixture server for smoke tests.
//!
//! Serves a directory of test pages on `127.0.0.1` at an ephemeral port so
//! a smoke run can load a known page without reaching the network. The
//! server runs on its own tokio runtime in a background thread and stops
//! when dropped.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// A running fixture server.
pub struct FixtureServer {
    root: PathBuf,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FixtureServer {
    /// Serve `root` on an ephemeral loopback port.
    pub fn start(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("fixture directory not found: {}", root.display());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("quay-serve")
            .enable_all()
            .build()
            .context("failed to start fixture server runtime")?;

        let listener = runtime
            .block_on(TcpListener::bind(("127.0.0.1", 0)))
            .context("failed to bind fixture server")?;
        let addr = listener
            .local_addr()
            .context("failed to read fixture server address")?;

        let app = Router::new()
            .fallback_service(ServeDir::new(root))
            .layer(TraceLayer::new_for_http());

        let (tx, rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name("quay-serve".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let shutdown = async {
                        let _ = rx.await;
                    };
                    if let Err(e) = axum::serve(listener, app)
                        .with_graceful_shutdown(shutdown)
                        .await
                    {
                        tracing::warn!("Fixture server stopped: {}", e);
                    }
                });
            })
            .context("failed to spawn fixture server thread")?;

        tracing::info!("Serving {} at http://{}/", root.display(), addr);

        Ok(FixtureServer {
            root: root.to_path_buf(),
            addr,
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL of `page` on this server.
    pub fn url(&self, page: &str) -> String {
        format!("http://{}/{}", self.addr, page.trim_start_matches('/'))
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::debug!("Fixture server at {} stopped", self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    use tempfile::TempDir;

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_serves_pages_on_loopback() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("index.html"),
            "<html><head><title>Fixture Page</title></head></html>",
        )
        .unwrap();

        let server = FixtureServer::start(tmp.path()).unwrap();
        assert!(server.addr().ip().is_loopback());
        assert_ne!(server.addr().port(), 0);
        assert_eq!(
            server.url("/index.html"),
            format!("http://{}/index.html", server.addr())
        );

        let response = get(server.addr(), "/index.html");
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains("<title>Fixture Page</title>"));

        let response = get(server.addr(), "/missing.html");
        assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
    }

    #[test]
    fn test_stops_on_drop() {
        let tmp = TempDir::new().unwrap();
        let server = FixtureServer::start(tmp.path()).unwrap();
        let addr = server.addr();
        drop(server);
        assert!(TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = FixtureServer::start(&tmp.path().join("www")).err().unwrap();
        assert!(err.to_string().contains("fixture directory not found"));
    }
}
