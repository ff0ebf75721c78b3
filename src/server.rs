//! TCP accept loop and graceful shutdown.
//!
//! Each accepted connection runs on its own task under a `conn` span, and
//! every request on it goes through [`Router::dispatch`]. Once the shutdown
//! future resolves the listener is dropped and open connections are drained,
//! so request spans still in flight finish and reach their exporter.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, debug_span, error, info};

use crate::error::Error;
use crate::router::Router;

/// Serves a [`Router`] over HTTP/1 and HTTP/2.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Parses the address to listen on. Nothing is bound until
    /// [`serve`](Server::serve).
    ///
    /// ```rust
    /// use tsu_trace::Server;
    /// assert!(Server::bind("0.0.0.0:3000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self { addr: addr.parse()? })
    }

    /// Serves until SIGTERM or Ctrl-C, then drains open connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains open connections.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "listening");

        let router = Arc::new(router);
        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = &mut signal => {
                    info!(open = connections.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn = serve_connection(Arc::clone(&router), stream, peer);
                        connections.spawn(conn.instrument(debug_span!("conn", %peer)));
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        while connections.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(router: Arc<Router>, stream: TcpStream, peer: SocketAddr) {
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(router.dispatch(req, peer).await) }
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        debug!(error = %e, "connection closed with error");
    }
}

/// Resolves on the first SIGTERM or SIGINT; on Windows only Ctrl-C.
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
