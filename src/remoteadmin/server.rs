use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
    },
};
use tracing::{debug, info, warn};

use super::{
    dispatcher::CommandDispatcher,
    session::{Convention, Session},
};

/// Request paths served, one per calling convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub legacy_path: String,
    pub ws_path: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self { legacy_path: "/".to_string(), ws_path: "/ws".to_string() }
    }
}

impl Routes {
    pub fn convention_for(&self, path: &str) -> Option<Convention> {
        if path == self.ws_path {
            Some(Convention::Current)
        } else if path == self.legacy_path {
            Some(Convention::Legacy)
        } else {
            None
        }
    }
}

/// A running admin listener.
#[derive(Debug)]
pub struct AdminServer {
    addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl AdminServer {
    /// Bind `addr` (port 0 picks a free one) and start accepting sessions.
    pub async fn bind(addr: &str, routes: Routes, dispatcher: CommandDispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind admin listener on {addr}"))?;
        let addr = listener.local_addr()?;
        let (shutdown, stop) = broadcast::channel(1);
        let task = tokio::spawn(accept_loop(listener, routes, dispatcher, shutdown.clone(), stop));
        info!(%addr, "remote admin listening");
        Ok(Self { addr, shutdown, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, end open sessions and wait for the listener to exit.
    pub async fn shutdown(self) {
        if self.shutdown.send(()).is_err() {
            warn!(addr = %self.addr, "admin accept loop was already gone");
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "admin accept loop ended abnormally");
        }
        info!(addr = %self.addr, "remote admin stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    routes: Routes,
    dispatcher: CommandDispatcher,
    shutdown: broadcast::Sender<()>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        routes.clone(),
                        dispatcher.clone(),
                        shutdown.subscribe(),
                    ));
                }
                Err(e) => warn!(error = %e, "admin accept failed"),
            },
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Routes,
    dispatcher: CommandDispatcher,
    shutdown: broadcast::Receiver<()>,
) {
    let mut convention = None;
    let handshake = accept_hdr_async(stream, |req: &Request, resp: Response| {
        let path = req.uri().path();
        match routes.convention_for(path) {
            Some(found) => {
                convention = Some(found);
                Ok(resp)
            }
            None => {
                let mut refused = ErrorResponse::new(Some(format!("no admin endpoint at {path}")));
                *refused.status_mut() = StatusCode::NOT_FOUND;
                Err(refused)
            }
        }
    })
    .await;

    match (handshake, convention) {
        (Ok(ws), Some(convention)) => {
            Session::new(dispatcher, convention).run(ws, peer.to_string(), shutdown).await;
        }
        (Ok(_), None) => warn!(%peer, "handshake accepted without a route"),
        (Err(e), _) => debug!(%peer, error = %e, "admin handshake refused"),
    }
}
