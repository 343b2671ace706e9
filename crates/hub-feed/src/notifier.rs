//! # Notifier Listener
//!
//! TCP endpoint for an external block notifier. Each line is one JSON
//! `ChainHeader`; accepted headers are ingested into the store and the
//! header source is synced so they reach the feed in order. A line longer
//! than `MAX_LINE_LENGTH` ends the connection.

use crate::source::HeaderSource;
use futures::StreamExt;
use hub_types::{ChainHeader, HeaderIngest};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest accepted notifier line (64KB).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

pub struct NotifierListener {
    listener: TcpListener,
    ingest: Arc<dyn HeaderIngest>,
    source: Arc<HeaderSource>,
}

impl NotifierListener {
    pub async fn bind(
        addr: SocketAddr,
        ingest: Arc<dyn HeaderIngest>,
        source: Arc<HeaderSource>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            ingest,
            source,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept notifier connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(addr = ?self.listener.local_addr().ok(), "notifier listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "notifier connected");
                        let ingest = self.ingest.clone();
                        let source = self.source.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, ingest, source, shutdown).await;
                            debug!(%peer, "notifier disconnected");
                        });
                    }
                    Err(e) => warn!(error = %e, "notifier accept failed"),
                },
            }
        }
        info!("notifier stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    ingest: Arc<dyn HeaderIngest>,
    source: Arc<HeaderSource>,
    shutdown: CancellationToken,
) {
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            None => return,
            Some(Err(e)) => {
                warn!(error = %e, "notifier read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let header: ChainHeader = match serde_json::from_str(&line) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "malformed notifier line");
                continue;
            }
        };
        let height = header.height;
        match ingest.ingest(header).await {
            Ok(true) => debug!(height, "notifier header ingested"),
            Ok(false) => debug!(height, "notifier header already known"),
            Err(e) => {
                warn!(height, error = %e, "notifier header rejected");
                continue;
            }
        }
        if let Err(e) = source.sync().await {
            warn!(height, error = %e, "feed sync after notify failed");
        }
    }
}
