//! HTTP/1.1 connection that books its phases on a timer
//!
//! Each network step is delegated to hyper and tokio and bracketed by timer
//! phases on the timer the caller passes in:
//!
//! | phase  | covers                                         |
//! |--------|------------------------------------------------|
//! | `dns`  | resolving the store host                       |
//! | `conn` | TCP connect and HTTP handshake                 |
//! | `send` | writing the request until the response head    |
//! | `resp` | reading the response body                      |

use crate::resolve::Resolve;
use crate::{Result, StoreError};
use bytes::Bytes;
use http::uri::Authority;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use sccache_timing::Timer;
use tokio::net::TcpStream;
use tracing::{debug, trace};

const DEFAULT_HTTP_PORT: u16 = 80;

/// An open connection to the store host.
pub struct TimedConnection {
    sender: SendRequest<Full<Bytes>>,
}

impl TimedConnection {
    /// Resolve and connect to `authority`.
    pub async fn open(
        authority: &Authority,
        resolver: &dyn Resolve,
        timer: &mut Timer,
    ) -> Result<Self> {
        let host = authority.host();
        let port = authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT);

        timer.start("dns");
        let ip = resolver.resolve(host).await?;

        timer.start("conn");
        let stream = TcpStream::connect((ip, port))
            .await
            .map_err(|source| StoreError::Connection {
                address: format!("{ip}:{port}"),
                source,
            })?;
        let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Store connection closed with error");
            }
        });
        timer.stop();

        trace!(host, %ip, port, "Connected to store");
        Ok(Self { sender })
    }

    /// Send `request` and wait for the response head.
    pub async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
        timer: &mut Timer,
    ) -> Result<Response<Incoming>> {
        timer.start("send");
        let response = self.sender.send_request(request).await;
        timer.stop();
        Ok(response?)
    }

    /// Read the whole response body.
    pub async fn receive(body: Incoming, timer: &mut Timer) -> Result<Bytes> {
        timer.start("resp");
        let collected = body.collect().await;
        timer.stop();
        Ok(collected?.to_bytes())
    }
}
