//! A minimal status server bound to localhost, for tests.

use crate::codec;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer every status request with this JSON document.
    Status(String),
    /// Accept the connection and never answer.
    Stall,
}

pub struct FakeServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(reply: Reply) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let reply = reply.clone();
                tokio::spawn(async move {
                    let _ = serve(sock, reply).await;
                });
            }
        });
        Ok(FakeServer { addr, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut sock: TcpStream, reply: Reply) -> Result<(), crate::ProbeError> {
    let _handshake = codec::read_packet(&mut sock).await?;
    let _request = codec::read_packet(&mut sock).await?;
    match reply {
        Reply::Status(json) => {
            let mut body = Vec::new();
            codec::write_string(&mut body, &json);
            sock.write_all(&codec::frame(0x00, &body)).await?;
        }
        Reply::Stall => {
            std::future::pending::<()>().await;
        }
    }
    Ok(())
}

/// A localhost port with nothing listening on it.
pub async fn closed_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
