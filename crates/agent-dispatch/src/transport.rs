//! RPC wire codec is named but out of scope (§1/§6). This module defines the
//! trait seam C7 dispatches through plus a minimal TCP + length-prefixed-JSON
//! implementation — deliberately not the production Slurm-style binary wire
//! format, just enough to exercise C6–C8 end to end.

use std::net::SocketAddr;

use agent_core::{ControlReply, MessageType};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// What a per-target worker (C7) uses to "open a connection... send the
/// request, receive one reply" (§4.6).
pub trait RpcTransport: Send + Sync {
    fn call(
        &self,
        address: SocketAddr,
        msg_type: MessageType,
        payload: &[u8],
    ) -> impl std::future::Future<Output = std::io::Result<ControlReply>> + Send;
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    msg_type: u32,
    payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReply {
    /// `Some(rc)` maps to `RESPONSE_SLURM_RC { return_code: rc }`; `None`
    /// maps to "any other reply type" (§4.6), which always classifies FAILED.
    return_code: Option<i32>,
}

fn msg_type_tag(msg_type: MessageType) -> u32 {
    match msg_type {
        MessageType::RevokeJobCredential => MessageType::REQUEST_REVOKE_JOB_CREDENTIAL,
        MessageType::NodeRegistrationStatus => MessageType::REQUEST_NODE_REGISTRATION_STATUS,
        MessageType::Ping => MessageType::REQUEST_PING,
    }
}

async fn write_framed<W: AsyncWriteExt + Unpin>(w: &mut W, body: &[u8]) -> std::io::Result<()> {
    w.write_u32_le(body.len() as u32).await?;
    w.write_all(body).await?;
    w.flush().await
}

async fn read_framed<R: AsyncReadExt + Unpin>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let len = r.read_u32_le().await?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Connects over TCP, sends one length-prefixed JSON request, reads exactly
/// one length-prefixed JSON reply.
#[derive(Clone, Default)]
pub struct TcpJsonTransport;

impl RpcTransport for TcpJsonTransport {
    async fn call(
        &self,
        address: SocketAddr,
        msg_type: MessageType,
        payload: &[u8],
    ) -> std::io::Result<ControlReply> {
        let mut stream = TcpStream::connect(address).await?;
        let req = WireRequest {
            msg_type: msg_type_tag(msg_type),
            payload: payload.to_vec(),
        };
        let body = serde_json::to_vec(&req)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        write_framed(&mut stream, &body).await?;

        let resp_body = read_framed(&mut stream).await?;
        let resp: WireReply = serde_json::from_slice(&resp_body)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

        Ok(match resp.return_code {
            Some(return_code) => ControlReply::Rc { return_code },
            None => ControlReply::Other,
        })
    }
}

/// Minimal loopback server used by tests and by the CLI's demo mode: accepts
/// one connection, reads one framed request, replies with a fixed
/// `return_code`, and closes.
pub mod test_server {
    use super::*;
    use tokio::net::TcpListener;

    pub async fn serve_once(listener: TcpListener, return_code: i32) {
        if let Ok((mut stream, _)) = listener.accept().await {
            if let Ok(_req) = read_framed(&mut stream).await {
                let reply = WireReply {
                    return_code: Some(return_code),
                };
                if let Ok(body) = serde_json::to_vec(&reply) {
                    let _ = write_framed(&mut stream, &body).await;
                }
            }
        }
    }

    /// Accepts a connection and then never replies, simulating a stalled
    /// target (scenario 2, §8).
    pub async fn serve_and_hang(listener: TcpListener) {
        if let Ok((_stream, _)) = listener.accept().await {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn round_trips_a_ping_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(test_server::serve_once(listener, 0));

        let transport = TcpJsonTransport;
        let reply = transport.call(addr, MessageType::Ping, b"hi").await.unwrap();
        match reply {
            ControlReply::Rc { return_code } => assert_eq!(return_code, 0),
            ControlReply::Other => panic!("expected an RC reply"),
        }
    }
}
