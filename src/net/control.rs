//! 控制通道 (request/response with the external controller)
//!
//! 每个请求恰好一个响应; the engine calls `respond` after handling each
//! request returned by `try_recv` and before polling again.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use crate::command::{Command, CommandResponse};

/// 控制通道接口
pub trait ControlChannel: Send {
    /// 非阻塞读取一个请求; `Err` carries a parse failure to answer
    fn try_recv(&mut self) -> Option<Result<Command, String>>;

    fn respond(&mut self, response: &CommandResponse);
}

// ========== TCP (newline-delimited JSON) ==========

/// TCP 控制服务端, one client at a time
pub struct TcpControlServer {
    listener: TcpListener,
    client: Option<TcpStream>,
    pending: Vec<u8>,
}

impl TcpControlServer {
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "command channel listening");
        Ok(Self {
            listener,
            client: None,
            pending: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    fn drop_client(&mut self, reason: &str) {
        if self.client.take().is_some() {
            tracing::info!(reason, "controller disconnected");
        }
        self.pending.clear();
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl ControlChannel for TcpControlServer {
    fn try_recv(&mut self) -> Option<Result<Command, String>> {
        if self.client.is_none() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!(error = %e, "controller socket setup failed");
                        return None;
                    }
                    tracing::info!(%peer, "controller connected");
                    self.client = Some(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return None;
                }
            }
        }

        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&line).map_err(|e| e.to_string()));
            }

            let client = self.client.as_mut()?;
            let mut chunk = [0u8; 4096];
            match client.read(&mut chunk) {
                Ok(0) => {
                    self.drop_client("eof");
                    return None;
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(error = %e, "controller read failed");
                    self.drop_client("read error");
                    return None;
                }
            }
        }
    }

    fn respond(&mut self, response: &CommandResponse) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        let mut line = match serde_json::to_vec(response) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "response not serializable");
                return;
            }
        };
        line.push(b'\n');
        if let Err(e) = client.write_all(&line) {
            tracing::warn!(error = %e, "response not delivered");
            self.drop_client("write error");
        }
    }
}

// ========== 进程内通道 ==========

/// 进程内控制通道 (engine side)
pub struct ChannelControl {
    requests: Receiver<Command>,
    responses: Sender<CommandResponse>,
}

/// 进程内控制客户端
#[derive(Clone)]
pub struct ControlClient {
    requests: Sender<Command>,
    responses: Receiver<CommandResponse>,
}

/// 创建进程内控制通道
pub fn control_pair() -> (ChannelControl, ControlClient) {
    let (req_tx, req_rx) = crossbeam_channel::unbounded();
    let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
    (
        ChannelControl {
            requests: req_rx,
            responses: resp_tx,
        },
        ControlClient {
            requests: req_tx,
            responses: resp_rx,
        },
    )
}

impl ControlChannel for ChannelControl {
    fn try_recv(&mut self) -> Option<Result<Command, String>> {
        self.requests.try_recv().ok().map(Ok)
    }

    fn respond(&mut self, response: &CommandResponse) {
        let _ = self.responses.send(response.clone());
    }
}

impl ControlClient {
    /// 发送请求并等待响应
    pub fn request(&self, command: Command, timeout: Duration) -> Option<CommandResponse> {
        self.requests.send(command).ok()?;
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::time::Instant;

    fn poll(server: &mut TcpControlServer) -> Result<Command, String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(req) = server.try_recv() {
                return req;
            }
            assert!(Instant::now() < deadline, "no request received");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn tcp_requests_are_answered_in_order() {
        let mut server = TcpControlServer::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        client
            .write_all(b"{\"type\":\"UNLOAD_MODULE\"}\nnot json\n")
            .unwrap();

        assert_eq!(poll(&mut server), Ok(Command::UnloadModule));
        server.respond(&CommandResponse::fail("No active module"));
        assert!(poll(&mut server).is_err());
        server.respond(&CommandResponse::fail("bad request"));

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let first: CommandResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(first.message, "No active module");
        line.clear();
        reader.read_line(&mut line).unwrap();
        let second: CommandResponse = serde_json::from_str(&line).unwrap();
        assert!(!second.success);
    }

    #[test]
    fn idle_server_returns_nothing() {
        let mut server = TcpControlServer::bind("127.0.0.1:0").unwrap();
        assert!(server.try_recv().is_none());
    }
}
