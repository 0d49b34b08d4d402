//! 帧发布 (FrameRecord → JSON datagram / in-process channel)

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::record::FrameRecord;

/// 帧发布接口; publishing never blocks and may drop frames
pub trait FramePublisher: Send {
    /// 返回是否已发出
    fn publish(&mut self, record: &FrameRecord) -> bool;
}

/// UDP JSON 发布端
pub struct UdpFramePublisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpFramePublisher {
    pub fn bind(target: &str) -> io::Result<Self> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no publish address"))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        tracing::info!(%target, "publishing frames over udp");
        Ok(Self { socket, target })
    }
}

impl FramePublisher for UdpFramePublisher {
    fn publish(&mut self, record: &FrameRecord) -> bool {
        let payload = match serde_json::to_vec(record) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "frame record not serializable");
                return false;
            }
        };
        match self.socket.send_to(&payload, self.target) {
            Ok(_) => true,
            Err(e) => {
                if e.kind() == io::ErrorKind::WouldBlock {
                    tracing::trace!(frame = record.frame_number, "publish channel full, frame dropped");
                } else {
                    tracing::debug!(frame = record.frame_number, error = %e, "frame dropped");
                }
                false
            }
        }
    }
}

/// 进程内发布端 (bounded, drops when full)
pub struct ChannelPublisher {
    tx: Sender<FrameRecord>,
}

/// 创建进程内发布通道
pub fn channel_publisher(capacity: usize) -> (ChannelPublisher, Receiver<FrameRecord>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (ChannelPublisher { tx }, rx)
}

impl FramePublisher for ChannelPublisher {
    fn publish(&mut self, record: &FrameRecord) -> bool {
        match self.tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!(frame = record.frame_number, "subscriber lagging, frame dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
