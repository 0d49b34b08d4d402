//! LED 球控制包 (UDP, fire-and-forget)
//!
//! 包格式 (big-endian):
//! `[u8 66][u32 0][u8 0][u16 0]` 头部, then
//! - 颜色: `[u8 0x0A][R][G][B]`
//! - 亮度: `[u8 0x10][level]`

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use crate::command::Rgb;
use crate::error::AddressError;

const MAGIC: u8 = 66;
const OP_COLOR: u8 = 0x0A;
const OP_BRIGHTNESS: u8 = 0x10;

/// 设备控制包
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePacket {
    Color(Rgb),
    Brightness(u8),
}

impl DevicePacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.push(MAGIC);
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&0u16.to_be_bytes());
        match *self {
            DevicePacket::Color(c) => buf.extend_from_slice(&[OP_COLOR, c.r, c.g, c.b]),
            DevicePacket::Brightness(level) => buf.extend_from_slice(&[OP_BRIGHTNESS, level]),
        }
        buf
    }
}

/// 设备寻址: `<subnet>.<octet>:<port>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAddressing {
    prefix: [u8; 3],
    port: u16,
}

impl DeviceAddressing {
    /// `subnet` is a three-octet prefix such as `10.54.136`
    pub fn new(subnet: &str, port: u16) -> Result<Self, AddressError> {
        let octets: Vec<u8> = subnet
            .split('.')
            .map(|p| p.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| AddressError::InvalidSubnet(subnet.to_string()))?;
        let prefix: [u8; 3] = octets
            .try_into()
            .map_err(|_| AddressError::InvalidSubnet(subnet.to_string()))?;
        Ok(Self { prefix, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn subnet(&self) -> String {
        let [a, b, c] = self.prefix;
        format!("{a}.{b}.{c}")
    }

    /// 球ID → 地址; `all` is the subnet broadcast (.255)
    pub fn resolve(&self, ball_id: &str) -> Result<SocketAddrV4, AddressError> {
        let host = if ball_id.eq_ignore_ascii_case("all") {
            255
        } else {
            match ball_id.trim().parse::<u8>() {
                Ok(octet) if octet >= 1 => octet,
                _ => return Err(AddressError::InvalidIdentity(ball_id.to_string())),
            }
        };
        let [a, b, c] = self.prefix;
        Ok(SocketAddrV4::new(Ipv4Addr::new(a, b, c, host), self.port))
    }
}

/// UDP 发送端 (broadcast enabled)
pub struct UdpSender {
    socket: UdpSocket,
}

impl UdpSender {
    pub fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_broadcast(true)?;
        Ok(Self { socket })
    }

    pub fn send(&self, addr: SocketAddr, packet: DevicePacket) -> io::Result<usize> {
        self.socket.send_to(&packet.encode(), addr)
    }
}
