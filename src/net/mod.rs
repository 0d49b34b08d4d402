/// 网络系统 (Network System)
///
/// - udp:     LED 球控制包 + 设备寻址
/// - publish: 帧发布 (UDP JSON / 进程内)
/// - control: 控制通道 (TCP 行分隔 JSON / 进程内)
pub mod control;
pub mod publish;
pub mod udp;

pub use control::{control_pair, ChannelControl, ControlChannel, ControlClient, TcpControlServer};
pub use publish::{channel_publisher, ChannelPublisher, FramePublisher, UdpFramePublisher};
pub use udp::{DeviceAddressing, DevicePacket, UdpSender};
