/// 网络传输层
/// Transport collaborator: binary uplink for frames, text downlink for detections
///
/// - TcpTransport:      分帧TCP, 自动重连 + 心跳
/// - LoopbackTransport: 进程内回环 (测试 / 离线运行)
pub mod loopback;
pub mod tcp;
pub mod wire;

pub use loopback::{loopback, LoopbackPeer, LoopbackTransport};
pub use tcp::TcpTransport;

use crate::error::TransportError;

/// 入站事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Connected,
    Disconnected,
    Text,
    Binary,
}

/// 入站回调, 在 service() 所在线程中同步调用
pub type MessageHandler = Box<dyn FnMut(MessageKind, &[u8]) + Send>;

pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    /// 同步发送一帧二进制数据
    fn send_binary(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// 重连 / 心跳 / 入站事件分发. 每个调度周期调用一次.
    fn service(&mut self);

    fn set_handler(&mut self, handler: MessageHandler);
}
