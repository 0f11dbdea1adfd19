//! 分帧TCP传输
//!
//! 非阻塞套接字, 所有工作都在调用者线程完成:
//! - 断开时每 reconnect_interval 尝试重连一次
//! - 连接后每 heartbeat_interval 发送 ping, 连续 heartbeat_failures 次未收到 pong 则断开
//! - 收到 ping 立即回 pong

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

use super::wire::{Opcode, WireCodec};
use super::{MessageHandler, MessageKind, Transport};
use crate::config::TransportConfig;
use crate::error::TransportError;

/// 单次 service() 最多读取的次数, 防止入站数据占满调度周期
const MAX_READS_PER_SERVICE: usize = 16;
const READ_CHUNK: usize = 4096;

pub struct TcpTransport {
    config: TransportConfig,
    stream: Option<TcpStream>,
    codec: WireCodec,
    inbound: BytesMut,
    outbound: BytesMut,
    read_buf: Vec<u8>,
    handler: Option<MessageHandler>,
    last_attempt: Option<Instant>,
    last_ping: Instant,
    awaiting_pong: Option<Instant>,
    missed_pongs: u32,
}

impl TcpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let codec = WireCodec::new(config.max_message_bytes);
        Self {
            config,
            stream: None,
            codec,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::new(),
            read_buf: vec![0; READ_CHUNK],
            handler: None,
            last_attempt: None,
            last_ping: Instant::now(),
            awaiting_pong: None,
            missed_pongs: 0,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match (self.config.host.as_str(), self.config.port).to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                warn!("cannot resolve {}: {e}", self.endpoint());
                None
            }
        }
    }

    fn try_connect(&mut self) {
        let Some(addr) = self.resolve() else {
            return;
        };
        let stream = match TcpStream::connect_timeout(&addr, self.config.connect_timeout()) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("connect to {addr} failed: {e}");
                return;
            }
        };
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("set_nonblocking failed: {e}");
            return;
        }
        let _ = stream.set_nodelay(true);

        info!("🔗 connected to {addr}");
        self.stream = Some(stream);
        self.reset_codec();
        self.last_ping = Instant::now();
        self.awaiting_pong = None;
        self.missed_pongs = 0;
        self.dispatch(MessageKind::Connected, &[]);
    }

    fn disconnect(&mut self, reason: &str) {
        if self.stream.take().is_none() {
            return;
        }
        warn!("🔌 disconnected from {}: {reason}", self.endpoint());
        self.reset_codec();
        self.awaiting_pong = None;
        // 断开后等一个完整的重连间隔
        self.last_attempt = Some(Instant::now());
        self.dispatch(MessageKind::Disconnected, &[]);
    }

    /// 丢弃半帧数据和解码状态
    fn reset_codec(&mut self) {
        self.codec = WireCodec::new(self.config.max_message_bytes);
        self.inbound.clear();
    }

    fn dispatch(&mut self, kind: MessageKind, payload: &[u8]) {
        if let Some(handler) = self.handler.as_mut() {
            handler(kind, payload);
        }
    }

    /// 非阻塞套接字上的 write_all, 超过心跳超时视为失败
    fn write_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        self.outbound.clear();
        self.codec.encode((opcode, payload), &mut self.outbound)?;

        let deadline = Instant::now() + self.config.heartbeat_timeout();
        if let Err(e) = write_all_until(stream, &self.outbound, deadline) {
            self.disconnect(&format!("write failed: {e}"));
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    fn poll_inbound(&mut self) {
        let mut closed = None;
        if let Some(stream) = self.stream.as_mut() {
            for _ in 0..MAX_READS_PER_SERVICE {
                match stream.read(&mut self.read_buf) {
                    Ok(0) => {
                        closed = Some(String::from("peer closed the connection"));
                        break;
                    }
                    Ok(n) => self.inbound.extend_from_slice(&self.read_buf[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        closed = Some(format!("read failed: {e}"));
                        break;
                    }
                }
            }
        }

        // 先分发已完整到达的帧, 再处理断开
        loop {
            match self.codec.decode(&mut self.inbound) {
                Ok(Some((opcode, payload))) => self.handle_frame(opcode, &payload),
                Ok(None) => break,
                Err(e) => {
                    closed.get_or_insert_with(|| e.to_string());
                    break;
                }
            }
        }

        if let Some(reason) = closed {
            self.disconnect(&reason);
        }
    }

    fn handle_frame(&mut self, opcode: Opcode, payload: &[u8]) {
        match opcode {
            Opcode::Text => {
                trace!("text message: {} bytes", payload.len());
                self.dispatch(MessageKind::Text, payload);
            }
            Opcode::Binary => self.dispatch(MessageKind::Binary, payload),
            Opcode::Ping => {
                if self.stream.is_some() {
                    let _ = self.write_frame(Opcode::Pong, payload);
                }
            }
            Opcode::Pong => {
                self.awaiting_pong = None;
                self.missed_pongs = 0;
            }
        }
    }

    fn heartbeat(&mut self, now: Instant) {
        if self.config.heartbeat_interval_ms == 0 || self.stream.is_none() {
            return;
        }

        if let Some(sent) = self.awaiting_pong {
            if now.duration_since(sent) < self.config.heartbeat_timeout() {
                return;
            }
            self.awaiting_pong = None;
            self.missed_pongs += 1;
            warn!(
                "heartbeat missed ({}/{})",
                self.missed_pongs, self.config.heartbeat_failures
            );
            if self.missed_pongs >= self.config.heartbeat_failures {
                self.disconnect("heartbeat timeout");
                return;
            }
        }

        if now.duration_since(self.last_ping) >= self.config.heartbeat_interval() {
            self.last_ping = now;
            if self.write_frame(Opcode::Ping, &[]).is_ok() {
                self.awaiting_pong = Some(now);
            }
        }
    }
}

impl Transport for TcpTransport {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send_binary(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.write_frame(Opcode::Binary, payload)
    }

    fn service(&mut self) {
        let now = Instant::now();
        if self.stream.is_none() {
            let due = self
                .last_attempt
                .map_or(true, |t| now.duration_since(t) >= self.config.reconnect_interval());
            if due {
                self.last_attempt = Some(now);
                self.try_connect();
            }
            return;
        }

        self.poll_inbound();
        self.heartbeat(now);
    }

    fn set_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }
}

fn write_all_until(stream: &mut TcpStream, mut buf: &[u8], deadline: Instant) -> std::io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(ErrorKind::TimedOut.into());
                }
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
