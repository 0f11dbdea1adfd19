//! 进程内回环传输
//! In-process transport pair: the pipeline side implements `Transport`, the
//! peer side plays the detection server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{info, trace};

use super::{MessageHandler, MessageKind, Transport};
use crate::error::TransportError;

enum Inbound {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

pub struct LoopbackTransport {
    connected: Arc<AtomicBool>,
    inbound: Receiver<Inbound>,
    outbound: Sender<Vec<u8>>,
    handler: Option<MessageHandler>,
    // service() 观察到的上一次连接状态
    reported: bool,
}

pub struct LoopbackPeer {
    connected: Arc<AtomicBool>,
    inbound: Sender<Inbound>,
    outbound: Receiver<Vec<u8>>,
}

/// 创建一对回环端点. 对端最多缓存 `capacity` 帧, 满了就丢弃新帧.
pub fn loopback(capacity: usize) -> (LoopbackTransport, LoopbackPeer) {
    let connected = Arc::new(AtomicBool::new(false));
    let (in_tx, in_rx) = unbounded();
    let (out_tx, out_rx) = bounded(capacity.max(1));
    (
        LoopbackTransport {
            connected: connected.clone(),
            inbound: in_rx,
            outbound: out_tx,
            handler: None,
            reported: false,
        },
        LoopbackPeer {
            connected,
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

impl LoopbackTransport {
    fn dispatch(&mut self, kind: MessageKind, payload: &[u8]) {
        if let Some(handler) = self.handler.as_mut() {
            handler(kind, payload);
        }
    }
}

impl Transport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send_binary(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        match self.outbound.try_send(payload.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!("loopback peer is full, frame dropped");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(TransportError::NotConnected),
        }
    }

    fn service(&mut self) {
        let connected = self.is_connected();
        if connected != self.reported {
            self.reported = connected;
            if connected {
                info!("🔗 loopback connected");
                self.dispatch(MessageKind::Connected, &[]);
            } else {
                info!("🔌 loopback disconnected");
                self.dispatch(MessageKind::Disconnected, &[]);
            }
        }

        // 断开期间到达的消息直接丢弃
        while let Ok(message) = self.inbound.try_recv() {
            if !connected {
                continue;
            }
            match message {
                Inbound::Text(bytes) => self.dispatch(MessageKind::Text, &bytes),
                Inbound::Binary(bytes) => self.dispatch(MessageKind::Binary, &bytes),
            }
        }
    }

    fn set_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }
}

impl LoopbackPeer {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn send_text(&self, text: impl Into<Vec<u8>>) {
        let _ = self.inbound.send(Inbound::Text(text.into()));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.inbound.send(Inbound::Binary(bytes.into()));
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.outbound.recv_timeout(timeout).ok()
    }

    /// 取走已收到的全部帧
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.outbound.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_disconnected_send_fails() {
        let (mut transport, peer) = loopback(4);
        assert!(matches!(
            transport.send_binary(b"frame"),
            Err(TransportError::NotConnected)
        ));
        assert!(peer.drain().is_empty());
    }

    #[test]
    fn test_events_follow_connectivity() {
        let (mut transport, peer) = loopback(4);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        transport.set_handler(Box::new(move |kind, payload| {
            sink.lock().unwrap().push((kind, payload.to_vec()));
        }));

        peer.send_text("dropped while offline");
        transport.service();
        assert!(events.lock().unwrap().is_empty());

        peer.set_connected(true);
        peer.send_text(r#"{"faces":[]}"#);
        transport.service();
        peer.set_connected(false);
        transport.service();

        let events = events.lock().unwrap();
        let kinds: Vec<MessageKind> = events.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::Connected, MessageKind::Text, MessageKind::Disconnected]
        );
        assert_eq!(events[1].1, br#"{"faces":[]}"#.to_vec());
    }

    #[test]
    fn test_full_peer_drops_frames() {
        let (mut transport, peer) = loopback(1);
        peer.set_connected(true);
        transport.send_binary(b"a").unwrap();
        transport.send_binary(b"b").unwrap();
        assert_eq!(peer.drain(), vec![b"a".to_vec()]);
    }
}
