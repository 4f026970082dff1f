//! SRTP session registry.
//!
//! One UDP port is shared by every HomeKit stream on the server. The
//! transport layer decrypts each datagram and hands the plain RTP packet
//! to [`Server::dispatch`], which routes it by SSRC to the registered
//! [`Session`] whose remote endpoint carries that SSRC.
//!
//! ## Session lifecycle
//!
//! ```text
//! Session::new        -> created, not routable
//! Session::set_sink   -> sink installed (by the bridge)
//! Server::add_session -> routable; sink invoked on the pump threads
//! Server::del_session -> unroutable; returns after in-flight delivery ends
//! ```
//!
//! Dispatch holds the registry read lock while the sink runs and removal
//! takes the write lock, so no sink is called after `del_session` returns.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::media::{PacketSink, RtpPacket};

/// One side of an SRTP stream: where packets go and how they are keyed.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
    /// SRTP master key (AES_CM_128: 16 bytes).
    pub master_key: Vec<u8>,
    /// SRTP master salt (14 bytes).
    pub master_salt: Vec<u8>,
    pub ssrc: u32,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .field("ssrc", &format_args!("{:#010X}", self.ssrc))
            .finish_non_exhaustive()
    }
}

/// One direction's packet channel between the accessory and this server.
pub struct Session {
    pub local: Endpoint,
    remote: RwLock<Option<Endpoint>>,
    sink: RwLock<Option<Arc<dyn PacketSink>>>,
    recv: AtomicU64,
}

impl Session {
    pub fn new(local: Endpoint) -> Self {
        Self {
            local,
            remote: RwLock::new(None),
            sink: RwLock::new(None),
            recv: AtomicU64::new(0),
        }
    }

    /// Record the accessory's endpoint, as returned by stream setup.
    pub fn set_remote(&self, remote: Endpoint) {
        tracing::debug!(local_ssrc = self.local.ssrc, remote = ?remote, "remote endpoint set");
        *self.remote.write() = Some(remote);
    }

    pub fn remote(&self) -> Option<Endpoint> {
        self.remote.read().clone()
    }

    /// Install the sink inbound packets are handed to.
    pub fn set_sink(&self, sink: Arc<dyn PacketSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Bytes received on this session so far.
    pub fn recv(&self) -> u64 {
        self.recv.load(Ordering::Relaxed)
    }

    /// Account for and deliver one inbound packet.
    pub fn deliver(&self, packet: RtpPacket) {
        self.recv
            .fetch_add(packet.marshal_size() as u64, Ordering::Relaxed);

        let sink = self.sink.read().clone();
        match sink {
            Some(sink) => sink.write_rtp(packet),
            None => tracing::trace!(ssrc = packet.header.ssrc, "no sink, packet dropped"),
        }
    }

    fn remote_ssrc(&self) -> Option<u32> {
        self.remote.read().as_ref().map(|r| r.ssrc)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("local", &self.local)
            .field("remote", &*self.remote.read())
            .field("recv", &self.recv())
            .finish()
    }
}

/// Registry of active sessions sharing one local SRTP port.
#[derive(Clone)]
pub struct Server {
    port: u16,
    sessions: Arc<RwLock<Vec<Arc<Session>>>>,
}

impl Server {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Local port advertised in every endpoint.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn add_session(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write();
        if sessions.iter().any(|s| Arc::ptr_eq(s, &session)) {
            return;
        }
        sessions.push(session);
        tracing::debug!(total_sessions = sessions.len(), "session added");
    }

    /// Remove a session. Removing an unknown session is a no-op.
    ///
    /// Blocks until any in-flight delivery to registered sessions finishes.
    pub fn del_session(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
            Some(pos) => {
                sessions.swap_remove(pos);
                tracing::debug!(total_sessions = sessions.len(), "session removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Route a decrypted packet to the session expecting its SSRC.
    ///
    /// Returns `false` when no registered session matches.
    pub fn dispatch(&self, packet: RtpPacket) -> bool {
        let sessions = self.sessions.read();
        let ssrc = packet.header.ssrc;
        match sessions.iter().find(|s| s.remote_ssrc() == Some(ssrc)) {
            Some(session) => {
                session.deliver(packet);
                true
            }
            None => {
                tracing::warn!(ssrc = format_args!("{:#010X}", ssrc), "packet for unknown session");
                false
            }
        }
    }

    /// Parse and route one decrypted RTP datagram.
    pub fn handle_rtp(&self, buf: &[u8]) -> Result<bool> {
        Ok(self.dispatch(RtpPacket::parse(buf)?))
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::RtpHeader;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;

    fn endpoint(ssrc: u32) -> Endpoint {
        Endpoint {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            master_key: vec![0; 16],
            master_salt: vec![0; 14],
            ssrc,
        }
    }

    fn packet(ssrc: u32, len: usize) -> RtpPacket {
        RtpPacket::new(
            RtpHeader {
                ssrc,
                ..Default::default()
            },
            vec![0; len],
        )
    }

    fn session_with_remote(remote_ssrc: u32) -> (Arc<Session>, Arc<Mutex<Vec<u32>>>) {
        let session = Arc::new(Session::new(endpoint(1)));
        session.set_remote(endpoint(remote_ssrc));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.set_sink(Arc::new(move |p: RtpPacket| sink.lock().push(p.header.ssrc)));
        (session, seen)
    }

    #[test]
    fn dispatch_routes_by_remote_ssrc() {
        let server = Server::new(5000);
        let (video, video_seen) = session_with_remote(0x11);
        let (audio, audio_seen) = session_with_remote(0x22);
        server.add_session(video.clone());
        server.add_session(audio.clone());

        assert!(server.dispatch(packet(0x22, 10)));
        assert!(server.dispatch(packet(0x11, 20)));
        assert!(!server.dispatch(packet(0x33, 30)));

        assert_eq!(*video_seen.lock(), vec![0x11]);
        assert_eq!(*audio_seen.lock(), vec![0x22]);
        assert_eq!(video.recv(), 32);
        assert_eq!(audio.recv(), 22);
    }

    #[test]
    fn unregistered_session_receives_nothing() {
        let server = Server::new(5000);
        let (session, seen) = session_with_remote(0x11);
        server.add_session(session.clone());
        assert!(server.del_session(&session));

        assert!(!server.dispatch(packet(0x11, 10)));
        assert!(seen.lock().is_empty());
        assert!(server.is_empty());
    }

    #[test]
    fn del_unknown_session_is_noop() {
        let server = Server::new(5000);
        let (session, _) = session_with_remote(0x11);
        assert!(!server.del_session(&session));
        server.add_session(session.clone());
        server.add_session(session.clone());
        assert_eq!(server.len(), 1);
        assert!(server.del_session(&session));
        assert!(!server.del_session(&session));
    }

    #[test]
    fn session_without_sink_still_counts() {
        let session = Session::new(endpoint(1));
        session.deliver(packet(1, 100));
        assert_eq!(session.recv(), 112);
    }

    #[test]
    fn handle_rtp_parses_datagram() {
        let server = Server::new(5000);
        let (session, seen) = session_with_remote(0xCAFE);
        server.add_session(session);
        let buf = packet(0xCAFE, 4).marshal();
        assert!(server.handle_rtp(&buf).unwrap());
        assert!(server.handle_rtp(&buf[..4]).is_err());
        assert_eq!(*seen.lock(), vec![0xCAFE]);
    }
}
