//! Packet bridge from SRTP sessions into receiver tracks, plus the
//! inactivity deadline that ends a live stream.
//!
//! | Tracks | Video session sink | Audio session sink |
//! |--------|--------------------|--------------------|
//! | video + audio | reset deadline, write video | write audio |
//! | video only | reset deadline, write video | none |
//! | audio only | none | reset deadline, write audio |
//!
//! When both tracks exist, video alone carries the liveness signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::media::{PacedSink, PacketSink, Receiver, RtpPacket};
use crate::srtp::Session;

/// Resettable inactivity timer shared by the delivery threads and the
/// thread blocked in [`wait`](Self::wait).
///
/// Resets are lock-free and never move the expiry backwards.
/// [`expire`](Self::expire) is sticky: later resets do not revive it.
#[derive(Debug)]
pub struct Deadline {
    window: Duration,
    base: Instant,
    /// Expiry as nanoseconds since `base`.
    expires_at: AtomicU64,
    expired: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Deadline {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            base: Instant::now(),
            expires_at: AtomicU64::new(saturating_nanos(window)),
            expired: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Push the expiry to `now + window`.
    pub fn reset(&self) {
        let at = saturating_nanos(self.base.elapsed().saturating_add(self.window));
        self.expires_at.fetch_max(at, Ordering::AcqRel);
    }

    /// Expire immediately and wake the waiter.
    pub fn expire(&self) {
        self.expired.store(true, Ordering::SeqCst);
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
            || self.expires_at().is_some_and(|at| Instant::now() >= at)
    }

    /// `None` when the expiry lies beyond what `Instant` can represent.
    fn expires_at(&self) -> Option<Instant> {
        self.base
            .checked_add(Duration::from_nanos(self.expires_at.load(Ordering::Acquire)))
    }

    /// Block until the deadline passes without a reset, or until
    /// [`expire`](Self::expire) is called.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        loop {
            if self.expired.load(Ordering::SeqCst) {
                return;
            }
            match self.expires_at() {
                Some(at) if Instant::now() >= at => return,
                Some(at) => {
                    self.cond.wait_until(&mut guard, at);
                }
                None => self.cond.wait(&mut guard),
            }
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Resets the deadline, then forwards.
struct LivenessSink {
    deadline: Arc<Deadline>,
    inner: Arc<dyn PacketSink>,
}

impl PacketSink for LivenessSink {
    fn write_rtp(&self, packet: RtpPacket) {
        self.deadline.reset();
        self.inner.write_rtp(packet);
    }
}

fn audio_sink(track: Arc<Receiver>, pace: bool) -> Arc<dyn PacketSink> {
    if !pace {
        return track;
    }
    tracing::debug!("audio pacing enabled");
    Arc::new(PacedSink::new(track))
}

/// Install packet sinks on both sessions. Must run before the sessions
/// are registered with the SRTP server.
pub fn wire(
    deadline: &Arc<Deadline>,
    video: Option<Arc<Receiver>>,
    audio: Option<Arc<Receiver>>,
    video_session: &Session,
    audio_session: &Session,
    pace_audio: bool,
) {
    match (video, audio) {
        (Some(video), audio) => {
            video_session.set_sink(Arc::new(LivenessSink {
                deadline: deadline.clone(),
                inner: video,
            }));
            if let Some(audio) = audio {
                audio_session.set_sink(audio_sink(audio, pace_audio));
            }
        }
        (None, Some(audio)) => {
            audio_session.set_sink(Arc::new(LivenessSink {
                deadline: deadline.clone(),
                inner: audio_sink(audio, pace_audio),
            }));
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Codec, CodecName};
    use crate::srtp::Endpoint;
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;

    fn session() -> Session {
        Session::new(Endpoint {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            master_key: vec![0; 16],
            master_salt: vec![0; 14],
            ssrc: 1,
        })
    }

    fn track(name: CodecName, clock_rate: u32) -> (Arc<Receiver>, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0usize));
        let c = count.clone();
        let receiver = Arc::new(Receiver::new(
            Codec::new(name, clock_rate),
            Arc::new(move |_: RtpPacket| *c.lock() += 1),
        ));
        (receiver, count)
    }

    #[test]
    fn deadline_fires_after_window() {
        let deadline = Deadline::new(Duration::from_millis(50));
        let start = Instant::now();
        deadline.wait();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2));
        assert!(deadline.is_expired());
    }

    #[test]
    fn reset_extends_deadline() {
        let deadline = Arc::new(Deadline::new(Duration::from_millis(100)));
        let d = deadline.clone();
        let pinger = thread::spawn(move || {
            for _ in 0..6 {
                thread::sleep(Duration::from_millis(40));
                d.reset();
            }
        });

        let start = Instant::now();
        deadline.wait();
        // Last reset lands around 240 ms, so expiry is no earlier than ~340 ms.
        assert!(start.elapsed() >= Duration::from_millis(300));
        pinger.join().unwrap();
    }

    #[test]
    fn huge_window_does_not_wrap() {
        let deadline = Deadline::new(Duration::MAX);
        deadline.reset();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.expires_at.load(Ordering::Acquire), u64::MAX);
    }

    #[test]
    fn concurrent_resets_only_move_forward() {
        let deadline = Arc::new(Deadline::new(Duration::from_millis(200)));
        let before = deadline.expires_at();

        let resetters: Vec<_> = (0..4)
            .map(|_| {
                let d = deadline.clone();
                thread::spawn(move || {
                    let mut last = d.expires_at();
                    for _ in 0..1000 {
                        d.reset();
                        let now = d.expires_at();
                        assert!(now >= last);
                        last = now;
                    }
                })
            })
            .collect();
        for r in resetters {
            r.join().unwrap();
        }

        assert!(deadline.expires_at() >= before);
        assert!(!deadline.is_expired());
    }

    #[test]
    fn expire_wakes_waiter_and_sticks() {
        let deadline = Arc::new(Deadline::new(Duration::from_secs(60)));
        let d = deadline.clone();
        let waiter = thread::spawn(move || d.wait());
        thread::sleep(Duration::from_millis(20));
        deadline.expire();
        waiter.join().unwrap();

        deadline.reset();
        assert!(deadline.is_expired());
        deadline.wait();
    }

    #[test]
    fn video_carries_liveness_when_both_present() {
        let deadline = Arc::new(Deadline::new(Duration::from_millis(100)));
        let (video, video_count) = track(CodecName::H264, 90000);
        let (audio, audio_count) = track(CodecName::Opus, 16000);
        let (vs, as_) = (session(), session());
        wire(&deadline, Some(video), Some(audio), &vs, &as_, false);

        let before = deadline.expires_at();
        thread::sleep(Duration::from_millis(5));
        as_.deliver(RtpPacket::default());
        assert_eq!(deadline.expires_at(), before);

        vs.deliver(RtpPacket::default());
        assert!(deadline.expires_at() > before);

        assert_eq!(*video_count.lock(), 1);
        assert_eq!(*audio_count.lock(), 1);
    }

    #[test]
    fn audio_carries_liveness_when_alone() {
        let deadline = Arc::new(Deadline::new(Duration::from_millis(100)));
        let (audio, audio_count) = track(CodecName::Opus, 16000);
        let (vs, as_) = (session(), session());
        wire(&deadline, None, Some(audio), &vs, &as_, false);

        let before = deadline.expires_at();
        thread::sleep(Duration::from_millis(5));
        as_.deliver(RtpPacket::default());
        assert!(deadline.expires_at() > before);
        assert_eq!(*audio_count.lock(), 1);

        // No video sink installed: packet is counted and dropped.
        vs.deliver(RtpPacket::default());
        assert_eq!(vs.recv(), 12);
    }

    #[test]
    fn paced_audio_drops_burst() {
        let deadline = Arc::new(Deadline::new(Duration::from_millis(100)));
        let (video, _) = track(CodecName::H264, 90000);
        let (audio, audio_count) = track(CodecName::Opus, 16000);
        let (vs, as_) = (session(), session());
        wire(&deadline, Some(video), Some(audio), &vs, &as_, true);

        for _ in 0..5 {
            as_.deliver(RtpPacket::default());
        }
        assert_eq!(*audio_count.lock(), 1);
    }
}
