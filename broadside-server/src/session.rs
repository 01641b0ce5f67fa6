//! Per-connection session state.

use broadside_core::HandleId;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client, from the connection handler's point of view.
///
/// Owned by the connection's reader task.
pub struct Session {
    /// Handle assigned at admission.
    pub handle: HandleId,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Frames decoded successfully.
    frame_count: u64,

    /// Consecutive checksum or malformed frames.
    strikes: u32,

    /// Session creation time.
    created_at: Instant,

    /// Last successfully decoded frame.
    last_activity: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(handle: HandleId, remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            handle,
            remote_addr,
            frame_count: 0,
            strikes: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Records a successfully decoded frame and clears any strikes.
    pub fn record_frame(&mut self) {
        self.frame_count += 1;
        self.strikes = 0;
        self.last_activity = Instant::now();
    }

    /// Records a bad frame; returns the consecutive strike count.
    pub fn record_strike(&mut self) -> u32 {
        self.strikes += 1;
        self.strikes
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    /// Returns the frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(HandleId(3), test_addr());
        assert_eq!(session.handle, HandleId(3));
        assert_eq!(session.frame_count(), 0);
        assert_eq!(session.strikes(), 0);
        assert!(session.age() < Duration::from_secs(5));
    }

    #[test]
    fn test_strikes_reset_on_good_frame() {
        let mut session = Session::new(HandleId(1), test_addr());
        assert_eq!(session.record_strike(), 1);
        assert_eq!(session.record_strike(), 2);

        session.record_frame();
        assert_eq!(session.strikes(), 0);
        assert_eq!(session.frame_count(), 1);
        assert_eq!(session.record_strike(), 1);
    }

    #[test]
    fn test_idle_duration_resets() {
        let mut session = Session::new(HandleId(1), test_addr());
        std::thread::sleep(Duration::from_millis(20));
        assert!(session.idle_duration() >= Duration::from_millis(20));

        session.record_frame();
        assert!(session.idle_duration() < Duration::from_millis(20));
    }
}
