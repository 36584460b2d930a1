//! tests/common/harness.rs
use flexis_cc::{CongestionControl, Config, Connection, Flexis, PacingRatio, SharedConfig};
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "flexis_cc=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A sender behind a single bottleneck, acknowledged once per millisecond.
///
/// Packets beyond the path's bandwidth-delay product sit in the bottleneck
/// queue and add `queue_delay_per_packet` each to the RTT.
pub struct SimulatedPath {
    pub flexis: Flexis,
    pub conn: Connection,
    pub pacing: PacingRatio,
    pub base_rtt: Duration,
    pub bdp_packets: u32,
    pub queue_delay_per_packet: Duration,
    start: Instant,
    clock_ms: u64,
}

impl SimulatedPath {
    pub fn new(config: impl Into<SharedConfig>, cwnd: u32) -> Self {
        init_tracing();
        let start = Instant::now();
        let conn = Connection::new(start, cwnd);
        let pacing = PacingRatio::new();
        let flexis = Flexis::new(config, pacing.clone(), &conn);
        Self {
            flexis,
            conn,
            pacing,
            base_rtt: Duration::from_millis(20),
            bdp_packets: 50,
            queue_delay_per_packet: Duration::from_micros(400),
            start,
            clock_ms: 0,
        }
    }

    pub fn with_default_config(cwnd: u32) -> Self {
        Self::new(Config::default(), cwnd)
    }

    /// The RTT a packet sent with the current window experiences.
    pub fn current_rtt(&self) -> Duration {
        let queued = self.conn.cwnd.saturating_sub(self.bdp_packets);
        self.base_rtt + self.queue_delay_per_packet * queued
    }

    /// Sends one packet at the next millisecond and processes its
    /// acknowledgment. Sequence numbers count milliseconds of send time.
    pub fn step(&mut self) {
        self.clock_ms += 1;
        let rtt = self.current_rtt();
        let send_time = self.start + Duration::from_millis(self.clock_ms);
        let now = send_time + rtt;

        self.conn.now = now;
        self.conn.srtt = rtt;
        self.conn.max_packets_out = self.conn.cwnd;
        self.conn.snd_nxt = u32::try_from(now.duration_since(self.start).as_millis()).unwrap();

        self.flexis.on_ack_sampled(rtt);
        self.flexis
            .on_congestion_avoidance(&mut self.conn, self.clock_ms as u32, 1448);
    }

    /// Feeds a single acknowledgment with an explicit RTT and sequence number.
    pub fn ack(&mut self, send_ms: u64, rtt: Duration, ack_seq: u32) {
        let now = self.start + Duration::from_millis(send_ms) + rtt;
        self.conn.now = now;
        self.conn.srtt = rtt;
        self.conn.max_packets_out = self.conn.cwnd;
        self.flexis.on_ack_sampled(rtt);
        self.flexis.on_congestion_avoidance(&mut self.conn, ack_seq, 1448);
    }
}
