//! Pipe scheduler: yielding read → process → write loops with byte/time
//! budgets, ordering, half-close, and optional rate limiting.
//!
//! Each direction is an independent half-duplex loop; the two directions
//! of one connection are driven concurrently by the caller (typically via
//! `tokio::join!`) — there is no cross-direction ordering guarantee, only
//! within-direction ordering.

use std::time::{Duration, Instant};

use crate::{
    error::Result,
    queue::BufferQueue,
    socket::{ReadSide, SocketAdapter, WriteSide},
};

/// Bytes processed in one pass before the pump cooperatively yields.
pub const YIELD_AFTER_BYTES: usize = 32 * 1024;

/// Wall time elapsed in one pass before the pump cooperatively yields.
pub const YIELD_AFTER_DURATION: Duration = Duration::from_millis(20);

/// How a single direction's pump loop ended its most recent pass.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The source reached EOF and the outbound queue to the sink has been
    /// fully drained; the caller should half-close the sink's write side.
    SourceClosed,
    /// Either budget was exhausted; the caller should re-post (yield) and
    /// call `pump_once` again.
    Yielded,
}

/// Optional byte/sec throttle. Rate windows rotate at least every 3000ms.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bytes_per_sec: u64,
    window_start: Instant,
    transferred_in_window: u64,
}

impl RateLimiter {
    /// A limiter capped at `bytes_per_sec`; `0` means unlimited.
    #[must_use]
    pub fn new(bytes_per_sec: u64) -> Self {
        Self { bytes_per_sec, window_start: Instant::now(), transferred_in_window: 0 }
    }

    /// Record `n` transferred bytes and return how long the caller should
    /// defer its next read, if any.
    pub fn observe(&mut self, n: usize, now: Instant) -> Option<Duration> {
        if self.bytes_per_sec == 0 {
            return None;
        }
        if now.duration_since(self.window_start) >= Duration::from_millis(3000) {
            self.window_start = now;
            self.transferred_in_window = 0;
        }
        self.transferred_in_window += n as u64;

        let elapsed_ms = now.duration_since(self.window_start).as_millis() as u64;
        let target_ms = self.transferred_in_window.saturating_mul(1000) / self.bytes_per_sec;
        if target_ms > elapsed_ms {
            Some(Duration::from_millis(target_ms - elapsed_ms))
        } else {
            None
        }
    }
}

/// Run one direction's source→sink loop until the source is exhausted,
/// driving up to `YIELD_AFTER_BYTES`/`YIELD_AFTER_DURATION` worth of work
/// per pass and yielding cooperatively in between.
pub async fn pump_direction<Src, Sink>(
    source: &mut ReadSide<Src>,
    sink: &mut WriteSide<Sink>,
    queue: &mut BufferQueue,
    rate: &mut Option<RateLimiter>,
) -> Result<()>
where
    Src: tokio::io::AsyncRead + Unpin,
    Sink: tokio::io::AsyncWrite + Unpin,
{
    loop {
        match pump_once(source, sink, queue, rate).await? {
            PumpOutcome::SourceClosed => {
                sink.shutdown().await?;
                return Ok(());
            },
            PumpOutcome::Yielded => {
                tokio::task::yield_now().await;
            },
        }
    }
}

/// One budgeted pass of read→write. Exposed separately from
/// `pump_direction` so tests can observe a single pass without running to
/// completion.
pub async fn pump_once<Src, Sink>(
    source: &mut ReadSide<Src>,
    sink: &mut WriteSide<Sink>,
    queue: &mut BufferQueue,
    rate: &mut Option<RateLimiter>,
) -> Result<PumpOutcome>
where
    Src: tokio::io::AsyncRead + Unpin,
    Sink: tokio::io::AsyncWrite + Unpin,
{
    let pass_start = Instant::now();
    let mut processed = 0usize;
    let mut source_closed = false;

    loop {
        if queue.is_empty() && !source_closed {
            let mut buf = [0u8; 16 * 1024];
            match source.read_some(&mut buf).await {
                Ok(0) => source_closed = true,
                Ok(n) => {
                    queue.push_bytes(&buf[..n]);
                    processed += n;
                    if let Some(limiter) = rate.as_mut() {
                        if let Some(delay) = limiter.observe(n, Instant::now()) {
                            tokio::time::sleep(delay).await;
                        }
                    }
                },
                Err(e) if e.is_transient() => {},
                Err(e) => return Err(e),
            }
        }

        while !queue.is_empty() {
            let Some(front) = queue.front() else { break };
            match sink.write_some(front.as_slice()).await {
                Ok(n) => queue.trim_front(n),
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e),
            }
        }

        if source_closed && queue.is_empty() {
            return Ok(PumpOutcome::SourceClosed);
        }
        if processed >= YIELD_AFTER_BYTES || pass_start.elapsed() >= YIELD_AFTER_DURATION {
            return Ok(PumpOutcome::Yielded);
        }
        if queue.is_empty() && !source_closed {
            // Nothing more to do without blocking on the next read.
            return Ok(PumpOutcome::Yielded);
        }
    }
}

/// Drive both directions of a connection concurrently until both sources
/// are closed: the connection is closed only once both directions have
/// completed.
pub async fn run_bidirectional<A, B>(
    downstream: SocketAdapter<A>,
    upstream: SocketAdapter<B>,
) -> Result<()>
where
    A: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    B: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut down_to_up = BufferQueue::new();
    let mut up_to_down = BufferQueue::new();
    let mut no_rate_down = None;
    let mut no_rate_up = None;

    // Each direction needs to both read one adapter and write the other;
    // pairing them as two SocketAdapter values would mean both futures
    // borrow both adapters, which the borrow checker rejects. Splitting
    // each into independent read/write halves first gives every future
    // its own pair of owned values instead.
    let (mut down_r, mut down_w) = downstream.split();
    let (mut up_r, mut up_w) = upstream.split();

    let down_fut = pump_direction(&mut down_r, &mut up_w, &mut down_to_up, &mut no_rate_down);
    let up_fut = pump_direction(&mut up_r, &mut down_w, &mut up_to_down, &mut no_rate_up);

    match tokio::try_join!(down_fut, up_fut) {
        Ok(((), ())) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn pump_direction_forwards_bytes_and_halts_on_eof() {
        let (client_a, client_b) = duplex(1024);
        let (up_a, up_b) = duplex(1024);

        let mut client_writer = SocketAdapter::new(client_a);
        let mut source = ReadSide::new(client_b);
        let mut sink = WriteSide::new(up_a);
        let mut up_reader = SocketAdapter::new(up_b);

        client_writer.write_some(b"hello upstream").await.unwrap();
        client_writer.shutdown().await.unwrap();

        let mut queue = BufferQueue::new();
        let mut rate = None;
        pump_direction(&mut source, &mut sink, &mut queue, &mut rate).await.unwrap();

        let mut buf = [0u8; 32];
        let n = up_reader.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello upstream");
    }

    #[test]
    fn rate_limiter_allows_unlimited_when_zero() {
        let mut limiter = RateLimiter::new(0);
        assert_eq!(limiter.observe(1_000_000, Instant::now()), None);
    }

    #[test]
    fn rate_limiter_defers_when_over_budget() {
        let mut limiter = RateLimiter::new(100);
        let start = Instant::now();
        let delay = limiter.observe(1000, start);
        assert!(delay.is_some(), "transferring 10x the per-second budget instantly must defer");
    }
}
