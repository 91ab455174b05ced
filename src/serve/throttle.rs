// src/serve/throttle.rs
// Per-download bandwidth shaping: a token bucket and a reader that waits on it

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Largest single read released at once, so the first bytes of a response
/// are not held back for a whole second at high rates.
const MAX_CHUNK: usize = 64 * 1024;

/// Token bucket in bytes. Fill rate and capacity are both `rate` per second.
///
/// `take` always grants the request and reports how long the caller has to
/// wait before using it; the balance may go negative meanwhile.
#[derive(Debug)]
pub struct BandwidthBucket {
    rate: f64,
    capacity: f64,
    available: f64,
    last_fill: Instant,
}

impl BandwidthBucket {
    /// A bucket that starts empty, so throughput never exceeds `rate`.
    pub fn new(rate: u64) -> Self {
        let rate = rate.max(1) as f64;
        BandwidthBucket {
            rate,
            capacity: rate,
            available: 0.0,
            last_fill: Instant::now(),
        }
    }

    pub fn max_chunk(&self) -> usize {
        (self.capacity as usize).clamp(1, MAX_CHUNK)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_fill).as_secs_f64();
        self.last_fill = now;
        self.available = (self.available + elapsed * self.rate).min(self.capacity);
    }

    /// Consume `n` tokens and return the wait until they are covered.
    pub fn take(&mut self, n: u64) -> Duration {
        self.refill();
        self.available -= n as f64;
        if self.available >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.available / self.rate)
        }
    }

    /// Give back tokens that were taken but not used.
    pub fn refund(&mut self, n: u64) {
        self.available = (self.available + n as f64).min(self.capacity);
    }
}

/// Reader that releases bytes only after the bucket has paid for them.
///
/// Each read reserves tokens for up to one chunk, sleeps off any deficit,
/// then reads at most the reserved amount and refunds the rest. Dropping
/// the reader (client gone) drops the pending sleep with it.
pub struct ThrottledReader<R> {
    inner: R,
    bucket: BandwidthBucket,
    delay: Option<Pin<Box<Sleep>>>,
    reserved: usize,
    scratch: Vec<u8>,
}

impl<R> ThrottledReader<R> {
    pub fn new(inner: R, bytes_per_sec: u64) -> Self {
        ThrottledReader {
            inner,
            bucket: BandwidthBucket::new(bytes_per_sec),
            delay: None,
            reserved: 0,
            scratch: Vec::new(),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.reserved == 0 && this.delay.is_none() {
            let want = buf.remaining().min(this.bucket.max_chunk());
            let wait = this.bucket.take(want as u64);
            this.reserved = want;
            if !wait.is_zero() {
                this.delay = Some(Box::pin(tokio::time::sleep(wait)));
            }
        }

        if let Some(delay) = this.delay.as_mut() {
            ready!(delay.as_mut().poll(cx));
            this.delay = None;
        }

        let len = this.reserved.min(buf.remaining());
        if this.scratch.len() < len {
            this.scratch.resize(len, 0);
        }
        let mut chunk = ReadBuf::new(&mut this.scratch[..len]);
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk))?;

        let read = chunk.filled().len();
        buf.put_slice(chunk.filled());
        this.bucket.refund((this.reserved - read) as u64);
        this.reserved = 0;
        Poll::Ready(Ok(()))
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for ThrottledReader<R> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}
