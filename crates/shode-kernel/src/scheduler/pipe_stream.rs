//! In-memory byte pipe connecting in-process pipeline stages.
//!
//! ```text
//!   PipeWriter ──▶ [bounded VecDeque<u8>] ──▶ PipeReader
//!                  ├── full buffer parks the writer
//!                  ├── empty buffer parks the reader
//!                  ├── writer dropped → reader sees EOF once drained
//!                  ├── reader dropped → writer gets BrokenPipe
//!                  └── PipeCloser::close → both ends released immediately
//! ```
//!
//! The lock is a `std::sync::Mutex`: every critical section is a deque
//! operation plus waker bookkeeping, and `Drop` must stay synchronous.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Capacity of a pipeline pipe, the Linux default pipe size.
pub const PIPE_CAPACITY: usize = 64 * 1024;

struct Ring {
    bytes: VecDeque<u8>,
    capacity: usize,
    parked_reader: Option<Waker>,
    parked_writer: Option<Waker>,
}

struct Shared {
    ring: Mutex<Ring>,
    writer_gone: AtomicBool,
    reader_gone: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_reader(&self) {
        if let Some(w) = self.lock().parked_reader.take() {
            w.wake();
        }
    }

    fn wake_writer(&self) {
        if let Some(w) = self.lock().parked_writer.take() {
            w.wake();
        }
    }
}

/// Writing half of a pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

/// Reading half of a pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

/// Releases both ends of a pipe without owning either.
///
/// Used on cancellation: a stage blocked on a full or empty pipe wakes up
/// and sees EOF or `BrokenPipe` even though its peer task never dropped.
#[derive(Clone)]
pub struct PipeCloser {
    shared: Arc<Shared>,
}

impl PipeCloser {
    pub fn close(&self) {
        self.shared.writer_gone.store(true, Ordering::Release);
        self.shared.reader_gone.store(true, Ordering::Release);
        let mut ring = self.shared.lock();
        ring.bytes.clear();
        if let Some(w) = ring.parked_reader.take() {
            w.wake();
        }
        if let Some(w) = ring.parked_writer.take() {
            w.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.reader_gone.load(Ordering::Acquire)
            && self.shared.writer_gone.load(Ordering::Acquire)
    }
}

/// Create a pipe holding at most `capacity` unread bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            bytes: VecDeque::with_capacity(capacity.min(8192)),
            capacity: capacity.max(1),
            parked_reader: None,
            parked_writer: None,
        }),
        writer_gone: AtomicBool::new(false),
        reader_gone: AtomicBool::new(false),
    });
    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl PipeWriter {
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: self.shared.clone(),
        }
    }

    /// Write as much of `data` as fits, waiting while the pipe is full.
    pub async fn write_some(&self, data: &[u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_push(cx, data)).await
    }

    /// Write all of `data`.
    pub async fn write_all_bytes(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.write_some(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    fn poll_push(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut ring = self.shared.lock();
        // Checked under the lock so a concurrent reader drop cannot slip between.
        if self.shared.reader_gone.load(Ordering::Acquire) {
            return Poll::Ready(Err(broken_pipe()));
        }
        let room = ring.capacity.saturating_sub(ring.bytes.len());
        if room == 0 {
            ring.parked_writer = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = room.min(data.len());
        ring.bytes.extend(&data[..n]);
        if let Some(w) = ring.parked_reader.take() {
            w.wake();
        }
        Poll::Ready(Ok(n))
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_push(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shared.writer_gone.store(true, Ordering::Release);
        self.shared.wake_reader();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.writer_gone.store(true, Ordering::Release);
        self.shared.wake_reader();
    }
}

impl PipeReader {
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: self.shared.clone(),
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut ring = self.shared.lock();
        if ring.bytes.is_empty() {
            if self.shared.writer_gone.load(Ordering::Acquire) {
                return Poll::Ready(Ok(()));
            }
            ring.parked_reader = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(ring.bytes.len());
        let (front, back) = ring.bytes.as_slices();
        if n <= front.len() {
            buf.put_slice(&front[..n]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..n - front.len()]);
        }
        ring.bytes.drain(..n);
        if let Some(w) = ring.parked_writer.take() {
            w.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.reader_gone.store(true, Ordering::Release);
        self.shared.wake_writer();
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn bytes_arrive_in_order_then_eof() {
        let (writer, mut reader) = pipe(1024);
        writer.write_all_bytes(b"hello\n").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn small_buffer_applies_backpressure_without_loss() {
        let (writer, mut reader) = pipe(16);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let producer = tokio::spawn(async move {
            writer.write_all_bytes(&data).await.unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn dropped_reader_breaks_the_pipe() {
        let (writer, reader) = pipe(8);
        drop(reader);
        let err = writer.write_some(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn async_write_shutdown_signals_eof() {
        let (mut writer, mut reader) = pipe(64);
        writer.write_all(b"via trait").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"via trait");
    }

    #[tokio::test]
    async fn closer_unblocks_parked_writer_and_reader() {
        let (writer, reader) = pipe(4);
        let closer = writer.closer();

        let blocked_writer = tokio::spawn(async move {
            // Larger than capacity: parks once the ring is full.
            writer.write_all_bytes(&[0u8; 64]).await
        });

        let (idle_writer, mut idle_reader) = pipe(4);
        let idle_closer = idle_reader.closer();
        let blocked_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            idle_reader.read_to_end(&mut buf).await.map(|_| buf)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close();
        idle_closer.close();

        let write_result = tokio::time::timeout(Duration::from_secs(2), blocked_writer)
            .await
            .expect("writer stayed parked")
            .unwrap();
        assert_eq!(write_result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);

        let read_result = tokio::time::timeout(Duration::from_secs(2), blocked_reader)
            .await
            .expect("reader stayed parked")
            .unwrap();
        assert!(read_result.unwrap().is_empty());
        assert!(closer.is_closed());

        drop(reader);
        drop(idle_writer);
    }

    #[tokio::test]
    async fn many_small_writes_do_not_lose_wakeups() {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            let (writer, mut reader) = pipe(16);
            let producer = tokio::spawn(async move {
                for i in 0u32..1000 {
                    writer.write_all_bytes(&i.to_le_bytes()).await.unwrap();
                }
            });
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            producer.await.unwrap();
            out.len()
        })
        .await;
        assert_eq!(result.expect("pipe stalled"), 4000);
    }
}
