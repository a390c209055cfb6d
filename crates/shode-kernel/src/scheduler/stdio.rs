//! Standard stream endpoints handed to every command.
//!
//! A command sees one [`InputSource`] and two [`OutputSink`]s. Both are
//! cheap handles around a shared endpoint, so a function body, a `2>&1`
//! redirect or a copier task can all hold the same stream.

use std::io::{self, Cursor};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::pipe_stream::{PipeCloser, PipeReader, PipeWriter};

/// In-memory destination for captured output.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<StdMutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, data: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
    }

    /// A copy of everything captured so far.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove and return everything captured so far.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.bytes.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text captured from byte `offset` on.
    pub fn since(&self, offset: usize) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let start = offset.min(bytes.len());
        String::from_utf8_lossy(&bytes[start..]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Capture,
    Pipe,
    File,
    Stdout,
    Stderr,
    Null,
}

enum SinkTarget {
    Capture(CaptureBuffer),
    Pipe(PipeWriter),
    File(File),
    Stdout(tokio::io::Stdout),
    Stderr(tokio::io::Stderr),
    Null,
}

/// Where a command's stdout or stderr goes.
#[derive(Clone)]
pub struct OutputSink {
    target: Arc<Mutex<SinkTarget>>,
    kind: SinkKind,
    closer: Option<PipeCloser>,
}

impl OutputSink {
    fn new(target: SinkTarget, kind: SinkKind, closer: Option<PipeCloser>) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
            kind,
            closer,
        }
    }

    /// A sink that records into a fresh buffer.
    pub fn capture() -> (Self, CaptureBuffer) {
        let buf = CaptureBuffer::new();
        (Self::capture_into(buf.clone()), buf)
    }

    pub fn capture_into(buf: CaptureBuffer) -> Self {
        Self::new(SinkTarget::Capture(buf), SinkKind::Capture, None)
    }

    pub fn pipe(writer: PipeWriter) -> Self {
        let closer = writer.closer();
        Self::new(SinkTarget::Pipe(writer), SinkKind::Pipe, Some(closer))
    }

    pub fn file(file: File) -> Self {
        Self::new(SinkTarget::File(file), SinkKind::File, None)
    }

    pub fn stdout() -> Self {
        Self::new(SinkTarget::Stdout(tokio::io::stdout()), SinkKind::Stdout, None)
    }

    pub fn stderr() -> Self {
        Self::new(SinkTarget::Stderr(tokio::io::stderr()), SinkKind::Stderr, None)
    }

    pub fn null() -> Self {
        Self::new(SinkTarget::Null, SinkKind::Null, None)
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    /// The handle that force-closes the pipe behind this sink, if any.
    pub fn pipe_closer(&self) -> Option<PipeCloser> {
        self.closer.clone()
    }

    /// Whether both handles write to the same endpoint.
    pub fn same_target(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }

    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut target = self.target.lock().await;
        match &mut *target {
            SinkTarget::Capture(buf) => {
                buf.push(data);
                Ok(())
            }
            SinkTarget::Pipe(w) => w.write_all_bytes(data).await,
            SinkTarget::File(f) => f.write_all(data).await,
            SinkTarget::Stdout(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
            SinkTarget::Stderr(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
            SinkTarget::Null => Ok(()),
        }
    }

    pub async fn write_str(&self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes()).await
    }

    pub async fn flush(&self) -> io::Result<()> {
        let mut target = self.target.lock().await;
        match &mut *target {
            SinkTarget::File(f) => f.flush().await,
            SinkTarget::Stdout(s) => s.flush().await,
            SinkTarget::Stderr(s) => s.flush().await,
            _ => Ok(()),
        }
    }

    /// Release the underlying endpoint so readers on the other side see EOF.
    pub async fn close(&self) {
        let mut target = self.target.lock().await;
        if let SinkTarget::File(f) = &mut *target {
            let _ = f.flush().await;
        }
        *target = SinkTarget::Null;
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").field("kind", &self.kind).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Empty,
    Bytes,
    Pipe,
    File,
    Stdin,
}

enum SourceTarget {
    Empty,
    Bytes(Cursor<Vec<u8>>),
    Pipe(PipeReader),
    File(File),
    Stdin(tokio::io::Stdin),
}

/// Where a command's stdin comes from.
#[derive(Clone)]
pub struct InputSource {
    target: Arc<Mutex<SourceTarget>>,
    kind: SourceKind,
    closer: Option<PipeCloser>,
}

impl InputSource {
    fn new(target: SourceTarget, kind: SourceKind, closer: Option<PipeCloser>) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
            kind,
            closer,
        }
    }

    pub fn empty() -> Self {
        Self::new(SourceTarget::Empty, SourceKind::Empty, None)
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(
            SourceTarget::Bytes(Cursor::new(data.into())),
            SourceKind::Bytes,
            None,
        )
    }

    pub fn pipe(reader: PipeReader) -> Self {
        let closer = reader.closer();
        Self::new(SourceTarget::Pipe(reader), SourceKind::Pipe, Some(closer))
    }

    pub fn file(file: File) -> Self {
        Self::new(SourceTarget::File(file), SourceKind::File, None)
    }

    pub fn stdin() -> Self {
        Self::new(SourceTarget::Stdin(tokio::io::stdin()), SourceKind::Stdin, None)
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn pipe_closer(&self) -> Option<PipeCloser> {
        self.closer.clone()
    }

    /// Read up to `buf.len()` bytes; `Ok(0)` is end of input.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut target = self.target.lock().await;
        match &mut *target {
            SourceTarget::Empty => Ok(0),
            SourceTarget::Bytes(c) => c.read(buf).await,
            SourceTarget::Pipe(r) => r.read(buf).await,
            SourceTarget::File(f) => f.read(buf).await,
            SourceTarget::Stdin(s) => s.read(buf).await,
        }
    }

    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn read_to_string(&self) -> io::Result<String> {
        let bytes = self.read_to_end().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drop the underlying endpoint; later reads see end of input.
    pub async fn close(&self) {
        *self.target.lock().await = SourceTarget::Empty;
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource").field("kind", &self.kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::pipe_stream::pipe;

    #[tokio::test]
    async fn capture_sink_records_writes() {
        let (sink, buf) = OutputSink::capture();
        sink.write_str("a").await.unwrap();
        sink.clone().write_str("b\n").await.unwrap();
        assert_eq!(buf.to_string_lossy(), "ab\n");
        assert_eq!(buf.since(1), "b\n");
        assert!(sink.same_target(&sink.clone()));
        assert!(!sink.same_target(&OutputSink::null()));
        assert_eq!(buf.take(), b"ab\n");
        assert!(buf.contents().is_empty());
    }

    #[tokio::test]
    async fn closing_a_pipe_sink_ends_the_reader() {
        let (w, r) = pipe(64);
        let sink = OutputSink::pipe(w);
        let source = InputSource::pipe(r);

        sink.write_str("line\n").await.unwrap();
        sink.close().await;
        assert_eq!(source.read_to_string().await.unwrap(), "line\n");
    }

    #[tokio::test]
    async fn byte_source_reads_once() {
        let source = InputSource::bytes("abc");
        assert_eq!(source.read_to_string().await.unwrap(), "abc");
        assert_eq!(source.read_to_string().await.unwrap(), "");
        assert_eq!(InputSource::empty().read_to_end().await.unwrap(), b"");
    }
}
