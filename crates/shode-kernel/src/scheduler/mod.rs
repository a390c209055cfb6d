//! Pipe wiring and process execution.
//!
//! Every command, whatever it dispatches to, talks to the world through an
//! [`InputSource`] and two [`OutputSink`]s. In-process stages read and write
//! the bounded in-memory pipes directly; external stages are bound to them
//! through copier tasks on the child's OS pipes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       run_stages                             │
//! │  ┌──────────┐  pipe()  ┌──────────┐  pipe()  ┌─────────────┐ │
//! │  │ builtin  │─────────▶│ function │─────────▶│ external    │ │
//! │  │  (task)  │  64 KiB  │  (task)  │  64 KiB  │ (task+child)│ │
//! │  └──────────┘          └──────────┘          └─────────────┘ │
//! │  cancel: SIGTERM/SIGKILL groups → close pipes → abort tasks  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod pipe_stream;
mod pipeline;
mod process;
mod stdio;

pub use pipe_stream::{pipe, PipeCloser, PipeReader, PipeWriter, PIPE_CAPACITY};
pub use pipeline::{pipeline_status, run_stages, wire, StageFuture, StageIo};
pub use process::{exit_code, resolve_executable, run_process, ProcessIo, ProcessSpec};
pub use stdio::{CaptureBuffer, InputSource, OutputSink, SinkKind, SourceKind};
