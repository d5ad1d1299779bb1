//! Length-prefixed JSON event stream.
//!
//! Each event is a single JSON object, preceded by its byte length on its
//! own line, so a consumer can read events off a pipe without a streaming
//! JSON parser:
//!
//! ```text
//! 52
//! {"phase":"start","time":"2024-01-15T10:30:00+00:00"}
//! 108
//! {"phase":"start_task","type":"sync","name":"hi","command":"debug","args":"msg=hi","vars":{"msg":"hi"},"delta":0.001}
//! ```

use std::io::{self, Write};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::super::Reporter;
use crate::executor::runner::Runner;
use crate::executor::task::{Task, TaskResult};
use crate::expr::Vars;

/// Whether a task ran inline or deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Sync,
    Async,
}

/// One event of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ChunkEvent {
    Start {
        time: DateTime<Utc>,
    },
    Finish,
    StartHandlers,
    FinishHandlers,
    StartTask {
        #[serde(rename = "type")]
        kind: TaskKind,
        name: String,
        command: String,
        args: String,
        vars: Vars,
        /// Seconds since the run started
        delta: f64,
    },
    FinishTask {
        delta: f64,
        result: TaskResult,
    },
}

/// Writes every event as `<len>\n<json>\n`.
pub struct JsonChunkReporter {
    out: Mutex<Box<dyn Write + Send>>,
    start: Mutex<Instant>,
}

impl std::fmt::Debug for JsonChunkReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonChunkReporter").finish_non_exhaustive()
    }
}

impl JsonChunkReporter {
    /// Creates a reporter writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            start: Mutex::new(Instant::now()),
        }
    }

    fn delta(&self) -> f64 {
        self.start.lock().elapsed().as_secs_f64()
    }

    fn send(&self, event: &ChunkEvent) {
        let body = match serde_json::to_string(event) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize report event");
                return;
            }
        };
        let mut out = self.out.lock();
        let _ = write!(out, "{}\n{}\n", body.len(), body);
        let _ = out.flush();
    }
}

impl Default for JsonChunkReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonChunkReporter {
    fn start_tasks(&self, runner: &Runner) {
        *self.start.lock() = Instant::now();
        self.send(&ChunkEvent::Start {
            time: runner.start(),
        });
    }

    fn finish_tasks(&self, _runner: &Runner) {
        self.send(&ChunkEvent::Finish);
    }

    fn start_handlers(&self, _runner: &Runner) {
        self.send(&ChunkEvent::StartHandlers);
    }

    fn finish_handlers(&self, _runner: &Runner) {
        self.send(&ChunkEvent::FinishHandlers);
    }

    fn start_task(&self, task: &Task, name: &str, args: &str, vars: &Vars) {
        let kind = if task.is_deferred() {
            TaskKind::Async
        } else {
            TaskKind::Sync
        };
        self.send(&ChunkEvent::StartTask {
            kind,
            name: name.to_string(),
            command: task.command.clone(),
            args: args.to_string(),
            vars: vars.clone(),
            delta: self.delta(),
        });
    }

    fn finish_task(&self, _task: &Task, result: Option<&TaskResult>) {
        if let Some(res) = result {
            self.send(&ChunkEvent::FinishTask {
                delta: self.delta(),
                result: res.clone(),
            });
        }
    }
}

/// Splits a length-prefixed stream back into events.
pub fn read_chunks(stream: &str) -> serde_json::Result<Vec<ChunkEvent>> {
    let mut events = Vec::new();
    let mut lines = stream.lines();
    while let Some(len) = lines.next() {
        if len.trim().is_empty() {
            continue;
        }
        let body = lines.next().unwrap_or_default();
        events.push(serde_json::from_str(body)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_length_prefix_matches_body() {
        let buf = Buf::default();
        let reporter = JsonChunkReporter::with_writer(buf.clone());

        let mut vars = Vars::new();
        vars.insert("msg".into(), Value::from("hi"));
        reporter.start_task(&Task::new("hi", "debug"), "hi", "msg=hi", &vars);

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        let mut lines = text.lines();
        let len: usize = lines.next().unwrap().parse().unwrap();
        let body = lines.next().unwrap();
        assert_eq!(len, body.len());

        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["phase"], "start_task");
        assert_eq!(json["type"], "sync");
        assert_eq!(json["command"], "debug");
        assert_eq!(json["vars"]["msg"], "hi");
    }

    #[test]
    fn test_finish_task_without_result_is_silent() {
        let buf = Buf::default();
        let reporter = JsonChunkReporter::with_writer(buf.clone());
        let task = Task::new("bg", "shell").future("bg");

        reporter.finish_task(&task, None);
        assert!(buf.0.lock().is_empty());

        reporter.start_task(&task, "bg", "", &Vars::new());
        reporter.finish_task(&task, Some(&TaskResult::changed()));

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        let events = read_chunks(&text).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ChunkEvent::StartTask {
                kind: TaskKind::Async,
                ..
            }
        ));
        match &events[1] {
            ChunkEvent::FinishTask { result, .. } => assert!(result.changed),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_phase_names() {
        let json = serde_json::to_string(&ChunkEvent::StartHandlers).unwrap();
        assert_eq!(json, r#"{"phase":"start_handlers"}"#);
    }
}
