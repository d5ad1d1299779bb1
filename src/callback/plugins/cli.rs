//! Console reporter.
//!
//! Every line is prefixed with the seconds elapsed since the run started.
//!
//! ```text
//! == tasks @ 2024-01-15T10:30:00+00:00
//!   0.001 - install nginx
//!   0.412 * Changed:
//!   0.412   rc: 0, stdout: "installed"
//!   0.413 - warm cache &
//!   1.020 = All tasks to finish
//!   1.020 + Running any handlers
//!   1.021 - restart nginx
//!   1.300 * Changed:
//!   1.300   OK
//!   1.300 = All handlers to finish
//!   1.300 = All finish
//! ```
//!
//! Colors are disabled when `NO_COLOR` is set.

use std::fmt::Display;
use std::io::{self, Write};
use std::time::Instant;

use colored::Colorize;
use parking_lot::Mutex;

use super::super::Reporter;
use crate::error::Error;
use crate::executor::runner::Runner;
use crate::executor::task::{Task, TaskResult};
use crate::expr::{Value, Vars};

/// Longest stdout rendered inline for shell-like results
const INLINE_STDOUT_MAX: usize = 60;

/// Human-readable console reporter.
pub struct CliReporter {
    out: Mutex<Box<dyn Write + Send>>,
    start: Mutex<Instant>,
    show_output: bool,
    debug: bool,
    use_color: bool,
}

impl std::fmt::Debug for CliReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliReporter")
            .field("show_output", &self.show_output)
            .field("debug", &self.debug)
            .field("use_color", &self.use_color)
            .finish_non_exhaustive()
    }
}

impl CliReporter {
    /// Creates a reporter writing to stdout.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Creates a reporter writing to `out`.
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            start: Mutex::new(Instant::now()),
            show_output: false,
            debug: false,
            use_color: std::env::var("NO_COLOR").is_err(),
        }
    }

    /// Also print each task's parameters and full result data.
    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    /// Print the error that ended the run.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.use_color = !no_color && std::env::var("NO_COLOR").is_err();
        self
    }

    fn elapsed(&self) -> f64 {
        self.start.lock().elapsed().as_secs_f64()
    }

    fn line(&self, text: impl Display) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{}", text);
        let _ = out.flush();
    }

    /// Writes `marker text` with the elapsed-time prefix.
    fn event(&self, marker: char, text: impl Display) {
        self.line(format!("{:7.3} {} {}", self.elapsed(), marker, text));
    }

    fn label(&self, res: &TaskResult) -> String {
        let (text, plain) = if res.failed {
            ("Failed".red().bold(), "Failed")
        } else if res.changed {
            ("Changed".yellow(), "Changed")
        } else {
            ("OK".green(), "OK")
        };
        if self.use_color {
            text.to_string()
        } else {
            plain.to_string()
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders `k=v` pairs on one line.
pub(crate) fn inline_vars(vars: &Vars) -> String {
    vars.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact rendering for results carrying `rc`, `stdout` and `stderr`.
fn render_shell_result(res: &TaskResult) -> Option<String> {
    let rc = match res.get("rc")? {
        Value::Int(rc) => *rc,
        _ => return None,
    };
    let stdout = res.get("stdout")?.as_str()?;
    let stderr = res.get("stderr")?.as_str()?;

    if rc == 0 && stdout.is_empty() && stderr.is_empty() {
        Some("OK".to_string())
    } else if stderr.is_empty() && stdout.len() < INLINE_STDOUT_MAX {
        Some(format!(r#"rc: {}, stdout: "{}""#, rc, stdout.replace('\n', " ")))
    } else {
        None
    }
}

impl Reporter for CliReporter {
    fn start_tasks(&self, runner: &Runner) {
        *self.start.lock() = Instant::now();
        self.line(format!("== tasks @ {}", runner.start().to_rfc3339()));
    }

    fn finish_tasks(&self, _runner: &Runner) {
        self.event('=', "All tasks to finish");
    }

    fn start_handlers(&self, _runner: &Runner) {
        self.event('+', "Running any handlers");
    }

    fn finish_handlers(&self, _runner: &Runner) {
        self.event('=', "All handlers to finish");
    }

    fn start_task(&self, task: &Task, name: &str, _args: &str, vars: &Vars) {
        if task.is_deferred() {
            self.event('-', format!("{} &", name));
        } else {
            self.event('-', name);
        }

        if self.show_output {
            self.event(' ', format!("{}: {}", task.command, inline_vars(vars)));
        }
    }

    fn finish_task(&self, _task: &Task, result: Option<&TaskResult>) {
        let Some(res) = result else {
            return;
        };
        let label = self.label(res);

        if let Some(text) = render_shell_result(res) {
            self.event('*', format!("{}:", label));
            self.event(' ', text.trim());
            return;
        }

        if !res.data.is_empty() {
            self.event('*', format!("{}:", label));
            if self.show_output {
                for (key, value) in &res.data {
                    self.event(' ', format!("{}: {}", key, value));
                }
            } else if let Some(msg) = res.msg() {
                self.event(' ', msg);
            }
        }
    }

    fn finish_all(&self, _runner: &Runner) {
        self.event('=', "All finish");
    }

    fn end_reporter(&self, _runner: &Runner, error: Option<&Error>) {
        if let (true, Some(err)) = (self.debug, error) {
            let text = format!("Run aborted: {}", err);
            if self.use_color {
                self.event('!', text.red());
            } else {
                self.event('!', text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    impl Buf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn reporter(buf: &Buf) -> CliReporter {
        CliReporter::with_writer(buf.clone()).with_no_color(true)
    }

    #[test]
    fn test_start_task_line() {
        let buf = Buf::default();
        let cli = reporter(&buf);

        cli.start_task(&Task::new("t", "shell"), "install nginx", "", &Vars::new());
        cli.start_task(&Task::new("t", "shell").future("f"), "warm", "", &Vars::new());

        let text = buf.text();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(" - install nginx"));
        assert!(lines[1].ends_with(" - warm &"));
        // `%7.3f` prefix
        assert_eq!(lines[0].find(" - "), Some(7));
    }

    #[test]
    fn test_shell_result_rendering() {
        let res = TaskResult::changed()
            .with("rc", 0)
            .with("stdout", "a\nb")
            .with("stderr", "");
        assert_eq!(render_shell_result(&res).as_deref(), Some(r#"rc: 0, stdout: "a b""#));

        let quiet = TaskResult::ok()
            .with("rc", 0)
            .with("stdout", "")
            .with("stderr", "");
        assert_eq!(render_shell_result(&quiet).as_deref(), Some("OK"));

        assert!(render_shell_result(&TaskResult::ok().with("msg", "x")).is_none());
    }

    #[test]
    fn test_finish_task_labels() {
        let buf = Buf::default();
        let cli = reporter(&buf);
        let task = Task::new("t", "debug");

        cli.finish_task(&task, Some(&TaskResult::ok().with_msg("hello")));
        cli.finish_task(&task, Some(&TaskResult::failed("boom")));
        cli.finish_task(&task, None);

        let text = buf.text();
        assert!(text.contains("* OK:"));
        assert!(text.contains("hello"));
        assert!(text.contains("* Failed:"));
        assert!(text.contains("boom"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_inline_vars() {
        let mut vars = Vars::new();
        vars.insert("a".into(), Value::Int(1));
        vars.insert("b".into(), Value::from("x"));
        assert_eq!(inline_vars(&vars), "a=1 b=x");
    }
}
