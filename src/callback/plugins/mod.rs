//! Built-in reporters.
//!
//! | Reporter | Output |
//! |----------|--------|
//! | [`CliReporter`] | `  1.234 - task name` lines with colored results |
//! | [`JsonChunkReporter`] | `<len>\n<json>\n` chunks, one per event |
//! | [`StructReporter`] | nothing; keeps a [`RunRecord`] in memory |
//! | [`NullReporter`] | nothing |

pub mod cli;
pub mod json;
pub mod null;
pub mod structured;

pub use cli::CliReporter;
pub use json::{read_chunks, ChunkEvent, JsonChunkReporter, TaskKind};
pub use null::NullReporter;
pub use structured::{RunRecord, StructReporter, TaskRecord, MAX_TASK_RECORDS};
