//! # Scheduling modes
//!
//! A mode decides how a worker runs the tasks it picks up, and how managers, workers and tasks
//! in a pool get named. Modes are looked up by tag, so configuration files and command line
//! flags can refer to them as plain strings.
//!
use crate::config::ConfigError;
use crate::model::CallableKind;
use crate::worker::{cooperative, threaded, WorkerContext};
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Default, Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Many tasks interleave on a single-threaded scheduler inside each worker.
    #[default]
    Async,

    /// Each worker runs one task at a time on its own thread.
    Thread,
}

impl Mode {
    pub fn spec(&self) -> &'static ModeSpec {
        match self {
            Mode::Async => &MODES[0],
            Mode::Thread => &MODES[1],
        }
    }

    pub fn tag(&self) -> &'static str {
        self.spec().tag()
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(s)
            .map(|spec| spec.mode())
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything a manager needs to know to run a pool in a given [Mode].
///
pub struct ModeSpec {
    mode: Mode,
    tags: &'static [&'static str],
    prefix: &'static str,
    description: &'static str,
    accepts_blocking: bool,
    pub(crate) runner: fn(WorkerContext),
}

impl ModeSpec {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The canonical tag of this mode.
    pub fn tag(&self) -> &'static str {
        self.tags[0]
    }

    pub fn tags(&self) -> &'static [&'static str] {
        self.tags
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn accepts(&self, kind: CallableKind) -> bool {
        match kind {
            CallableKind::Async => true,
            CallableKind::Blocking => self.accepts_blocking,
        }
    }

    pub fn manager_name(&self, suffix: &str) -> String {
        format!("{}Manager-{}", self.prefix, suffix)
    }

    pub fn worker_name(&self, seq: u64, manager: &str) -> String {
        format!("{}Worker-{} [{}]", self.prefix, seq, manager)
    }

    pub fn task_name(&self, seq: u64, manager: &str) -> String {
        format!("{}Task-{} [{}]", self.prefix, seq, manager)
    }
}

impl std::fmt::Debug for ModeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeSpec")
            .field("mode", &self.mode)
            .field("tags", &self.tags)
            .finish()
    }
}

static MODES: [ModeSpec; 2] = [
    ModeSpec {
        mode: Mode::Async,
        tags: &["async", "coroutine"],
        prefix: "Async",
        description: "cooperative tasks on a single-threaded scheduler per worker",
        accepts_blocking: false,
        runner: cooperative::run,
    },
    ModeSpec {
        mode: Mode::Thread,
        tags: &["thread", "threaded"],
        prefix: "Thread",
        description: "one task at a time on a dedicated thread per worker",
        accepts_blocking: true,
        runner: threaded::run,
    },
];

pub fn all() -> &'static [ModeSpec] {
    &MODES
}

pub fn lookup(tag: &str) -> Option<&'static ModeSpec> {
    let tag = tag.trim().to_lowercase();
    MODES.iter().find(|spec| spec.tags.contains(&tag.as_str()))
}
