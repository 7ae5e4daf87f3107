use hybrid_pool_core::{Limit, ManagerConfig, PoolConfigFile};
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

/// Pool settings shared by every command that runs a pool. Flags override whatever the
/// config file says.
#[derive(Default, Debug, Clone, StructOpt)]
pub struct Flags {
    #[structopt(
        help = r"A JSON file (comments allowed) to read the pool configuration from.",
        short = "c",
        long = "config"
    )]
    pub(crate) config: Option<PathBuf>,

    #[structopt(
        help = r"The pool mode to run: one of the tags listed by `hpx modes`.",
        short = "m",
        long = "mode"
    )]
    pub(crate) mode: Option<String>,

    #[structopt(
        help = r"The amount of workers in the pool. Use -1 to grow with the queue.
Defaults to the number of CPUs.
",
        short = "w",
        long = "workers",
        allow_hyphen_values = true
    )]
    pub(crate) num_workers: Option<i64>,

    #[structopt(
        help = r"Spawn workers one at a time as tasks queue up.",
        long = "incremental"
    )]
    pub(crate) incremental: bool,

    #[structopt(
        help = r"Seconds a worker may sit idle before it closes itself.",
        long = "idle-timeout"
    )]
    pub(crate) idle_timeout: Option<f64>,

    #[structopt(
        help = r"Tasks a worker runs before it is restarted. Use -1 for no limit.",
        long = "max-task-count",
        allow_hyphen_values = true
    )]
    pub(crate) max_task_count: Option<i64>,

    #[structopt(
        help = r"Failed tasks a worker tolerates before it is restarted. Use -1 for no limit.",
        long = "max-err-count",
        allow_hyphen_values = true
    )]
    pub(crate) max_err_count: Option<i64>,

    #[structopt(
        help = r"Failed tasks in a row a worker tolerates before it is restarted. Use -1 for no limit.",
        long = "max-cons-err-count",
        allow_hyphen_values = true
    )]
    pub(crate) max_cons_err_count: Option<i64>,
}

impl Flags {
    pub async fn into_config(self) -> Result<ManagerConfig, anyhow::Error> {
        let mut file = match &self.config {
            Some(path) => PoolConfigFile::read(path).await?,
            None => PoolConfigFile::default(),
        };

        if let Some(mode) = self.mode {
            file.mode = Some(mode);
        }
        match self.num_workers {
            Some(n) => file.num_workers = Some(Limit::from_signed(n)),
            None if file.num_workers.is_none() => {
                file.num_workers = Some(Limit::AtMost(num_cpus::get() as u64))
            }
            None => (),
        }
        if self.incremental {
            file.incremental = Some(true);
        }
        if let Some(secs) = self.idle_timeout {
            file.worker.idle_timeout = Some(hybrid_pool_core::util::seconds_or_zero(secs));
        }
        if let Some(n) = self.max_task_count {
            file.worker.max_task_count = Some(n.into());
        }
        if let Some(n) = self.max_err_count {
            file.worker.max_err_count = Some(n.into());
        }
        if let Some(n) = self.max_cons_err_count {
            file.worker.max_cons_err_count = Some(n.into());
        }

        Ok(file.into_config()?)
    }
}

/// Parses a number of milliseconds.
pub(crate) fn parse_millis(s: &str) -> Result<Duration, std::num::ParseIntError> {
    s.parse().map(Duration::from_millis)
}
