use crate::flags::{parse_millis, Flags};
use crate::reporter::StatusReporter;
use anyhow::*;
use hybrid_pool_core::*;
use std::time::Duration;
use structopt::StructOpt;
use tracing::*;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "run",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Runs a synthetic workload on a pool and prints a summary"
)]
pub struct RunCommand {
    #[structopt(
        help = r"How many tasks to submit.",
        short = "n",
        long = "count",
        default_value = "100"
    )]
    count: u64,

    #[structopt(
        help = r"The share of tasks that fail, between 0 and 1.

Failures are spread evenly over the workload, so a rate of 0.25
fails every fourth task.
",
        long = "failure-rate",
        default_value = "0"
    )]
    failure_rate: f64,

    #[structopt(
        help = r"How long every task takes, in milliseconds.",
        short = "d",
        long = "delay",
        default_value = "10",
        parse(try_from_str = parse_millis)
    )]
    delay: Duration,

    #[structopt(
        help = r"Run tasks as blocking calls instead of futures. Needs a mode that accepts them.",
        long = "blocking"
    )]
    blocking: bool,

    #[structopt(
        help = r"Seconds to wait for the pool to shut down once every task is done.",
        long = "stop-timeout",
        default_value = "10"
    )]
    stop_timeout: u64,

    #[structopt(flatten)]
    flags: Flags,
}

impl RunCommand {
    pub async fn run(self) -> Result<(), anyhow::Error> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!(
                "The failure rate must be between 0 and 1, got {}",
                self.failure_rate
            );
        }

        let config = self.flags.clone().into_config().await?;
        let manager = Manager::new(config);
        let reporter = StatusReporter::new(manager.events(), self.count).spawn();

        manager.start()?;
        info!("Started {} in {} mode", manager.name(), manager.mode());

        let mut handles = Vec::with_capacity(self.count as usize);
        for i in 0..self.count {
            let fails = self.fails(i);
            let delay = self.delay;
            let callable = if self.blocking {
                Callable::blocking(move || {
                    std::thread::sleep(delay);
                    outcome(i, fails)
                })
            } else {
                Callable::future(move || async move {
                    tokio::time::sleep(delay).await;
                    outcome(i, fails)
                })
            };
            handles.push(manager.submit(callable)?);
        }

        let results = futures::future::join_all(handles).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!("{} of {} tasks failed", failed, results.len());

        manager.stop(Duration::from_secs(self.stop_timeout))?;

        let summary = reporter
            .join()
            .map_err(|_| anyhow!("The status reporter panicked"))?;
        summary.print();

        Ok(())
    }

    /// Whether task `i` is one of the failing ones.
    fn fails(&self, i: u64) -> bool {
        let before = (i as f64 * self.failure_rate).floor();
        let after = ((i + 1) as f64 * self.failure_rate).floor();
        after > before
    }
}

fn outcome(i: u64, fails: bool) -> Result<u64, anyhow::Error> {
    if fails {
        bail!("synthetic failure in task #{}", i)
    }
    Ok(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(failure_rate: f64) -> RunCommand {
        let rate = failure_rate.to_string();
        RunCommand::from_iter_safe(["run", "--failure-rate", rate.as_str(), "--count", "8"])
            .unwrap()
    }

    #[test]
    fn failures_are_spread_evenly() {
        let run = command(0.25);
        let failing: Vec<u64> = (0..8).filter(|i| run.fails(*i)).collect();
        assert_eq!(failing, vec![3, 7]);
    }

    #[test]
    fn no_failures_at_zero_and_all_at_one() {
        assert!((0..8).all(|i| !command(0.0).fails(i)));
        assert!((0..8).all(|i| command(1.0).fails(i)));
    }

    #[test]
    fn flags_parse_signed_budgets() {
        let run = RunCommand::from_iter_safe([
            "run",
            "--workers",
            "-1",
            "--max-err-count",
            "-1",
            "--delay",
            "5",
        ])
        .unwrap();
        assert_eq!(run.flags.num_workers, Some(-1));
        assert_eq!(run.flags.max_err_count, Some(-1));
        assert_eq!(run.delay, Duration::from_millis(5));
    }
}
