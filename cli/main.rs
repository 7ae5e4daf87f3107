mod commands;
pub mod flags;
mod reporter;

use commands::*;
use structopt::StructOpt;
use tracing::{error, log};

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "hpx",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Runs workloads on a hybrid pool of cooperative and threaded workers"
)]
struct Hpx {
    #[structopt(subcommand, help = "the command to run")]
    cmd: Option<Command>,
}

impl Hpx {
    async fn run(mut self) -> Result<(), anyhow::Error> {
        human_panic::setup_panic!(Metadata {
            name: "hpx".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: "".into(),
            homepage: "".into(),
        });

        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .format_timestamp_micros()
            .format_module_path(false)
            .parse_env("HPX_LOG")
            .try_init()?;

        let result = self
            .cmd
            .take()
            .unwrap_or(Command::Modes(ModesCommand {}))
            .run()
            .await;

        if let Err(ref err) = result {
            error!("{:?}", &err);
        };

        result
    }
}

#[derive(StructOpt, Debug, Clone)]
enum Command {
    Modes(ModesCommand),
    Run(RunCommand),
}

impl Command {
    async fn run(self) -> Result<(), anyhow::Error> {
        match self {
            Command::Modes(x) => x.run().await,
            Command::Run(x) => x.run().await,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    Hpx::from_args().run().await
}
