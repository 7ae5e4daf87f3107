use hybrid_pool_core::modes;
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "modes",
    setting = structopt::clap::AppSettings::ColoredHelp,
    about = "Lists the pool modes and the tags they can be selected by"
)]
pub struct ModesCommand {}

impl ModesCommand {
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let cyan_bold = console::Style::new().cyan().bold();
        for mode in modes::all() {
            println!(
                "{:>12} {} (tags: {})",
                cyan_bold.apply_to(mode.tag()),
                mode.description(),
                mode.tags().join(", ")
            );
        }
        Ok(())
    }
}
