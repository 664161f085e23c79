use super::super::args::{Cli, Command};
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => super::run::run(args).await,
        Command::Plan(args) => super::plan::run(args),
        Command::Cleanup(args) => super::cleanup::run(args).await,
        Command::Version => {
            println!("whsweep {}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
