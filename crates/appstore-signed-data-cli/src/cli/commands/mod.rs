use super::args::*;
use crate::exit_codes::SUCCESS;

pub mod verify;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Verify(args) => verify::run(args).await,
        Command::Kinds => {
            for kind in appstore_signed_data::PayloadKind::ALL {
                println!("{kind}");
            }
            Ok(SUCCESS)
        }
    }
}
