mod cli;
mod demo;
mod music;
mod room;
mod runtime;

use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::parse()?;
    runtime::execute(args)
}
