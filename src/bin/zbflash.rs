use clap::Parser;

use zbflash::cli::{config::Config, Args};
use zbflash::engine::Engine;
use zbflash::logging::initialize_logger;
use zbflash::platform::serial::SerialPlatform;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    let args = Args::parse();
    initialize_logger(args.log_level());

    let config = Config::load()?;
    let engine_config = args.into_engine_config(&config)?;
    let baud = engine_config.baud;

    let mut engine = Engine::new(engine_config);
    let mut platform = SerialPlatform::new(baud);
    platform.run(&mut engine);

    Ok(())
}
