use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use oflow::config::{default_config, load_config};
use oflow::learning_switch::LearningSwitch;
use oflow::ofp_controller::Controller;

#[derive(Parser, Debug)]
struct Args {
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    config: Option<PathBuf>,
    /// Listen on this port instead of the configured one.
    #[clap(short, long, value_name = "PORT")]
    port: Option<u16>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut config = match args.config {
        Some(ref path) => load_config(path)?,
        None => default_config(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    log::info!("starting learning switch controller");
    let controller = Controller::new(config);
    controller
        .accept(LearningSwitch::attach)
        .with_context(|| format!("serving on port {}", controller.config().port))?;
    Ok(())
}
