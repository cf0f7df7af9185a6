use std::process::ExitCode;

use color_eyre::Result;
use vke::app::{App, AppConfig};

fn run() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(AppConfig::default())?;
    app.run()?;

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => {
            println!("Vulkan Engine Application terminated");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
