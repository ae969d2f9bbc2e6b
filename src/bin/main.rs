use std::process::ExitCode;

use log::{LevelFilter, error};
use simplelog::{ConfigBuilder, SimpleLogger};

use tagwm::Config;
use tagwm::spawn;
use tagwm::wm::WindowManager;

fn main() -> ExitCode {
    let arguments: Vec<String> = std::env::args().skip(1).collect();
    match arguments.as_slice() {
        [] => {}
        [flag] if flag == "-v" => {
            println!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {
            eprintln!("usage: {} [-v]", env!("CARGO_PKG_NAME"));
            return ExitCode::FAILURE;
        }
    }

    init_logging();

    let mut manager = match WindowManager::new(Config::default()) {
        Ok(manager) => manager,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = manager.scan() {
        error!("initial window scan failed: {e}");
        return ExitCode::FAILURE;
    }
    spawn::run_autostart();

    let outcome = manager.run();

    if let Err(e) = manager.cleanup() {
        error!("cleanup: {e}");
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .build();
    if let Err(e) = SimpleLogger::init(LevelFilter::Debug, config) {
        eprintln!("logger init failed: {e}");
    }
}
