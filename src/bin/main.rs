//! Daemon entry point: configuration, logging, signals and the run cycle.

use std::{env, io::IsTerminal, process::ExitCode, sync::Arc, thread};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use conc::{
    cli::{Cli, LogLevelArg},
    constants::{PROJECTS_DIR, SIGNAL_POLL_INTERVAL, SOCKET_PATH},
    driver::Driver,
    manager::Manager,
    protocol::Dispatcher,
    server::Server,
    signals,
};

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let daemon_mode = args.daemon || !std::io::stdout().is_terminal();

    if let Some(work_dir) = &args.work_dir {
        if !work_dir.is_dir() {
            eprintln!("Work directory {} does not exist", work_dir.display());
            return ExitCode::FAILURE;
        }
        if let Err(err) = env::set_current_dir(work_dir) {
            eprintln!(
                "Unable to enter work directory {}: {err}",
                work_dir.display()
            );
            return ExitCode::FAILURE;
        }
    }

    init_logging(args.log_level);

    if let Err(err) = signals::install(daemon_mode) {
        error!("Unable to install signal handlers: {err}");
        return ExitCode::FAILURE;
    }

    // One iteration per daemon lifetime; SIGHUP in daemon mode re-enters
    // with a fresh manager and server. Supervised services are stopped at
    // the end of each cycle and are not auto-started by the next one.
    loop {
        let manager = Arc::new(Manager::new(Driver::new(PROJECTS_DIR)));
        if let Err(err) = manager.init() {
            error!("Unable to init the manager, exiting: {err}");
            return ExitCode::FAILURE;
        }

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager)));
        let mut server = match Server::spawn(SOCKET_PATH, dispatcher) {
            Ok(server) => server,
            Err(err) => {
                error!("Unable to start the socket server: {err}");
                let _ = manager.stop();
                return ExitCode::FAILURE;
            }
        };

        while !signals::stop_requested() {
            thread::sleep(SIGNAL_POLL_INTERVAL);
        }

        server.stop();
        server.join();

        if let Err(err) = manager.stop() {
            error!("Manager shutdown reported: {err}");
        }

        if !signals::take_restart() {
            break;
        }
        signals::clear_stop();
        info!("Restarting");
    }

    ExitCode::SUCCESS
}

fn init_logging(level: Option<LogLevelArg>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
