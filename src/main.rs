use clap::Parser;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;
mod handler;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("output_gov", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let cli = cli::Cli::parse();
    if let Err(e) = config::init(cli.config.as_deref()) {
        eprintln!("Error loading config: {}", e);
        std::process::exit(2);
    }

    let cancel = CancellationToken::new();
    let mut task = tokio::spawn(handler::run(cli.command, cancel.clone()));

    let code = loop {
        tokio::select! {
            res = &mut task => {
                break match res {
                    Ok(Ok(code)) => code,
                    Ok(Err(e)) => {
                        log::error!("Delivery: {:#}", e);
                        1
                    }
                    Err(e) => {
                        log::error!("Delivery: task aborted: {}", e);
                        1
                    }
                };
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                log::warn!("Delivery: interrupted, a started package runs to completion");
                cancel.cancel();
            },
        }
    };

    std::process::exit(code);
}
