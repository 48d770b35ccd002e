use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use udpping::cli::Args;
use udpping::logging::measurement_log::MeasurementLog;
use udpping::logging::operational::init_operational_log;
use udpping::node_id::resolve_node_number;
use udpping::session::interface::SystemInterfaces;
use udpping::session::session::InterfaceSessionOpener;
use udpping::session::session_controller::SessionController;
use udpping::shutdown::install_signal_handlers;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("udpping: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let level = args.log_level();
    let node_id_file = args.node_id_file.clone();
    let config = Arc::new(args.into_config(|| resolve_node_number(&node_id_file))?);

    for dir in [&config.log_dir, &config.data_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("error creating directory {:?}", dir))?;
    }

    init_operational_log(&config, level)?;
    let measurement_log = Arc::new(MeasurementLog::open(&config)?);

    let shutdown = CancellationToken::new();
    install_signal_handlers(shutdown.clone())?;

    info!("starting: instance {}, {} via {} (source port {}), payload {} bytes, timeout {:?}",
        config.instance_id, config.destination, config.interface, config.source_port, config.payload_size, config.reply_timeout);

    let opener = Arc::new(InterfaceSessionOpener::new(Arc::new(SystemInterfaces)));
    let mut controller = SessionController::new(config, opener, measurement_log, shutdown);
    controller.run().await;

    info!("exiting");
    Ok(())
}
