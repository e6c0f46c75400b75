use mocap_link_core::MocapSession;
use mocap_link_io::{SimulatedTransport, UdpOutletSink};

use crate::cli::Cli;
use crate::console_delegate::ConsoleDelegate;
use crate::exit_codes;

/// Record one trial and return the process exit code.
pub async fn execute(cli: Cli) -> i32 {
    let config = match cli.session_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return exit_codes::INVALID_CONFIG;
        }
    };

    log::info!(
        "Recording from {} at starting angle {}",
        config.source_id(),
        config.starting_angle
    );

    let transport = SimulatedTransport::new(cli.simulation_config());
    let sink = UdpOutletSink::new(cli.udp);
    let mut session = MocapSession::new(transport, Box::new(sink), config);

    let delegate = ConsoleDelegate::new(session.handle());
    session.set_delegate(delegate.clone());
    session.set_destination(cli.output.clone());

    let handle = session.handle();
    let destination = cli.output.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, shutting down");
            handle.request_shutdown(destination);
        }
    });

    if let Err(e) = session.connect().await {
        eprintln!("error: {}", e.user_message());
        return exit_codes::SESSION_FAILED;
    }
    session.run().await;

    log::info!(
        "Session finished: {} packet(s) in the last stream, {:.2}s",
        session.packet_count(),
        session.final_duration().as_secs_f64()
    );

    if delegate.error_count() > 0 {
        exit_codes::SESSION_FAILED
    } else {
        exit_codes::SUCCESS
    }
}
