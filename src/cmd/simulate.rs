//! Simulated backend (`hostdeck simulate`).

use anyhow::Result;
use hostdeck::simulator::{Simulator, SimulatorConfig};
use hostdeck_common::OperationKind;
use std::net::SocketAddr;
use std::time::Duration;

pub async fn cmd_simulate(
    port: u16,
    status_interval_ms: u64,
    operation_delay_ms: u64,
    fail: &[String],
) -> Result<()> {
    let failing = fail
        .iter()
        .map(|action| action.parse::<OperationKind>())
        .collect::<Result<_, _>>()?;
    let config = SimulatorConfig {
        status_interval: Duration::from_millis(status_interval_ms.max(1)),
        operation_delay: Duration::from_millis(operation_delay_ms),
        failing,
        ..SimulatorConfig::default()
    };

    let simulator = Simulator::bind(SocketAddr::from(([127, 0, 0, 1], port)), config).await?;
    let addr = simulator.local_addr();
    println!("Simulated backend running at http://{}", addr);
    println!("  channels : ws://{}/ws/core/{{host_id}}/", addr);
    println!("  hosts    : http://{}/api/hosts/", addr);

    simulator.serve_with_shutdown(shutdown_signal()).await?;

    println!("Simulator shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until killed.
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
