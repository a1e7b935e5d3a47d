//! Connects to the first matching treadmill, prints state notifications for
//! a few seconds, then disconnects. Requires the `btleplug-backend` feature:
//!
//! ```text
//! cargo run --example basic_connect --features btleplug-backend
//! ```
//!
//! Mirrors the teacher's own `main.rs` shape (install a tracing subscriber,
//! build the manager, run it) minus the HTTP/WebSocket server and workout
//! persistence, which sit outside this crate's scope.

#[cfg(feature = "btleplug-backend")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    use std::sync::Arc;
    use std::time::Duration;
    use walkpad_ctl::btleplug_backend::BtleplugStack;
    use walkpad_ctl::{ConnectOptions, ConnectionOrchestrator};

    let stack = Arc::new(BtleplugStack::new().await?);
    let orchestrator = ConnectionOrchestrator::new(stack);

    orchestrator.events.subscribe_state(|state| {
        println!(
            "speed={:.1}km/h distance={:.2}km steps={} running={}",
            state.speed_kmh, state.distance_km, state.steps, state.is_running
        );
    });
    orchestrator.events.subscribe_error(|err| {
        eprintln!("error: {}", err.message);
    });

    orchestrator.connect(ConnectOptions::default()).await?;
    println!("connected: {:?}", orchestrator.get_session_info());

    tokio::time::sleep(Duration::from_secs(30)).await;

    orchestrator.disconnect().await?;
    Ok(())
}

#[cfg(not(feature = "btleplug-backend"))]
fn main() {
    eprintln!("this example requires --features btleplug-backend");
}
