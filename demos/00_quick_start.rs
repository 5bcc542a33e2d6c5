/// quick start - minimal example to get started
use collateral_lending_rs::{EngineConfig, LendingEngine, Money, SafeTimeProvider, TimeSource, Uuid};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let engine = LendingEngine::in_memory(EngineConfig::default())?;
    let time = SafeTimeProvider::new(TimeSource::System);
    let user = Uuid::new_v4();

    // pledge a $100,000 property
    engine.create_asset(user, "property", Money::from_major(100_000), None, &time)?;

    // borrow against it
    let loan = engine.request_loan(user, Money::from_major(50_000), &time)?;
    println!("loan status: {:?}", loan.status);

    // print current position
    println!("{}", serde_json::to_string_pretty(&engine.position_now(user)?)?);

    Ok(())
}
