/// lending flow - preview, deposit, evaluate and borrow
use collateral_lending_rs::api::{from_json, to_json_pretty};
use collateral_lending_rs::{
    AssetRequest, EngineConfig, LendingApi, LendingEngine, LoanRequest, Money, SafeTimeProvider,
    TimeSource, Uuid,
};
use chrono::{TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("debug").init();
    println!("=== lending flow ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let engine = LendingEngine::in_memory(EngineConfig::default())?;
    let api = LendingApi::new(&engine, &time);
    let user = Uuid::new_v4();

    // 1. preview collateral
    println!("1. asset preview");
    println!("----------------");
    for (asset_type, value) in [("property", 100_000), ("car", 20_000), ("crypto", 10_000)] {
        let preview = api.preview_asset(&AssetRequest {
            asset_type: asset_type.to_string(),
            stated_value: Money::from_major(value),
            description: None,
        })?;
        println!(
            "  {:<8} stated ${:>10}  ltv {:>4}  appraised ${:>10}  tier {:?}",
            asset_type, preview.stated_value, preview.ltv_ratio, preview.appraised_value, preview.risk_tier
        );
    }

    // 2. deposit
    println!("\n2. deposits");
    println!("-----------");
    let request: AssetRequest = from_json(
        r#"{"type": "Property", "stated_value": "100000", "description": "flat in town"}"#,
    )?;
    let asset = api.create_asset(user, request)?;
    println!("  ✓ {} appraised at ${} ({:?})", asset.asset_type, asset.appraised_value, asset.status);

    let dust = api.create_asset(user, AssetRequest {
        asset_type: "crypto".to_string(),
        stated_value: Money::CENT,
        description: Some("dust".to_string()),
    })?;
    println!("  ✗ crypto worth ${} recorded as {:?}", dust.stated_value, dust.status);

    // 3. evaluate before committing
    println!("\n3. evaluation");
    println!("-------------");
    for amount in [50_000, 75_000] {
        let evaluation = api.evaluate_loan(user, LoanRequest { amount: Money::from_major(amount) })?;
        println!(
            "  ${:>6}: approved={} health factor {:.3} reason {:?}",
            amount,
            evaluation.approved,
            evaluation.health_factor.as_decimal(),
            evaluation.rejection_reason.map(|r| r.to_string())
        );
    }

    // 4. commit
    println!("\n4. loans");
    println!("--------");
    let approved = api.request_loan(user, LoanRequest { amount: Money::from_major(50_000) })?;
    println!("  ✓ ${} -> {:?}", approved.amount, approved.status);
    let rejected = api.request_loan(user, LoanRequest { amount: Money::from_major(25_000) })?;
    println!("  ✗ ${} -> {:?} ({:?})", rejected.amount, rejected.status, rejected.rejection_reason);

    println!("\n5. position");
    println!("-----------");
    println!("{}", to_json_pretty(&api.position(user)?)?);

    println!("\n6. audit trail");
    println!("--------------");
    for event in engine.take_events() {
        println!("  {:?}", event);
    }

    Ok(())
}
