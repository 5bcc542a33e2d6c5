/// interest and repayment - on-read accrual with controlled time
use collateral_lending_rs::{
    EngineConfig, LendingEngine, LoanStatus, Money, RepaymentRequest, SafeTimeProvider, TimeSource,
    Uuid,
};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== interest and repayment ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let engine = LendingEngine::in_memory(EngineConfig::default())?;
    let user = Uuid::new_v4();

    engine.create_asset(user, "property", Money::from_major(40_000), None, &time)?;
    let loan = engine.request_loan(user, Money::from_major(10_000), &time)?;
    let second = engine.request_loan(user, Money::from_major(5_000), &time)?;
    println!("borrowed ${} and ${} on {}", loan.amount, second.amount, time.now().format("%Y-%m-%d"));

    // interest is derived on every read
    for days in [30, 150, 185] {
        controller.advance(Duration::days(days));
        let position = engine.position(user, &time)?;
        println!(
            "{}: interest ${}  health factor {:?}",
            time.now().format("%Y-%m-%d"),
            position.total_interest,
            position.health_factor.map(|hf| hf.round_dp(3).as_decimal())
        );
    }

    // partial repayment goes to interest first
    let loan = engine.repay(user, loan.id, Money::from_major(2_000), &time)?;
    println!("\nafter $2000: principal repaid ${}, interest paid ${}", loan.amount_repaid, loan.interest_paid);

    // settle both loans in one batch
    controller.advance(Duration::days(30));
    let position = engine.position(user, &time)?;
    println!("payoff in 30 days: ${}", position.outstanding_debt());

    let evaluation = engine.evaluate_loan(user, Money::CENT, &time)?;
    println!("current debt seen by the evaluator: ${}", evaluation.outstanding_debt);

    let mut batch = Vec::new();
    for loan in engine.list_loans(user, &time)? {
        if loan.status != LoanStatus::Active {
            continue;
        }
        // listed loans carry the interest owed right now
        let owed = loan.accrued_interest + loan.outstanding_principal();
        batch.push(RepaymentRequest { loan_id: loan.id, amount: owed });
    }

    for loan in engine.repay_batch(user, &batch, &time)? {
        println!("  {} -> {:?}", loan.id, loan.status);
    }

    let position = engine.position(user, &time)?;
    println!("\nremaining debt: ${}", position.outstanding_debt());
    println!("yield earned: ${}", position.yield_earned);

    Ok(())
}
