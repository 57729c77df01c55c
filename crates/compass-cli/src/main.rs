//! value-compass: conservative fair value, health screen and portfolio monitor.
//!
//! Usage:
//!   value-compass lookup 005930.KS
//!   value-compass value 005930.KS --one-off 100 --multiple 6
//!   value-compass value AAPL --price 180 --financial
//!   value-compass value 005930.KS --income-y2 1200 --income-y1 800 --income-latest 500 --shares 1e8
//!   value-compass monitor --json

use anyhow::{Context, Result};
use compass_core::{CompassError, Figure};
use compass_orchestrator::{
    AssetUniverse, CompassConfig, CompassOrchestrator, EligibilityProfile, FieldSource, HealthReport, Lookup,
    MonitorReport, ValuationField, ValuationResult, ValuationSession, Verdict,
};
use std::str::FromStr;
use yahoo_client::YahooClient;

const USAGE: &str = "\
Usage:
  value-compass lookup <TICKER> [--json]
  value-compass value <TICKER> [--multiple N] [--one-off X] [--price P]
                      [--income-y2 A] [--income-y1 B] [--income-latest C]
                      [--debt D] [--cash C] [--shares S]
                      [--financial] [--platform] [--turnaround] [--json]
  value-compass monitor [--json]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "value_compass=info,compass_orchestrator=info,yahoo_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");

    let config = CompassConfig::from_env().context("invalid configuration")?;
    let client = YahooClient::new(config.yahoo_rate_limit, config.yahoo_crumb.clone());
    let orchestrator = CompassOrchestrator::with_config(client, &config);

    match args.first().map(String::as_str) {
        Some("lookup") => {
            let symbol = ticker_arg(&args)?;
            let mut session = orchestrator.new_session();
            let lookup = orchestrator.lookup(symbol, &mut session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lookup)?);
            } else {
                print_lookup(&lookup);
            }
        }
        Some("value") => {
            let symbol = ticker_arg(&args)?;
            let mut session = orchestrator.new_session();

            match orchestrator.lookup(symbol, &mut session).await {
                Ok(lookup) if !json => print_lookup(&lookup),
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Fetch failed for {}, valuing manual inputs only: {}", symbol, e);
                }
                Err(e) => return Err(e.into()),
            }

            apply_overrides(&args, &mut session)?;
            let profile = EligibilityProfile {
                is_financial: args.iter().any(|a| a == "--financial"),
                is_platform: args.iter().any(|a| a == "--platform"),
                is_turnaround: args.iter().any(|a| a == "--turnaround"),
            };

            match session.evaluate(&profile) {
                Ok(result) if json => println!("{}", serde_json::to_string_pretty(&result)?),
                Ok(result) => print_valuation(symbol, &session, &result),
                Err(e @ CompassError::Ineligible(_)) => {
                    eprintln!("STOP: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some("monitor") => {
            let report = orchestrator.monitor(&AssetUniverse::default()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_monitor(&report);
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn ticker_arg(args: &[String]) -> Result<&str> {
    args.get(1)
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .with_context(|| format!("missing <TICKER>\n{}", USAGE))
}

/// Value following `--name`, parsed.
fn flag_value<T>(args: &[String], name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    let raw = args
        .get(pos + 1)
        .with_context(|| format!("{} needs a value", name))?;
    let value = raw
        .parse::<T>()
        .with_context(|| format!("invalid value for {}: {}", name, raw))?;
    Ok(Some(value))
}

/// Like `flag_value`, but NaN and infinities are rejected.
fn finite_flag(args: &[String], name: &str) -> Result<Option<f64>> {
    match flag_value::<f64>(args, name)? {
        Some(v) if !v.is_finite() => anyhow::bail!("{} must be a finite number, got {}", name, v),
        other => Ok(other),
    }
}

/// Operating income flags by session slot (oldest first).
const INCOME_FLAGS: [&str; 3] = ["--income-y2", "--income-y1", "--income-latest"];

fn apply_overrides(args: &[String], session: &mut ValuationSession) -> Result<()> {
    if let Some(multiple) = flag_value::<u8>(args, "--multiple")? {
        session.set_multiple(multiple)?;
    }
    for (slot, name) in INCOME_FLAGS.iter().enumerate() {
        if let Some(income) = finite_flag(args, name)? {
            session.set_operating_income(slot, income)?;
        }
    }
    if let Some(one_off) = finite_flag(args, "--one-off")? {
        session.set_one_off_adjustment(one_off);
    }
    if let Some(debt) = finite_flag(args, "--debt")? {
        session.set_total_debt(debt);
    }
    if let Some(cash) = finite_flag(args, "--cash")? {
        session.set_cash(cash);
    }
    if let Some(shares) = finite_flag(args, "--shares")? {
        session.set_shares_outstanding(shares);
    }
    if let Some(price) = finite_flag(args, "--price")? {
        session.set_current_price(price);
    }
    Ok(())
}

fn figure(f: Figure) -> String {
    match f {
        Figure::Known(v) => format!("{:.2}", v),
        Figure::Unknown => "-".to_string(),
    }
}

fn print_lookup(lookup: &Lookup) {
    let n = &lookup.normalized;
    println!("\n{} ({}, amounts in {})", n.symbol, n.currency.code(), n.currency.unit_label());
    println!("  Operating income (y-2, y-1, latest): {} / {} / {}",
        figure(n.operating_income[0]),
        figure(n.operating_income[1]),
        figure(n.operating_income[2]),
    );
    println!("  Total debt:          {}", figure(n.total_debt));
    println!("  Cash & equivalents:  {}", figure(n.cash_and_equivalents));
    println!("  Shares outstanding:  {}", figure(n.shares_outstanding));
    println!("  Latest close:        {}", figure(n.latest_close));
    print_health(&lookup.health);
}

fn print_health(report: &HealthReport) {
    println!("\nFinancial health");
    for c in &report.criteria {
        println!("  [{:<6}] {:<38} {:<14} ({})", c.status.as_str(), c.name, c.display_value(), c.threshold);
    }
    println!(
        "  Score {}/{}: {} - {}",
        report.score,
        report.evaluated,
        report.tier.as_str(),
        report.tier.describe()
    );
}

fn print_valuation(symbol: &str, session: &ValuationSession, result: &ValuationResult) {
    let input = session.input();
    let edited = [
        ValuationField::OperatingIncomeYear2,
        ValuationField::OperatingIncomeYear1,
        ValuationField::OperatingIncomeLatest,
        ValuationField::OneOffAdjustment,
        ValuationField::TotalDebt,
        ValuationField::Cash,
        ValuationField::SharesOutstanding,
        ValuationField::Multiple,
        ValuationField::CurrentPrice,
    ]
    .into_iter()
    .filter(|f| session.source(*f) == FieldSource::Edited)
    .map(|f| format!("{:?}", f))
    .collect::<Vec<_>>();

    println!("\nValue Compass: {} (x{} EV multiple)", symbol, input.multiple.get());
    if !edited.is_empty() {
        println!("  Manual overrides: {}", edited.join(", "));
    }
    println!("  Worst operating income:   {:.2}", result.worst_income);
    println!("  Normalized income:        {:.2}", result.normalized_income);
    println!("  Enterprise value:         {:.2}", result.enterprise_value);
    println!("  Net debt:                 {:.2}", result.net_debt);
    println!("  Equity value:             {:.2}", result.equity_value);
    println!("  Fair value per share:     {:.2}", result.fair_value_per_share);
    match session.current_price() {
        Some(price) => println!("  Current price:            {:.2}", price),
        None => println!("  Current price:            -"),
    }
    if let Some(margin) = result.safety_margin_pct {
        println!("  Safety margin:            {:.1}%", margin);
    }
    let marker = match result.verdict {
        Verdict::Approve { .. } => "[+]",
        Verdict::Watch { .. } => "[~]",
        Verdict::Reject { .. } => "[-]",
        Verdict::Undeterminable | Verdict::AwaitingPrice => "[?]",
    };
    println!("\n{} {}: {}", marker, result.verdict.label(), result.verdict.describe());
}

fn print_monitor(report: &MonitorReport) {
    println!("\n{:<10} {:<8} {:>12} {:>10} {:>16}", "Category", "Ticker", "Price", "Change %", "Volume");
    for row in &report.rows {
        let volume = row.volume.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<10} {:<8} {:>12.2} {:>+10.2} {:>16}",
            row.category.as_str(),
            row.symbol,
            row.price,
            row.change_pct,
            volume
        );
    }
    if !report.risk.is_empty() {
        println!("\nRisk monitor");
        for r in &report.risk {
            println!("  {:<10} {:>8.2} ({:+.2}%)", r.gauge.label(), r.level, r.change_pct);
        }
    }
    if !report.skipped.is_empty() {
        println!("\nSkipped: {}", report.skipped.join(", "));
    }
}
