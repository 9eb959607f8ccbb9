//! Command Line Interface for the DeFi aggregator.
mod sandbox;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use defi_agg_domain::{Address, FeeRate, OperationKind, OperationParams, TokenAmount, YieldSnapshot};
use defi_agg_execution::{AggregatorConfig, DEFAULT_FEE_RATE_BPS};
use dotenv::dotenv;
use sandbox::{CUSDC, LENDING_POOL, POSITION_MANAGER, Sandbox, VAULT, position_of, usdc, usdt, weth};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "defi-agg")]
#[command(about = "Yield and liquidity aggregator over reference backends", long_about = None)]
struct Cli {
    /// Aggregator fee rate in basis points (at most 1000)
    #[arg(long, global = true, env = "DEFI_AGG_FEE_RATE_BPS", default_value_t = DEFAULT_FEE_RATE_BPS)]
    fee_rate_bps: u32,

    /// Owner identity of the aggregator
    #[arg(long, global = true, env = "DEFI_AGG_OWNER", default_value = "owner")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an end-to-end scenario against fresh reference backends
    Scenario {
        /// Backend family to exercise
        #[arg(value_enum, default_value_t = ScenarioKind::All)]
        kind: ScenarioKind,

        /// Burn range positions once fully removed
        #[arg(long)]
        burn_on_remove: bool,

        /// Print the event log as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the exact fee split of an amount
    Fee {
        /// Gross amount in base units
        #[arg(short, long)]
        amount: u128,

        /// Rate in basis points; defaults to the configured rate
        #[arg(long)]
        bps: Option<u32>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioKind {
    Lending,
    ExchangeRate,
    Vault,
    Range,
    Swap,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = AggregatorConfig::default()
        .with_owner(cli.owner.as_str())
        .with_fee_rate_bps(cli.fee_rate_bps);

    match cli.command {
        Commands::Fee { amount, bps } => {
            let rate = FeeRate::try_new(bps.unwrap_or(cli.fee_rate_bps))?;
            let quote = rate.quote(TokenAmount::from(amount));
            println!("Rate:  {} ({}%)", rate, rate.as_percentage());
            println!("Gross: {}", quote.gross);
            println!("Fee:   {}", quote.fee);
            println!("Net:   {}", quote.net);
        }
        Commands::Scenario {
            kind,
            burn_on_remove,
            json,
        } => {
            let sandbox = Sandbox::new(config, burn_on_remove)?;
            info!(owner = %sandbox.owner, burn_on_remove, "Sandbox deployed");
            println!(
                "🏦 Aggregator ready: {} adapters, fee rate {}",
                sandbox.service.read(|agg, _| agg.adapter_names().len()).await,
                sandbox.service.read(|agg, _| agg.fee_rate()).await
            );

            let run = |k: ScenarioKind| kind == k || kind == ScenarioKind::All;
            if run(ScenarioKind::Lending) {
                lending(&sandbox).await?;
            }
            if run(ScenarioKind::ExchangeRate) {
                exchange_rate(&sandbox).await?;
            }
            if run(ScenarioKind::Vault) {
                vault(&sandbox).await?;
            }
            if run(ScenarioKind::Range) {
                range(&sandbox).await?;
            }
            if run(ScenarioKind::Swap) {
                swap(&sandbox).await?;
            }
            settle_fees(&sandbox).await?;

            let events = sandbox.service.events().await;
            println!("\n📜 {} events recorded", events.len());
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in &events {
                    println!(
                        "  {} {:<22} {:<14} {}",
                        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        format!("{:?}", event.event_type),
                        event.adapter.as_deref().unwrap_or("-"),
                        event.user
                    );
                }
            }
        }
    }

    Ok(())
}

async fn lending(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Lending pool (rebasing receipt) ==");
    let deposit = sandbox.deposit("lending", usdc().units(1_000)).await?;
    println!("Deposited 1000 USDC -> supplied {}", deposit.output_amounts[0]);
    println!("Principal: {}", sandbox.principal("lending").await?);

    sandbox
        .service
        .with_chain(|chain| {
            chain.advance(86_400);
            let (pool, ledger) = chain.lending_pool_mut(&Address::from(LENDING_POOL))?;
            pool.accrue_interest(ledger, 500)
        })
        .await?;
    print_yield("After 5% interest", &sandbox.service.user_yield("lending", &sandbox.user).await?);

    let withdraw = sandbox.withdraw("lending", usdc().units(500)).await?;
    println!(
        "Withdrew 500 USDC of principal -> gross {}, fee {}, received {}",
        withdraw.fees[0].gross, withdraw.fees[0].fee, withdraw.output_amounts[0]
    );
    println!("Principal: {}", sandbox.principal("lending").await?);
    Ok(())
}

async fn exchange_rate(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Exchange-rate market ==");
    sandbox.deposit("exchange-rate", usdc().units(1_000)).await?;
    print_yield(
        "After deposit",
        &sandbox.service.user_yield("exchange-rate", &sandbox.user).await?,
    );

    sandbox
        .service
        .with_chain(|chain| {
            let (market, ledger) = chain.exchange_rate_market_mut(&Address::from(CUSDC))?;
            market.accrue_interest(ledger, 200)
        })
        .await?;
    print_yield(
        "After the rate rises 2%",
        &sandbox.service.user_yield("exchange-rate", &sandbox.user).await?,
    );

    let principal = sandbox.principal("exchange-rate").await?;
    let withdraw = sandbox.withdraw("exchange-rate", principal).await?;
    println!(
        "Withdrew full principal {} -> received {}",
        principal, withdraw.output_amounts[0]
    );
    Ok(())
}

async fn vault(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Share vault ==");
    sandbox.deposit("vault", usdc().units(2_000)).await?;
    sandbox
        .service
        .with_chain(|chain| {
            let (vault, ledger) = chain.share_vault_mut(&Address::from(VAULT))?;
            vault.report_gain(ledger, usdc().units(40))
        })
        .await?;
    print_yield(
        "After a strategy gain of 40 USDC",
        &sandbox.service.user_yield("vault", &sandbox.user).await?,
    );

    let withdraw = sandbox.withdraw("vault", usdc().units(990)).await?;
    println!(
        "Withdrew 990 USDC of principal -> gross {}, received {}",
        withdraw.fees[0].gross, withdraw.output_amounts[0]
    );
    println!("Principal: {}", sandbox.principal("vault").await?);
    Ok(())
}

async fn range(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Range position ==");
    let params = OperationParams::new(sandbox.user.clone(), sandbox.deadline().await)
        .with_token(usdt().address, usdt().units(10_000))
        .with_token(weth().address, weth().units(10));
    let opened = sandbox
        .submit("range", OperationKind::AddPosition, params)
        .await?;
    let id = position_of(&opened)?;
    println!(
        "Opened position {} with {} USDT / {} WETH (base units)",
        id, opened.output_amounts[0], opened.output_amounts[1]
    );

    sandbox.approve_position(id).await?;
    sandbox
        .service
        .with_chain(move |chain| {
            let (manager, ledger) = chain.position_manager_mut(&Address::from(POSITION_MANAGER))?;
            manager.accrue_fees(ledger, id, usdt().units(25), TokenAmount::from(10_000_000_000_000_000u128))
        })
        .await
        .context("accruing trading fees")?;
    print_yield("Position value", &sandbox.service.user_yield("range", &sandbox.user).await?);

    let deadline = sandbox.deadline().await;
    let harvested = sandbox
        .submit(
            "range",
            OperationKind::CollectYield,
            OperationParams::new(sandbox.user.clone(), deadline).with_position(id),
        )
        .await?;
    println!(
        "Harvested {} USDT / {} WETH of trading yield",
        harvested.output_amounts[0], harvested.output_amounts[1]
    );

    let closed = sandbox
        .submit(
            "range",
            OperationKind::RemovePosition,
            OperationParams::new(sandbox.user.clone(), deadline).with_position(id),
        )
        .await?;
    println!(
        "Closed position {} -> {} USDT / {} WETH",
        id, closed.output_amounts[0], closed.output_amounts[1]
    );
    let open = sandbox
        .service
        .user_positions("range", &sandbox.user)
        .await?
        .len();
    println!("Open positions: {open}");
    Ok(())
}

async fn swap(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Swap ==");
    let mut params = OperationParams::single(
        usdc().address,
        usdc().units(500),
        sandbox.user.clone(),
        sandbox.deadline().await,
    );
    params.tokens.push(usdt().address);
    let before = sandbox.balance(&usdt()).await;
    let swapped = sandbox.submit("swap", OperationKind::Swap, params).await?;
    let after = sandbox.balance(&usdt()).await;
    println!(
        "Swapped 500 USDC (fee {}) -> {} USDT base units, wallet +{}",
        swapped.fees[0].fee,
        swapped.output_amounts[0],
        after.saturating_sub(before)
    );
    Ok(())
}

async fn settle_fees(sandbox: &Sandbox) -> Result<()> {
    println!("\n== Fees ==");
    let balances = sandbox.service.read(|agg, _| agg.fee_balances()).await;
    if balances.is_empty() {
        println!("No fees collected");
        return Ok(());
    }
    for (token, amount) in &balances {
        println!("  {token:<6} {amount}");
    }
    let paid = sandbox.service.withdraw_fees(&sandbox.owner).await?;
    println!("Paid {} token balance(s) to {}", paid.len(), sandbox.owner);
    Ok(())
}

fn print_yield(label: &str, snapshots: &[YieldSnapshot]) {
    println!("{label}:");
    for snapshot in snapshots {
        let pct = snapshot
            .profit_pct()
            .map(|pct| format!("{pct}%"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {:<6} principal {} value {} {} {} ({})",
            snapshot.token,
            snapshot.principal,
            snapshot.current_value,
            if snapshot.is_profit { "profit" } else { "loss" },
            snapshot.profit,
            pct
        );
    }
}
