//! storage-preflight CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, CreationFee, UploadArgs};
use color_eyre::eyre::{bail, WrapErr};
use std::path::Path;
use std::sync::Arc;
use storage_preflight::config::PreflightConfig;
use storage_preflight::payment::amount::{format_token_amount, TOKEN_DECIMALS};
use storage_preflight::payment::{
    calculate_current_storage_usage, BalanceSnapshot, SufficiencyEvaluator, SufficiencyResult,
};
use storage_preflight::preflight::{create_status_channel, ChannelSink, PreflightRequest, StatusUpdate};
use storage_preflight::{InMemoryLedger, Ledger, PreflightOrchestrator};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("storage-preflight v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig { path, force } = &cli.command {
        let path = path.clone().unwrap_or_else(PreflightConfig::default_path);
        return init_config(&path, *force);
    }

    let config = cli.load_config()?;

    match &cli.command {
        Command::Check { upload, snapshot } => {
            if let Some(path) = snapshot {
                check_snapshot(&config, upload, path, cli.json)
            } else {
                check(&config, upload, cli.json).await
            }
        }
        Command::Run { upload } => run(&config, upload, cli.json).await,
        Command::Price { size, .. } => price(&config, *size, cli.json).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: &Path, force: bool) -> color_eyre::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PreflightConfig::default()
        .to_file(path)
        .wrap_err_with(|| format!("writing {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn orchestrator_for(
    config: &PreflightConfig,
    upload: &UploadArgs,
) -> color_eyre::Result<(Arc<InMemoryLedger>, PreflightOrchestrator)> {
    let client = upload.client_address()?;
    let ledger = Arc::new(InMemoryLedger::from_config(
        client,
        &config.ledger,
        config.protocol.clone(),
    ));
    let orchestrator = PreflightOrchestrator::new(ledger.clone(), config.protocol.clone())
        .with_retry_policy(config.retry.policy());
    Ok((ledger, orchestrator))
}

async fn request_for(
    config: &PreflightConfig,
    upload: &UploadArgs,
    orchestrator: &PreflightOrchestrator,
) -> color_eyre::Result<PreflightRequest> {
    let client = upload.client_address()?;
    let include_fee = match upload.creation_fee {
        CreationFee::Auto => orchestrator.creation_fee_required(client).await?,
        CreationFee::Include => true,
        CreationFee::Skip => false,
    };
    Ok(PreflightRequest::from_storage_config(client, upload.size, &config.storage)
        .with_creation_fee(include_fee))
}

async fn check(config: &PreflightConfig, upload: &UploadArgs, json: bool) -> color_eyre::Result<()> {
    let (_ledger, orchestrator) = orchestrator_for(config, upload)?;
    let request = request_for(config, upload, &orchestrator).await?;
    let check = orchestrator.check(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        print_balance(&check.balance, upload.size);
        print_result(&check.result, &config.protocol.token);
    }
    Ok(())
}

fn check_snapshot(
    config: &PreflightConfig,
    upload: &UploadArgs,
    path: &Path,
    json: bool,
) -> color_eyre::Result<()> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let balance: BalanceSnapshot = serde_json::from_str(&content)
        .wrap_err_with(|| format!("parsing {}", path.display()))?;
    let include_fee = upload.creation_fee.offline();
    let result = SufficiencyEvaluator::new(config.protocol.clone()).evaluate(
        &balance,
        config.storage.min_days_threshold,
        include_fee,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_balance(&balance, upload.size);
        print_result(&result, &config.protocol.token);
    }
    Ok(())
}

async fn run(config: &PreflightConfig, upload: &UploadArgs, json: bool) -> color_eyre::Result<()> {
    let (ledger, orchestrator) = orchestrator_for(config, upload)?;
    let request = request_for(config, upload, &orchestrator).await?;

    let (tx, mut rx) = create_status_channel();
    let sink = ChannelSink::new(tx);
    let printer = tokio::spawn(async move {
        while let Ok(update) = rx.recv().await {
            match update {
                StatusUpdate::Message { text, .. } => eprintln!("  {text}"),
                StatusUpdate::Progress { percent, .. } => eprintln!("[{percent:>3}%]"),
            }
        }
    });

    let outcome = orchestrator.run_preflight(&request, &sink).await;
    drop(sink);
    let _ = printer.await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_result(&outcome.result, &config.protocol.token);
    if let Some(deposit) = outcome.deposit {
        println!("Deposit tx:  {} (block {})", deposit.tx_hash, deposit.block_number);
    }
    println!(
        "Approval tx: {} (block {})",
        outcome.approval.tx_hash, outcome.approval.block_number
    );
    if let Some(account) = ledger.account(request.client) {
        println!(
            "Ledger now: funds={} rate_allowance={} lockup_allowance={}",
            format_token_amount(account.funds, TOKEN_DECIMALS),
            account.rate_allowance,
            format_token_amount(account.lockup_allowance, TOKEN_DECIMALS)
        );
    }
    Ok(())
}

async fn price(config: &PreflightConfig, size: u64, json: bool) -> color_eyre::Result<()> {
    let ledger = InMemoryLedger::from_config(
        alloy_primitives::Address::ZERO,
        &config.ledger,
        config.protocol.clone(),
    );
    let price = ledger.service_price().await?;
    let costs = price.costs_for(size, config.storage.with_cdn, config.protocol.epochs_per_day);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "price": price,
                "costs": costs,
                "withCdn": config.storage.with_cdn,
                "sizeBytes": size,
            }))?
        );
        return Ok(());
    }

    let token = &config.protocol.token;
    println!(
        "Price per TiB/month: {} {token} (no CDN), {} {token} (CDN)",
        format_token_amount(price.price_per_tib_per_month_no_cdn, TOKEN_DECIMALS),
        format_token_amount(price.price_per_tib_per_month_with_cdn, TOKEN_DECIMALS),
    );
    if size > 0 {
        println!(
            "{size} bytes (cdn={}): {} per epoch, {} {token}/day, {} {token}/month",
            config.storage.with_cdn,
            costs.per_epoch,
            format_token_amount(costs.per_day, TOKEN_DECIMALS),
            format_token_amount(costs.per_month, TOKEN_DECIMALS),
        );
    }
    Ok(())
}

fn print_balance(balance: &BalanceSnapshot, size: u64) {
    let usage = calculate_current_storage_usage(balance, size);
    println!("Rate allowance:   {} (used {})", balance.current_rate_allowance, balance.current_rate_used);
    println!(
        "Lockup allowance: {} (used {})",
        format_token_amount(balance.current_lockup_allowance, TOKEN_DECIMALS),
        format_token_amount(balance.current_lockup_used, TOKEN_DECIMALS)
    );
    println!("Current usage:    ~{:.3} GiB", usage.gib);
}

fn print_result(result: &SufficiencyResult, token: &str) {
    let days = result
        .finite_persistence_days()
        .map_or_else(|| "unbounded".to_string(), |d| format!("{d:.2}"));
    println!("Sufficient:       {}", result.is_sufficient);
    println!("  rate ok:        {}", result.is_rate_sufficient);
    println!("  lockup ok:      {}", result.is_lockup_sufficient);
    println!("Days left:        {days}");
    println!("Rate allowance:   {}", result.rate_allowance_needed);
    println!(
        "Lockup allowance: {} {token}",
        format_token_amount(result.lockup_allowance_needed, TOKEN_DECIMALS)
    );
    println!(
        "Deposit needed:   {} {token}",
        format_token_amount(result.deposit_amount_needed, TOKEN_DECIMALS)
    );
}
