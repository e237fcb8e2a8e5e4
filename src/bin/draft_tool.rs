//! Draft tool
//!
//! Command line front end for the draft pipeline against an HTTP ledger.
//!
//! ## Usage
//! ```bash
//! # Balances of several addresses, queried concurrently
//! cargo run --bin draft-tool --features cli -- --ledger http://127.0.0.1:9000 \
//!     balances --address <hex> --address <hex>
//!
//! # Transfer 10,000 native units
//! cargo run --bin draft-tool --features cli -- --ledger http://127.0.0.1:9000 \
//!     transfer --secret-key <hex> --to <hex> --amount 10000
//!
//! # Extract the stake output created by a confirmed transaction
//! cargo run --bin draft-tool --features cli -- --ledger http://127.0.0.1:9000 \
//!     extract --tx <hex> --kind stake --owner <hex>
//! ```
//!
//! Logging honors `RUST_LOG` (default `info`). Ctrl+C cancels the in-flight
//! ledger call.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use ledger_draft_libs::{
    common::{format_number, TokioCancellationToken},
    scanning::LoggingProgress,
    signing::prepare::Transfer,
    Address, BatchBalanceQuery, CallContext, DraftError, DraftPipeline, DraftResult, Expectation,
    FixedHash, HashSigner, HttpLedgerClient, PipelineConfig, ResultExtractor, RistrettoHashSigner,
    TokenId,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    #[arg(long, default_value = "http://127.0.0.1:9000", help = "Ledger HTTP endpoint")]
    ledger: String,

    #[arg(long, help = "Pipeline configuration file (JSON)")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spendable balances of one or more addresses
    Balances {
        #[arg(long = "address", required = true, help = "Address in hex (repeatable)")]
        addresses: Vec<String>,

        #[arg(long, help = "Token id; native asset when omitted")]
        token: Option<String>,
    },
    /// Compose, sign and submit a transfer
    Transfer {
        #[arg(long, help = "Hex-encoded secret key of the sender")]
        secret_key: String,

        #[arg(long, help = "Recipient address in hex")]
        to: String,

        #[arg(long)]
        amount: u64,

        #[arg(long, help = "Token id; native asset when omitted")]
        token: Option<String>,

        #[arg(long)]
        memo: Option<String>,
    },
    /// Extract the business result of a confirmed transaction
    Extract {
        #[arg(long, help = "Transaction hash in hex")]
        tx: String,

        #[arg(long, value_enum)]
        kind: ResultKind,

        #[arg(long, help = "Owner address in hex")]
        owner: String,

        #[arg(long, help = "Token id for settlements")]
        token: Option<String>,

        #[arg(long, help = "Expected settlement amount")]
        expected: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ResultKind {
    Stake,
    Delegation,
    Vesting,
    Escrow,
    Proposal,
    Vote,
    Deployment,
    Settlement,
}

fn parse_token(token: Option<String>) -> DraftResult<Option<TokenId>> {
    token.map(TokenId::new).transpose()
}

fn load_config(path: Option<&str>) -> DraftResult<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| {
                DraftError::Configuration(format!("Failed to read config {path}: {e}"))
            })?;
            PipelineConfig::from_json(&json)?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(args: CliArgs, ctx: CallContext) -> DraftResult<()> {
    let config = load_config(args.config.as_deref())?;
    let ledger = Arc::new(HttpLedgerClient::new(args.ledger.clone())?);
    let ctx = config.apply_to(&ctx);

    match args.command {
        Command::Balances { addresses, token } => {
            let addresses = addresses
                .iter()
                .map(|a| Address::from_hex(a))
                .collect::<DraftResult<Vec<_>>>()?;
            let token_id = parse_token(token)?;
            let query = BatchBalanceQuery::new(ledger, config.batch_concurrency);
            let results = query
                .query(&addresses, token_id.as_ref(), &ctx, &LoggingProgress::default())
                .await?;
            for (address, result) in addresses.iter().zip(results) {
                match result {
                    Ok(balance) => println!(
                        "{address}  {:>20}  ({} outputs)",
                        format_number(balance.total),
                        balance.utxo_count()
                    ),
                    Err(e) => println!("{address}  error: {e}"),
                }
            }
        }
        Command::Transfer {
            secret_key,
            to,
            amount,
            token,
            memo,
        } => {
            let secret_key = Zeroizing::new(secret_key);
            let signer = Arc::new(RistrettoHashSigner::from_secret_hex(&secret_key)?);
            let mut transfer = Transfer::new(signer.address(), Address::from_hex(&to)?, amount);
            if let Some(token_id) = parse_token(token)? {
                transfer = transfer.with_token(token_id);
            }
            if let Some(memo) = memo {
                transfer = transfer.with_memo(memo);
            }
            let pipeline: DraftPipeline<Transfer> = DraftPipeline::new(ledger, config)?;
            let outcome = pipeline.execute(&transfer, signer, &ctx).await?;
            println!("tx_hash: {}", outcome.tx_hash);
            println!("fee:     {}", format_number(outcome.fee));
        }
        Command::Extract {
            tx,
            kind,
            owner,
            token,
            expected,
        } => {
            let owner = Address::from_hex(&owner)?;
            let expectation = match kind {
                ResultKind::Stake => Expectation::stake(owner),
                ResultKind::Delegation => Expectation::delegation(owner),
                ResultKind::Vesting => Expectation::vesting(owner),
                ResultKind::Escrow => Expectation::escrow(owner),
                ResultKind::Proposal => Expectation::proposal(owner),
                ResultKind::Vote => Expectation::vote(owner),
                ResultKind::Deployment => Expectation::deployment(owner),
                ResultKind::Settlement => {
                    Expectation::settlement(owner, parse_token(token)?, expected)
                }
            };
            let result = ResultExtractor::new(ledger)
                .extract(&FixedHash::from_hex(&tx)?, &expectation, &ctx)
                .await?;
            let json = serde_json::to_string_pretty(&result).map_err(|e| {
                ledger_draft_libs::SerializationError::JsonSerializationError(e.to_string())
            })?;
            println!("{json}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let (token, handle) = TokioCancellationToken::create_pair();
    let ctx = CallContext::with_token(Arc::new(token));

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the in-flight ledger call");
            handle.cancel();
        }
    });

    match run(args, ctx).await {
        Ok(()) => info!("Done"),
        Err(DraftError::Cancelled { step }) => {
            eprintln!("Cancelled during {step}");
            std::process::exit(130);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_retryable() {
                eprintln!("The ledger may be temporarily unavailable; retrying may succeed.");
            }
            std::process::exit(1);
        }
    }
}
