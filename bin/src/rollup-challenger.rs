use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Middleware, Provider, Ws},
    signers::{LocalWallet, Signer},
    types::Address,
};
use rollup_challenger_driver::{ChallengeDriver, ChallengeKind, Driver, DriverConfig, Role};
use rollup_challenger_watcher::{
    bindings::BisectionChallenge, ChallengeError, EthersClient, LogCursor,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// The middleware used to index logs and sign timeout transactions on the base chain.
type SignerMiddlewareWS = SignerMiddleware<Provider<Ws>, LocalWallet>;

/// Arguments for the `rollup-challenger` binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count, env = "VERBOSITY")]
    v: u8,

    /// The Websocket RPC endpoint used to index logs and send transactions.
    #[arg(
        long,
        short,
        help = "The Websocket RPC endpoint used to index logs and send transactions.",
        env = "ROLLUP_CHALLENGER_WS"
    )]
    ws_endpoint: String,

    /// The address of the challenge contract.
    #[arg(
        long,
        short,
        help = "The address of the challenge contract.",
        env = "ROLLUP_CHALLENGER_CHALLENGE"
    )]
    challenge: Address,

    /// The kind of the challenge contract.
    #[arg(
        long,
        short,
        help = "The kind of the challenge contract (bisection, messages).",
        env = "ROLLUP_CHALLENGER_KIND",
        default_value = "messages"
    )]
    kind: ChallengeKind,

    /// The side of the challenge this agent plays.
    #[arg(
        long,
        short,
        help = "The side of the challenge this agent plays (asserter, challenger).",
        env = "ROLLUP_CHALLENGER_ROLE"
    )]
    role: Role,

    /// The block to start replaying challenge events from.
    #[arg(
        long,
        help = "The block to start replaying challenge events from.",
        env = "ROLLUP_CHALLENGER_START_BLOCK",
        default_value_t = 0
    )]
    start_block: u64,

    /// The log index within the start block to start replaying from.
    #[arg(
        long,
        help = "The log index within the start block to start replaying from.",
        env = "ROLLUP_CHALLENGER_START_LOG_INDEX",
        default_value_t = 0
    )]
    start_log_index: u64,

    /// The private key used to sign timeout transactions.
    #[arg(
        long,
        short,
        help = "The private key used to sign timeout transactions.",
        env = "ROLLUP_CHALLENGER_PRIVATE_KEY"
    )]
    private_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command arguments
    let Args {
        v,
        ws_endpoint,
        challenge,
        kind,
        role,
        start_block,
        start_log_index,
        private_key,
    } = Args::parse();

    // Initialize the tracing subscriber
    init_tracing_subscriber(v)?;

    // Create the driver config.
    let driver_config = Arc::new(DriverConfig::new(
        ws_endpoint,
        challenge,
        kind,
        role,
        LogCursor::new(start_block, start_log_index),
    ));
    tracing::info!(target: "rollup-challenger-cli", "Driver config created successfully.");

    // Connect to the websocket endpoint and attach the signer.
    tracing::debug!(target: "rollup-challenger-cli", "Connecting to websocket endpoint...");
    let provider = Provider::<Ws>::connect(driver_config.ws_endpoint.clone()).await?;
    let chain_id = provider.get_chainid().await?.as_u64();
    let wallet = private_key.parse::<LocalWallet>()?.with_chain_id(chain_id);
    let client: Arc<SignerMiddlewareWS> = Arc::new(SignerMiddleware::new(provider, wallet));
    tracing::info!(target: "rollup-challenger-cli", "Websocket connected @ {}, chain id {}", &driver_config.ws_endpoint, chain_id);

    // Cancel the challenge instance on Ctrl-C.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(target: "rollup-challenger-cli", "Received Ctrl-C, shutting down...");
                cancel.cancel();
            }
        }
    });

    // Start the watcher and the driver.
    let source = Arc::new(EthersClient::new(Arc::clone(&client)));
    let contract = Arc::new(BisectionChallenge::new(challenge, Arc::clone(&client)));
    let driver = ChallengeDriver::spawn(
        Arc::clone(&driver_config),
        kind.watcher(challenge),
        source.clone(),
        cancel,
        source,
        contract,
    )
    .await?;
    tracing::info!(target: "rollup-challenger-cli", "Watching {} challenge {:?}", kind, challenge);

    // Start the driver loop.
    match driver.start_loop().await {
        Err(e)
            if e.downcast_ref::<ChallengeError>()
                .map_or(false, ChallengeError::is_cancelled) =>
        {
            tracing::info!(target: "rollup-challenger-cli", "Challenge driver cancelled.");
            Ok(())
        }
        res => res,
    }
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
