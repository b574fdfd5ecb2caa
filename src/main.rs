use chain_node::config::{MinerConfig, NodeConfig};
use chain_node::error::{NodeError, NodeResult};
use chain_node::message::PeerId;
use chain_node::miner::Miner;
use chain_node::overlay::{MessageHandler, Overlay};
use chain_node::wallet::Wallet;
use clap::{Args, Parser, Subcommand};
use ledger_core::Chain;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "chain-node")]
#[command(about = "Peer-to-peer proof-of-work cryptocurrency node")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the overlay without mining or holding funds, just forwarding gossip
    Relay(RelayArgs),
    /// Run a miner: mempool, PoW search, chain management, fork resolution
    Miner(MinerArgs),
    /// Run a wallet: balance queries and spend construction
    Wallet(WalletArgs),
}

#[derive(Args)]
struct OverlayArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 for an OS-assigned port)
    #[arg(long, default_value = "0")]
    port: u16,

    /// Name announced to peers alongside this node's address
    #[arg(long, default_value = "node")]
    node_name: String,

    /// Bootstrap peers to announce to, as host:port
    #[arg(long = "known-node")]
    known_nodes: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args)]
struct RelayArgs {
    #[command(flatten)]
    overlay: OverlayArgs,
}

#[derive(Args)]
struct MinerArgs {
    #[command(flatten)]
    overlay: OverlayArgs,

    /// Leading zero hex characters a block hash must have to be valid
    #[arg(long, default_value_t = ledger_core::DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Minimum mempool size before a candidate block is assembled
    #[arg(long, default_value = "2")]
    block_min_transactions: usize,

    /// Coinbase reward paid to the reward address for each mined block
    #[arg(long, default_value = "50")]
    reward: u64,

    /// Address the coinbase reward is paid to
    #[arg(long, default_value = "miner")]
    reward_address: String,
}

#[derive(Args)]
struct WalletArgs {
    #[command(flatten)]
    overlay: OverlayArgs,

    #[command(subcommand)]
    action: WalletAction,
}

#[derive(Subcommand)]
enum WalletAction {
    /// Refresh and print this wallet's balance
    Balance,
    /// Send an amount to a receiver address
    Send {
        receiver: String,
        amount: u64,
    },
}

fn main() -> NodeResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Relay(args) => run_relay(args),
        Commands::Miner(args) => run_miner(args),
        Commands::Wallet(args) => run_wallet(args),
    }
}

fn init_logging(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

fn node_config(overlay: &OverlayArgs) -> NodeResult<NodeConfig> {
    let known_nodes = overlay
        .known_nodes
        .iter()
        .map(|s| parse_peer_id(s))
        .collect::<NodeResult<Vec<PeerId>>>()?;

    Ok(NodeConfig {
        host: overlay.host.clone(),
        port: overlay.port,
        node_name: overlay.node_name.clone(),
        known_nodes,
        ..NodeConfig::default()
    })
}

fn parse_peer_id(raw: &str) -> NodeResult<PeerId> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| NodeError::InvalidAddress(raw.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| NodeError::InvalidAddress(raw.to_string()))?;
    Ok((host.to_string(), port))
}

struct RelayHandler;

impl MessageHandler for RelayHandler {
    fn handle(&self, _overlay: &Arc<Overlay>, _envelope: &chain_node::message::Envelope) {}
}

fn run_relay(args: RelayArgs) -> NodeResult<()> {
    init_logging(&args.overlay.log_level);
    let config = node_config(&args.overlay)?;
    let overlay = Overlay::start(config, Arc::new(RelayHandler))?;
    info!(host = %overlay.local_id().0, port = overlay.local_id().1, "relay listening");

    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

fn run_miner(args: MinerArgs) -> NodeResult<()> {
    init_logging(&args.overlay.log_level);
    let config = node_config(&args.overlay)?;

    let miner_config = MinerConfig {
        difficulty: args.difficulty,
        block_min_transactions: args.block_min_transactions,
        reward: args.reward,
        reward_address: args.reward_address,
    };

    let chain = Chain::new(miner_config.reward, &miner_config.reward_address, miner_config.difficulty)?;
    let miner = Miner::new(miner_config, chain)?;

    let overlay = Overlay::start(config, miner.clone())?;
    miner.attach_overlay(overlay.clone());
    info!(host = %overlay.local_id().0, port = overlay.local_id().1, "miner listening");

    let _worker = miner.clone().spawn();
    loop {
        thread::sleep(Duration::from_secs(5));
        info!(height = miner.chain_height(), mempool = miner.mempool_len(), "miner status");
    }
}

fn run_wallet(args: WalletArgs) -> NodeResult<()> {
    init_logging(&args.overlay.log_level);
    let config = node_config(&args.overlay)?;

    let wallet = Wallet::generate()?;
    let _overlay = chain_node::wallet::start(config, wallet.clone())?;
    info!(address = %wallet.address(), "wallet listening");

    thread::sleep(Duration::from_millis(300));

    match args.action {
        WalletAction::Balance => {
            wallet.refresh_balance()?;
            println!("balance: {}", wallet.get_balance());
        }
        WalletAction::Send { receiver, amount } => {
            wallet.refresh_balance()?;
            let tx = wallet.send_crypto(&receiver, amount)?;
            println!("sent transaction {}", tx.hash()?);
        }
    }

    Ok(())
}
