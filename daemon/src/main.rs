//! lattice daemon — runs a node or performs key utilities.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use lattice_crypto::{derive_account, generate_keypair, keypair_from_seed};
use lattice_node::{genesis_account, init_logging, LogFormat, Node, NodeConfig};
use lattice_types::{Account, NetworkId};

#[derive(Parser)]
#[command(name = "lattice-daemon", about = "lattice block-lattice node")]
struct Cli {
    /// Network: "live", "beta", or "test".
    #[arg(long, default_value = "live", env = "LATTICE_NETWORK")]
    network: String,

    /// Data directory holding the config file.
    #[arg(long, default_value = "./lattice_data", env = "LATTICE_DATA_DIR")]
    data_dir: PathBuf,

    /// Override the UDP peering port.
    #[arg(long, env = "LATTICE_PEERING_PORT")]
    peering_port: Option<u16>,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info", env = "LATTICE_LOG_LEVEL")]
    log_level: String,

    /// Log format: "human" or "json".
    #[arg(long, default_value = "human", env = "LATTICE_LOG_FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node.
    #[command(name = "node_run")]
    NodeRun,

    /// Generate a random key pair and print it.
    #[command(name = "key_create")]
    KeyCreate,

    /// Expand a private key into its public key and account.
    #[command(name = "key_expand")]
    KeyExpand {
        #[arg(long)]
        key: String,
    },

    /// Print the account string for a public key.
    #[command(name = "account_get")]
    AccountGet {
        #[arg(long)]
        key: String,
    },

    /// Print the public key behind an account string.
    #[command(name = "account_key")]
    AccountKey {
        #[arg(long)]
        account: String,
    },

    /// Print environment diagnostics.
    #[command(name = "diagnostics")]
    Diagnostics,
}

fn parse_network(text: &str) -> anyhow::Result<NetworkId> {
    match text {
        "live" => Ok(NetworkId::Live),
        "beta" => Ok(NetworkId::Beta),
        "test" => Ok(NetworkId::Test),
        other => bail!("unknown network {other:?}"),
    }
}

fn parse_seed(text: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(text).context("key is not hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("key must be 32 bytes of hex"))
}

/// Load the config file, creating it with defaults when absent and writing
/// it back when an upgrade rewrote the tree.
fn load_config(network: NetworkId, data_dir: &PathBuf) -> anyhow::Result<NodeConfig> {
    let path = data_dir.join("config.json");
    if !path.exists() {
        let config = NodeConfig::new(network);
        std::fs::create_dir_all(data_dir).context("creating data directory")?;
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&config.serialize_json())?,
        )
        .context("writing default config")?;
        tracing::info!(path = %path.display(), "wrote default config");
        return Ok(config);
    }
    let contents = std::fs::read_to_string(&path).context("reading config")?;
    let mut tree: serde_json::Value =
        serde_json::from_str(&contents).context("config is not valid JSON")?;
    let (config, upgraded) =
        NodeConfig::deserialize_json(network, &mut tree).context("bad config")?;
    if upgraded {
        std::fs::write(&path, serde_json::to_string_pretty(&tree)?)
            .context("writing upgraded config")?;
        tracing::info!(path = %path.display(), "config upgraded");
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    init_logging(format, &cli.log_level);

    let network = parse_network(&cli.network)?;

    match cli.command {
        Command::NodeRun => {
            let mut config = load_config(network, &cli.data_dir)?;
            if let Some(port) = cli.peering_port {
                config.peering_port = port;
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.io_threads as usize)
                .enable_all()
                .build()
                .context("building runtime")?;
            runtime.block_on(async move {
                let node = Node::new(config, network).await?;
                node.start();
                tracing::info!(
                    network = network.as_str(),
                    port = node.udp.port(),
                    "node started"
                );
                tokio::signal::ctrl_c().await?;
                node.stop();
                anyhow::Ok(())
            })?;
            tracing::info!("daemon exited cleanly");
        }
        Command::KeyCreate => {
            let keypair = generate_keypair();
            println!("Private: {}", hex::encode(keypair.private.0).to_uppercase());
            println!("Public: {}", hex::encode(keypair.public.0).to_uppercase());
            println!("Account: {}", derive_account(&keypair.public).encode_account());
        }
        Command::KeyExpand { key } => {
            let keypair = keypair_from_seed(&parse_seed(&key)?);
            println!("Private: {}", key.to_uppercase());
            println!("Public: {}", hex::encode(keypair.public.0).to_uppercase());
            println!("Account: {}", derive_account(&keypair.public).encode_account());
        }
        Command::AccountGet { key } => {
            let account =
                Account::decode_hex(&key).ok_or_else(|| anyhow!("key is not a 64-hex string"))?;
            println!("Account: {}", account.encode_account());
        }
        Command::AccountKey { account } => {
            let account = Account::decode_account(&account)
                .ok_or_else(|| anyhow!("invalid account string"))?;
            println!("Hex: {account}");
        }
        Command::Diagnostics => {
            println!("Network: {}", network.as_str());
            println!("Genesis: {}", genesis_account(network).encode_account());
            println!(
                "Work threshold: {:#018x}",
                lattice_work::network_threshold(network)
            );
            let root = lattice_types::Root::from(genesis_account(network));
            let nonce = lattice_work::WorkGenerator::new(1)
                .generate(&root, lattice_work::network_threshold(NetworkId::Test));
            println!("Test work nonce: {nonce:#018x}");
        }
    }
    Ok(())
}
