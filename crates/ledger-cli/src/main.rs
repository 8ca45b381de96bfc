use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{
    address_of, now_millis, Address, BlockBuilder, Ed25519Provider, Ledger, LedgerConfig,
    SigningProvider, StopSignal, Transaction,
};
use ledger_storage::SledStore;
use serde::Serialize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "Drive the minimal signed ledger from the command line")]
struct Cli {
    /// JSON file with ledger settings ({"capacity": .., "difficulty": ..})
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Transactions per block
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Leading zero hex digits required when sealing (0 = no mining)
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a ledger, issue credit, transfer and print the resulting state
    Demo {
        /// Signed transfers to submit after the initial credit
        #[arg(long, default_value_t = 12)]
        transfers: usize,
        /// Persist the sealed chain into this sled directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Generate a key pair and print its derived address
    Keygen {
        /// 32-byte hex seed for a deterministic key
        #[arg(long)]
        seed: Option<String>,
    },
    /// Mine an empty block at the given difficulty
    Mine {
        #[arg(long, default_value_t = 4)]
        target: u32,
        /// Give up after this many milliseconds
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
        /// Search nonces on all cores
        #[arg(long)]
        parallel: bool,
    },
    /// Load a persisted chain and check its integrity
    Verify {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

#[derive(Serialize)]
struct KeygenOut {
    seed: String,
    public_key: String,
    address: String,
}

#[derive(Serialize)]
struct MineOut {
    difficulty: u32,
    nonce: u64,
    hash: String,
    elapsed_ms: u128,
}

fn load_config(cli: &Cli) -> Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(capacity) = cli.capacity {
        if capacity == 0 {
            bail!("--capacity must be at least 1");
        }
        config.capacity = capacity;
    }
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = difficulty;
    }
    Ok(config)
}

fn parse_seed(seed: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(seed).context("seed is not hex")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("seed must be 32 bytes, got {}", b.len()))
}

fn demo(config: LedgerConfig, transfers: usize, data_dir: Option<PathBuf>) -> Result<()> {
    let provider = Ed25519Provider::new();
    let key = provider.generate_key_pair();
    let wallet = address_of(&provider, &key);
    let recipient = Address::new("recipient-here");

    let mut ledger = Ledger::with_config(provider, config);
    ledger.add_transaction(Transaction::system(wallet.clone(), 100))?;
    for i in 0..transfers {
        let mut tx = Transaction::new(wallet.clone(), recipient.clone(), (i % 5 + 1) as i64);
        tx.sign(ledger.provider(), &key)?;
        ledger.add_transaction(tx)?;
    }

    // A transfer signed by someone else is refused
    let intruder = ledger.provider().generate_key_pair();
    let mut spoofed = Transaction::new(wallet.clone(), recipient.clone(), 50);
    if let Err(err) = spoofed.sign(ledger.provider(), &intruder) {
        println!("spoofed signing refused: {err}");
    }

    ledger.seal_open_block()?;

    println!("Is chain valid: {}", ledger.check_integrity());
    println!("Amount of blocks: {}", ledger.block_count());
    for (height, block) in ledger.blocks().iter().enumerate() {
        println!(
            "  #{height} txs={} nonce={} hash={}",
            block.len(),
            block.nonce(),
            hex::encode(block.hash())
        );
    }
    println!("Wallet address: {wallet}");
    println!("Balance: {}", ledger.balance_of(&wallet));
    println!("Recipient balance: {}", ledger.balance_of(&recipient));

    if let Some(dir) = data_dir {
        let store = SledStore::open(&dir)?;
        let written = ledger.persist(&store)?;
        info!(written, dir = %dir.display(), "chain persisted");
    }
    Ok(())
}

fn keygen(seed: Option<String>) -> Result<()> {
    let provider = Ed25519Provider::new();
    let key = match seed {
        Some(seed) => provider.key_pair_from_seed(&parse_seed(&seed)?),
        None => provider.generate_key_pair(),
    };
    let out = KeygenOut {
        seed: hex::encode(key.to_bytes()),
        public_key: hex::encode(provider.public_key_of(&key)),
        address: address_of(&provider, &key).to_string(),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn mine(target: u32, timeout_ms: u64, parallel: bool) -> Result<()> {
    let stop = StopSignal::new();
    let timer = stop.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(timeout_ms));
        timer.stop();
    });

    let mut builder = BlockBuilder::new(now_millis(), None);
    let started = Instant::now();
    if parallel {
        builder.mine_parallel(target, &stop)?;
    } else {
        builder.mine(target, &stop)?;
    }
    let block = builder.seal();
    let out = MineOut {
        difficulty: target,
        nonce: block.nonce(),
        hash: hex::encode(block.hash()),
        elapsed_ms: started.elapsed().as_millis(),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn verify(config: LedgerConfig, data_dir: PathBuf) -> Result<()> {
    let store = SledStore::open(&data_dir)?;
    let ledger = Ledger::load(Ed25519Provider::new(), config, &store)?;
    println!(
        "chain at {} is valid: {} blocks, tip {}",
        data_dir.display(),
        ledger.blocks().len(),
        hex::encode(ledger.latest_block().hash())
    );
    Ok(())
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match cli.cmd {
        Command::Demo {
            transfers,
            data_dir,
        } => demo(config, transfers, data_dir),
        Command::Keygen { seed } => keygen(seed),
        Command::Mine {
            target,
            timeout_ms,
            parallel,
        } => mine(target, timeout_ms, parallel),
        Command::Verify { data_dir } => verify(config, data_dir),
    }
}
