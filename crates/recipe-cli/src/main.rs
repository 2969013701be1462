use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use recipe_ledger::config::{
    DEFAULT_ABI_PATH, DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT, DEFAULT_RPC_URL,
};
use recipe_ledger::{normalize, LedgerConfig, RecipeLedger, TransactionReceipt};
use secrecy::SecretString;
use tracing::info;

mod reply;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    chain: ChainArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Node and contract settings. `PRIVATE_KEY` is only read from the
/// environment.
#[derive(Args, Debug)]
struct ChainArgs {
    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: String,

    /// Chain id the node must report before anything is signed.
    #[arg(long, env = "CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID, global = true)]
    chain_id: u64,

    /// Deployed RecipeStorage address.
    #[arg(long, env = "RECIPE_CONTRACT_ADDRESS", global = true)]
    contract_address: Option<String>,

    /// Contract artifact (Hardhat JSON) describing the ABI.
    #[arg(long, env = "RECIPE_ABI_PATH", default_value = DEFAULT_ABI_PATH, global = true)]
    abi_path: PathBuf,

    #[arg(long, env = "GAS_LIMIT", default_value_t = DEFAULT_GAS_LIMIT, global = true)]
    gas_limit: u64,

    /// Seconds to wait for a transaction receipt.
    #[arg(long, env = "RECEIPT_TIMEOUT_SECS", default_value_t = 120, global = true)]
    receipt_timeout_secs: u64,

    /// Milliseconds between receipt polls.
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 500, global = true)]
    poll_interval_ms: u64,

    /// Seconds before a single RPC request is abandoned.
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 30, global = true)]
    rpc_timeout_secs: u64,
}

impl ChainArgs {
    fn into_config(self) -> LedgerConfig {
        LedgerConfig {
            rpc_url: self.rpc_url,
            chain_id: self.chain_id,
            contract_address: self.contract_address,
            private_key: std::env::var("PRIVATE_KEY").ok().map(SecretString::from),
            abi_path: self.abi_path,
            gas_limit: self.gas_limit,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a recipe on chain and wait for it to be mined.
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        ingredients: String,
        #[arg(long)]
        instructions: String,
    },
    /// Store a recipe taken from a language-model reply.
    SaveReply {
        /// File holding the reply, or `-` for stdin.
        source: String,
        /// Print the parsed recipe without saving it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print one recipe as JSON.
    Get { id: u64 },
    /// List the ids of recipes created by an account.
    List {
        /// Defaults to the account of PRIVATE_KEY.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Print the number of recipes on the contract.
    Count,
    /// Show node connectivity and the configured identity.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so command output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "recipe-cli starting");

    // Nothing to connect to for a dry run.
    if let Commands::SaveReply {
        source,
        dry_run: true,
    } = &cli.command
    {
        let draft = reply::draft_from_reply(&read_source(source)?);
        println!("name: {}", draft.name);
        println!("ingredients: {}", draft.ingredients);
        println!("instructions:\n{}", draft.instructions);
        return Ok(());
    }

    let config = cli.chain.into_config();
    let ledger = RecipeLedger::from_config(&config).context("invalid configuration")?;

    match cli.command {
        Commands::Save {
            name,
            ingredients,
            instructions,
        } => {
            let receipt = ledger
                .save_recipe(&name, &ingredients, &instructions)
                .await
                .context("saving recipe failed")?;
            print_saved(&ledger, &receipt);
        }
        Commands::SaveReply { source, .. } => {
            let draft = reply::draft_from_reply(&read_source(&source)?);
            let receipt = ledger
                .save_recipe(&draft.name, &draft.ingredients, &draft.instructions)
                .await
                .with_context(|| format!("saving recipe {:?} failed", draft.name))?;
            print_saved(&ledger, &receipt);
        }
        Commands::Get { id } => {
            let record = ledger
                .get_recipe(id)
                .await
                .with_context(|| format!("reading recipe {id} failed"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::List { owner } => {
            let owner = match owner {
                Some(raw) => normalize(&raw).context("invalid --owner address")?,
                None => match ledger.account() {
                    Some(account) => account,
                    None => bail!("no --owner given and PRIVATE_KEY is not set"),
                },
            };
            let ids = ledger
                .get_owned_recipe_ids(&owner)
                .await
                .with_context(|| format!("listing recipes of {owner} failed"))?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Commands::Count => {
            let count = ledger.recipe_count().await.context("counting recipes failed")?;
            println!("{count}");
        }
        Commands::Status => {
            let status = ledger.network_status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.connected {
                bail!("node at {} is not reachable", config.rpc_url);
            }
        }
    }

    Ok(())
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading reply from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("reading reply from {source}"))
}

fn print_saved(ledger: &RecipeLedger, receipt: &TransactionReceipt) {
    let recipe_id = match ledger.created_recipe_id(receipt) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "could not read RecipeCreated log");
            None
        }
    };
    print!("{}", describe_saved(receipt, recipe_id));
}

fn describe_saved(receipt: &TransactionReceipt, recipe_id: Option<u64>) -> String {
    let mut out = format!(
        "transaction: {}\nblock: {}\ngas used: {}\n",
        receipt.transaction_hash, receipt.block_number, receipt.gas_used
    );
    if let Some(id) = recipe_id {
        out.push_str(&format!("recipe id: {id}\n"));
    }
    out
}
