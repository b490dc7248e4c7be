use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

use kms_eth_account::digest::encode_signed;
use kms_eth_account::{
    KmsAccount, KmsConfig, LocalKeyOracle, SignableMessage, SigningOracle, TransactionRequest,
    TypedData,
};

#[derive(Parser)]
#[clap(about = "Sign Ethereum payloads with a key held by a remote KMS")]
struct Args {
    /// Sign with a local key derived from this seed instead of the KMS key.
    #[clap(long, env = "SIGNING_KEY_SEED")]
    signing_key_seed: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the account address.
    Address,
    /// Sign a personal message (EIP-191).
    SignMessage {
        message: String,
        /// Treat MESSAGE as 0x-prefixed hex bytes.
        #[clap(long)]
        raw: bool,
    },
    /// Sign an `eth_signTypedData_v4` JSON document.
    SignTypedData { path: PathBuf },
    /// Sign a transaction request JSON document and print the signed envelope.
    SignTransaction { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let account = KmsAccount::new(oracle(args.signing_key_seed).await?);

    match args.command {
        Command::Address => {
            let address = account.address().await.context("failed to derive address")?;
            println!("{address}");
        }
        Command::SignMessage { message, raw } => {
            let message = if raw {
                let bytes = hex::decode(message.strip_prefix("0x").unwrap_or(&message))
                    .context("message is not valid hex")?;
                SignableMessage::raw(bytes)
            } else {
                SignableMessage::text(message)
            };
            let signature = account
                .sign_message(&message)
                .await
                .context("failed to sign message")?;
            println!("{signature}");
        }
        Command::SignTypedData { path } => {
            let typed_data: TypedData = read_json(&path).await?;
            let signature = account
                .sign_typed_data(&typed_data)
                .await
                .context("failed to sign typed data")?;
            println!("{signature}");
        }
        Command::SignTransaction { path } => {
            let tx: TransactionRequest = read_json(&path).await?;
            let signature = account
                .sign_transaction(&tx)
                .await
                .context("failed to sign transaction")?;
            let signed = encode_signed(&tx, &signature).context("failed to encode transaction")?;
            println!("signature: {signature}");
            println!("raw: 0x{}", hex::encode(signed));
        }
    }

    Ok(())
}

async fn oracle(signing_key_seed: Option<String>) -> Result<Arc<dyn SigningOracle>> {
    if let Some(seed) = signing_key_seed {
        tracing::warn!("using a local seed-derived key, not the KMS key");
        return Ok(Arc::new(LocalKeyOracle::from_seed(&seed)?));
    }
    let config = KmsConfig::from_env().context("invalid KMS configuration")?;
    connect(config).await
}

#[cfg(feature = "aws")]
async fn connect(config: KmsConfig) -> Result<Arc<dyn SigningOracle>> {
    let oracle = kms_eth_account::AwsKmsOracle::connect(config)
        .await
        .context("invalid KMS configuration")?;
    Ok(Arc::new(oracle))
}

#[cfg(not(feature = "aws"))]
async fn connect(config: KmsConfig) -> Result<Arc<dyn SigningOracle>> {
    anyhow::bail!(
        "KMS key {} is configured but this build has no KMS backend; \
         rebuild with `--features aws` or pass --signing-key-seed",
        config.key_id
    )
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}
