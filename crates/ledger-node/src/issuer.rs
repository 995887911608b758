use crate::constants::{ASSET_MINT_AMOUNT, ASSET_TRUST_LIMIT, MAX_ASSET_CODE_LEN};
use anyhow::{bail, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External collaborator that issues an asset on behalf of the node.
///
/// Issuance runs detached from the ledger; its outcome never affects mining.
pub trait AssetIssuer: Send + Sync + 'static {
    fn issue(&self, asset: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Logs the trustline and payment an issuer would submit without talking to
/// any network.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunIssuer;

pub fn validate_asset_code(asset: &str) -> Result<()> {
    if asset.is_empty() || asset.len() > MAX_ASSET_CODE_LEN {
        bail!("asset code must be 1 to {MAX_ASSET_CODE_LEN} characters, got {asset:?}");
    }
    if !asset.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("asset code {asset:?} must be alphanumeric");
    }
    Ok(())
}

impl AssetIssuer for DryRunIssuer {
    async fn issue(&self, asset: &str) -> Result<()> {
        validate_asset_code(asset)?;
        info!(asset, limit = ASSET_TRUST_LIMIT, "dry run: trustline to issuer");
        info!(asset, amount = ASSET_MINT_AMOUNT, "dry run: payment from issuer");
        Ok(())
    }
}

pub fn spawn_issue<I: AssetIssuer>(issuer: Arc<I>, asset: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        match issuer.issue(&asset).await {
            Ok(()) => info!(%asset, "asset issued"),
            Err(err) => warn!(%asset, "asset issuance failed: {err:#}"),
        }
    })
}
