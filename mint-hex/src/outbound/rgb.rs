//! RGB token distributor adapters.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use mint_types::{Consignment, Distribution, DistributionError, TokenDistributor};

/// Header line of consignments produced by [`MockDistributor`].
pub const MOCK_CONSIGNMENT_HEADER: &[u8] = b"RGB_CONSIGNMENT_V1\n";

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

/// Produces deterministic fake consignments without touching an RGB node.
#[derive(Debug, Default)]
pub struct MockDistributor {
    fail_with: Option<String>,
}

impl MockDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A distributor whose every transfer fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
        }
    }
}

#[async_trait]
impl TokenDistributor for MockDistributor {
    async fn distribute(
        &self,
        distribution: Distribution,
    ) -> Result<Consignment, DistributionError> {
        if let Some(reason) = &self.fail_with {
            return Err(DistributionError::Transfer(reason.clone()));
        }

        let digest = Sha256::new()
            .chain_update(distribution.invoice_id.to_string())
            .chain_update(distribution.rgb_invoice.as_bytes())
            .chain_update(distribution.token_amount.to_be_bytes())
            .finalize();

        let mut bytes = MOCK_CONSIGNMENT_HEADER.to_vec();
        bytes.extend_from_slice(&digest);

        Ok(Consignment {
            transfer_id: format!("mock-transfer-{}", hex::encode(&digest[..8])),
            bytes,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// rgb CLI
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for [`RgbCliDistributor`].
#[derive(Debug, Clone)]
pub struct RgbCliConfig {
    /// Path to the `rgb` binary
    pub binary: PathBuf,
    pub network: String,
    pub wallet: String,
    pub contract_id: String,
    /// Consignment files are written under `<data_dir>/consignments`
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

/// Sends tokens by running the `rgb` command line wallet.
pub struct RgbCliDistributor {
    config: RgbCliConfig,
}

impl RgbCliDistributor {
    pub fn new(config: RgbCliConfig) -> Self {
        Self { config }
    }

    fn consignment_path(&self, distribution: &Distribution) -> PathBuf {
        self.config
            .data_dir
            .join("consignments")
            .join(format!("{}.rgb", distribution.invoice_id))
    }
}

#[async_trait]
impl TokenDistributor for RgbCliDistributor {
    #[tracing::instrument(skip(self, distribution), fields(invoice_id = %distribution.invoice_id, amount = distribution.token_amount))]
    async fn distribute(
        &self,
        distribution: Distribution,
    ) -> Result<Consignment, DistributionError> {
        let path = self.consignment_path(&distribution);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DistributionError::Consignment(e.to_string()))?;
        }

        let mut command = Command::new(&self.config.binary);
        command
            .arg("--network")
            .arg(&self.config.network)
            .arg("transfer")
            .arg("--wallet")
            .arg(&self.config.wallet)
            .arg("--contract")
            .arg(&self.config.contract_id)
            .arg("--amount")
            .arg(distribution.token_amount.to_string())
            .arg("--invoice")
            .arg(&distribution.rgb_invoice)
            .arg("--consignment")
            .arg(&path)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| DistributionError::Timeout(self.config.timeout.as_secs()))?
            .map_err(|e| DistributionError::Transfer(format!("failed to run rgb: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DistributionError::Transfer(format!(
                "rgb exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DistributionError::Consignment(e.to_string()))?;

        // The CLI prints the transfer id as its last line; fall back to the consignment digest.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let transfer_id = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| hex::encode(Sha256::digest(&bytes)));

        tracing::info!(%transfer_id, size = bytes.len(), "Consignment written to {}", path.display());

        Ok(Consignment { transfer_id, bytes })
    }
}
