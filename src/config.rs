//! Configuration management for the spinvault settlement core

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::domain::{Lamports, Pubkey, LAMPORTS_PER_SOL};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger;

/// Environment variable that overrides `wallet.signer_key`
pub const SIGNER_KEY_ENV: &str = "SPINVAULT_SIGNER_KEY";

/// Upper bound for `worker.retry_backoff_secs` (one year)
pub const MAX_RETRY_BACKOFF_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration for the settlement core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpinvaultConfig {
    pub ledger: LedgerConfig,
    pub wallet: WalletConfig,
    pub game: GameConfig,
    pub worker: WorkerConfig,
}

/// External ledger addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Vault program id
    pub program_id: Pubkey,
    /// Vault account; derived from the program id when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_address: Option<Pubkey>,
    /// Operational authority that signs batch commitments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_address: Option<Pubkey>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            program_id: Pubkey::new(DEFAULT_PROGRAM_ID),
            vault_address: None,
            authority_address: None,
        }
    }
}

// 7WLsmcUxHVJ1hF6X1rVkLfRmaFWGi8Xdwqjys3mvqYxB
const DEFAULT_PROGRAM_ID: [u8; 32] = [
    0x60, 0xaa, 0x70, 0x29, 0x3a, 0xd6, 0x88, 0xed, 0x11, 0x08, 0x9c, 0x64, 0x15, 0x22, 0xf4, 0x6e,
    0xe1, 0x10, 0x11, 0xd2, 0x9a, 0x82, 0x3b, 0xad, 0xda, 0x71, 0xff, 0x97, 0x8c, 0xed, 0xdc, 0xac,
];

impl LedgerConfig {
    /// Configured vault, or the program's `casino_vault` address
    pub fn vault(&self) -> SettlementResult<Pubkey> {
        match self.vault_address {
            Some(vault) => Ok(vault),
            None => Ok(ledger::vault_address(&self.program_id)?.0),
        }
    }
}

/// Withdrawal signing key
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Hex secp256k1 private key; normally supplied through the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_key: Option<String>,
}

impl fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConfig")
            .field("signer_key", &self.signer_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Game limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub min_bet: Lamports,
    pub max_bet: Lamports,
    /// Spins returned by a history query
    pub history_limit: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 100 * LAMPORTS_PER_SOL,
            history_limit: 50,
        }
    }
}

/// Batch anchoring worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    /// Maximum spins claimed into one batch
    pub batch_size: usize,
    /// Minimum wait before an unanchored batch is resubmitted
    pub retry_backoff_secs: u64,
    /// Submissions before a batch is marked FAILED
    pub max_submit_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 1000,
            retry_backoff_secs: 300,
            max_submit_attempts: 5,
        }
    }
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl SpinvaultConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SettlementResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SettlementError::Configuration {
            message: format!("Failed to read config file: {}", e),
            field: "config_file".to_string(),
        })?;

        let config: SpinvaultConfig = toml::from_str(&content).map_err(|e| SettlementError::Configuration {
            message: format!("Failed to parse config file: {}", e),
            field: "config_format".to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> SettlementResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SettlementError::Configuration {
            message: format!("Failed to serialize config: {}", e),
            field: "config_serialization".to_string(),
        })?;

        fs::write(path, content).map_err(|e| SettlementError::Configuration {
            message: format!("Failed to write config file: {}", e),
            field: "config_write".to_string(),
        })?;

        Ok(())
    }

    /// Take the signer key from `SPINVAULT_SIGNER_KEY` when it is set and
    /// not blank. Opt-in: neither [`from_file`](Self::from_file) nor
    /// `SettlementCore::new` reads the environment, so callers that keep the
    /// key out of the config file chain this before building the core.
    pub fn apply_env(mut self) -> Self {
        if let Ok(key) = std::env::var(SIGNER_KEY_ENV) {
            if !key.trim().is_empty() {
                self.wallet.signer_key = Some(key);
            }
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> SettlementResult<()> {
        if self.ledger.rpc_url.trim().is_empty() {
            return Err(SettlementError::Configuration {
                message: "RPC url must not be empty".to_string(),
                field: "ledger.rpc_url".to_string(),
            });
        }

        if self.game.min_bet == 0 {
            return Err(SettlementError::Configuration {
                message: "Minimum bet must be greater than 0".to_string(),
                field: "game.min_bet".to_string(),
            });
        }

        if self.game.min_bet > self.game.max_bet {
            return Err(SettlementError::Configuration {
                message: "Min bet must not exceed max bet".to_string(),
                field: "game.bet_limits".to_string(),
            });
        }

        if self.game.history_limit == 0 {
            return Err(SettlementError::Configuration {
                message: "History limit must be greater than 0".to_string(),
                field: "game.history_limit".to_string(),
            });
        }

        if self.worker.interval_secs == 0 {
            return Err(SettlementError::Configuration {
                message: "Worker interval must be greater than 0".to_string(),
                field: "worker.interval_secs".to_string(),
            });
        }

        if self.worker.batch_size == 0 {
            return Err(SettlementError::Configuration {
                message: "Batch size must be greater than 0".to_string(),
                field: "worker.batch_size".to_string(),
            });
        }

        if self.worker.retry_backoff_secs > MAX_RETRY_BACKOFF_SECS {
            return Err(SettlementError::Configuration {
                message: format!("Retry backoff must not exceed {} seconds", MAX_RETRY_BACKOFF_SECS),
                field: "worker.retry_backoff_secs".to_string(),
            });
        }

        if self.worker.max_submit_attempts == 0 {
            return Err(SettlementError::Configuration {
                message: "Max submit attempts must be greater than 0".to_string(),
                field: "worker.max_submit_attempts".to_string(),
            });
        }

        if let Some(key) = &self.wallet.signer_key {
            crate::crypto::WithdrawalSigner::from_hex(key).map_err(|e| SettlementError::Configuration {
                message: format!("Invalid signer key: {}", e),
                field: "wallet.signer_key".to_string(),
            })?;
        }

        Ok(())
    }

    /// Create a production configuration
    pub fn production() -> Self {
        Self {
            ledger: LedgerConfig {
                rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
                ..Default::default()
            },
            wallet: WalletConfig::default(),
            game: GameConfig {
                min_bet: LAMPORTS_PER_SOL / 1000, // 0.001 SOL
                max_bet: 10 * LAMPORTS_PER_SOL,
                history_limit: 50,
            },
            worker: WorkerConfig {
                interval_secs: 60,
                batch_size: 1000,
                retry_backoff_secs: 600,
                max_submit_attempts: 10,
            },
        }
    }

    /// Create a development configuration with relaxed settings
    pub fn development() -> Self {
        Self {
            ledger: LedgerConfig {
                rpc_url: "https://api.devnet.solana.com".to_string(),
                ..Default::default()
            },
            wallet: WalletConfig::default(),
            game: GameConfig {
                min_bet: 1,
                max_bet: 1_000 * LAMPORTS_PER_SOL,
                history_limit: 100,
            },
            worker: WorkerConfig {
                interval_secs: 10,     // anchor quickly while testing
                batch_size: 100,
                retry_backoff_secs: 30,
                max_submit_attempts: 3,
            },
        }
    }
}
