//! Error types for the spinvault settlement core

use std::collections::HashMap;
use thiserror::Error;

/// Main error type for the settlement core
///
/// Domain variants are user-facing rejections; `Storage`, `Ledger`,
/// `Cryptographic`, `Configuration` and `Serialization` are infrastructure
/// failures that a boundary layer should surface as opaque server errors.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("session is inactive")]
    SessionInactive,

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("batch {batch_id} is already closed")]
    BatchClosed { batch_id: u64 },

    #[error("spin {spin_id} is not anchored to the ledger yet")]
    NotAnchoredYet { spin_id: String },

    #[error("spin {spin_id} not found in batch {batch_id}")]
    NotFoundInBatch { spin_id: String, batch_id: u64 },

    #[error("invalid bet: {message}")]
    InvalidBet { message: String },

    #[error("invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("invalid wallet address: {0}")]
    InvalidWalletAddress(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("spin not found: {0}")]
    SpinNotFound(String),

    #[error("pending withdrawal exists for {pending} lamports, resolve it first")]
    PendingWithdrawalMismatch { pending: u64 },

    #[error("no pending withdrawal to refund")]
    NoPendingWithdrawal,

    #[error("cannot refund: withdrawal nonce {nonce} appears to have succeeded on-chain")]
    RefundRefused { nonce: u64 },

    #[error("transaction {0} already processed")]
    DepositAlreadyProcessed(String),

    #[error("invalid deposit: {message}")]
    InvalidDeposit { message: String },

    #[error("concurrent update conflict: {message}")]
    Conflict { message: String },

    #[error("Storage error: {source}")]
    Storage {
        source: StoreError,
        context: String,
    },

    #[error("Ledger error: {source}")]
    Ledger {
        source: LedgerError,
        context: String,
    },

    #[error("Cryptographic error: {source}")]
    Cryptographic {
        source: CryptoError,
        context: String,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: String,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Hex decoding error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl SettlementError {
    /// True for rejections caused by the caller's request rather than by
    /// the service's own infrastructure
    pub fn is_domain_error(&self) -> bool {
        !matches!(
            self,
            SettlementError::Storage { .. }
                | SettlementError::Ledger { .. }
                | SettlementError::Cryptographic { .. }
                | SettlementError::Configuration { .. }
                | SettlementError::Serialization { .. }
                | SettlementError::HexDecode(_)
        )
    }

    pub(crate) fn storage(source: StoreError, context: &str) -> Self {
        SettlementError::Storage {
            source,
            context: context.to_string(),
        }
    }

    pub(crate) fn ledger(source: LedgerError, context: &str) -> Self {
        SettlementError::Ledger {
            source,
            context: context.to_string(),
        }
    }
}

/// Failures reported by a ledger store implementation
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("conditional update matched no rows: {message}")]
    ConditionFailed { message: String },

    #[error("unique constraint violated: {entity} {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Failures reported by the external ledger RPC
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("RPC request failed: {message}")]
    Rpc { message: String },

    #[error("transaction rejected: {message}")]
    Rejected { message: String },

    #[error("invalid account data: {message}")]
    InvalidAccountData { message: String },

    #[error("invalid public key: {message}")]
    InvalidPubkey { message: String },
}

/// Cryptographic error types
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("Invalid key: {message}")]
    InvalidKey { message: String },

    #[error("Signing failed: {message}")]
    SigningFailed { message: String },

    #[error("Random source failure: {message}")]
    Entropy { message: String },

    #[error("Merkle computation failed: {message}")]
    Merkle { message: String },
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        SettlementError::Storage {
            source: err,
            context: String::new(),
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(err: LedgerError) -> Self {
        SettlementError::Ledger {
            source: err,
            context: String::new(),
        }
    }
}

impl From<CryptoError> for SettlementError {
    fn from(err: CryptoError) -> Self {
        SettlementError::Cryptographic {
            source: err,
            context: String::new(),
        }
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(err: serde_json::Error) -> Self {
        SettlementError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Error context for tracking errors through the system
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Utility functions for cryptographic operations
pub mod utils {
    use sha2::{Digest, Sha256};

    /// Compute SHA256 hash of input data
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Convert bytes to hexadecimal string
    pub fn to_hex(bytes: &[u8]) -> String {
        hex::encode(bytes)
    }

    /// Compute SHA256 hash and return as hex string
    pub fn sha256_hex(data: &[u8]) -> String {
        to_hex(&sha256(data))
    }
}

/// Type alias for the main result type used throughout the library
pub type SettlementResult<T> = Result<T, SettlementError>;

/// Logging configuration and initialization
pub mod logging {
    use std::env;
    use tracing::Level;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    /// Logging output format
    #[derive(Debug, Clone)]
    pub enum LogFormat {
        Human,
        Json,
    }

    /// Logging output destination
    #[derive(Debug, Clone)]
    pub enum LogOutput {
        Stdout,
        Stderr,
    }

    /// Logging configuration
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        pub level: Level,
        pub format: LogFormat,
        pub output: LogOutput,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                format: LogFormat::Human,
                output: LogOutput::Stdout,
            }
        }
    }

    /// Initialize structured logging with the given configuration
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(config.level.into())
            .from_env_lossy()
            .add_directive("spinvault=debug".parse()?)
            .add_directive("tokio=info".parse()?);

        let registry = tracing_subscriber::registry().with(env_filter);

        match config.format {
            LogFormat::Human => {
                let fmt_layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true);

                match config.output {
                    LogOutput::Stdout => registry.with(fmt_layer.with_writer(std::io::stdout)).try_init()?,
                    LogOutput::Stderr => registry.with(fmt_layer.with_writer(std::io::stderr)).try_init()?,
                }
            }
            LogFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(fmt::format::FmtSpan::CLOSE);

                match config.output {
                    LogOutput::Stdout => registry.with(fmt_layer.with_writer(std::io::stdout)).try_init()?,
                    LogOutput::Stderr => registry.with(fmt_layer.with_writer(std::io::stderr)).try_init()?,
                }
            }
        }

        Ok(())
    }

    /// Initialize logging with environment-based configuration
    pub fn init_from_env() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let level = env::var("SPINVAULT_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string())
            .parse::<Level>()
            .unwrap_or(Level::INFO);

        let format = match env::var("SPINVAULT_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        let output = match env::var("SPINVAULT_LOG_OUTPUT").as_deref() {
            Ok("stderr") => LogOutput::Stderr,
            _ => LogOutput::Stdout,
        };

        init_logging(LoggingConfig { level, format, output })
    }
}
