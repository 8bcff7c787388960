//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Engine**: the single serialized agreement engine. Mutating calls
//!   wait on its lock and fsync its journal, so handlers run them through
//!   [`AppState::run_engine`] on the blocking pool.
//! - **Oracle**: the settable feed behind `getOracleData`.
//! - **ERP simulator**: answers `/sync-agreement` and `/sync-status/:id`.
//! - **CAS**: backs `/api/ipfs/pin-json`.
//! - **Verdicts**: written by the proof auditor task, read by supplier lookup.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use isopep_agreement::{
    AgreementEngine, AgreementError, Deployment, FileJournal, Journal, MemoryJournal, MockOracle,
};
use isopep_connect::{AllowlistVerifier, FsCas, MemoryCas, MemoryErp, UploadService, VerdictBook};
use isopep_core::{ContentDigest, PartyId, ValidationError};

use crate::error::AppError;

/// Configuration could not be assembled from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Identity {
        var: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// File-backed journal; in-memory when `None`.
    pub journal_path: Option<PathBuf>,
    /// Initial mock oracle reading.
    pub oracle_value: i128,
    /// Make the ERP simulator fail every sync.
    pub fail_erp: bool,
    pub deployment: Deployment,
    /// Filesystem CAS root; in-memory when `None`.
    pub cas_dir: Option<PathBuf>,
    /// External ERP for the outbox relay; the in-process simulator when `None`.
    pub erp_url: Option<String>,
    /// Proof digests the auditor accepts.
    pub proof_allowlist: Vec<ContentDigest>,
    /// Emit JSON log lines.
    pub json_logs: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("journal_path", &self.journal_path)
            .field("oracle_value", &self.oracle_value)
            .field("fail_erp", &self.fail_erp)
            .field("deployment", &self.deployment)
            .field("cas_dir", &self.cas_dir)
            .field("erp_url", &self.erp_url)
            .field("proof_allowlist", &self.proof_allowlist.len())
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            journal_path: None,
            oracle_value: 0,
            fail_erp: false,
            deployment: Deployment {
                buyer: PartyId::from_static("buyer"),
                oracle: PartyId::from_static("oracle"),
                arbitrator: PartyId::from_static("arbitrator"),
            },
            cas_dir: None,
            erp_url: None,
            proof_allowlist: Vec::new(),
            json_logs: false,
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl AppConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value: port.clone(),
            })?;
        }
        config.auth_token = lookup("AUTH_TOKEN").filter(|t| !t.is_empty());
        config.journal_path = lookup("ISOPEP_JOURNAL").map(PathBuf::from);
        if let Some(value) = lookup("ISOPEP_ORACLE_VALUE") {
            config.oracle_value = value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "ISOPEP_ORACLE_VALUE",
                value: value.clone(),
            })?;
        }
        config.fail_erp = lookup("ISOPEP_FAIL_ERP").is_some_and(|v| flag(&v));

        for (var, slot) in [
            ("ISOPEP_BUYER", &mut config.deployment.buyer),
            ("ISOPEP_ORACLE", &mut config.deployment.oracle),
            ("ISOPEP_ARBITRATOR", &mut config.deployment.arbitrator),
        ] {
            if let Some(value) = lookup(var) {
                *slot = PartyId::new(value).map_err(|source| ConfigError::Identity { var, source })?;
            }
        }

        config.cas_dir = lookup("ISOPEP_CAS_DIR").map(PathBuf::from);
        config.erp_url = lookup("ISOPEP_ERP_URL").filter(|u| !u.is_empty());
        if let Some(list) = lookup("ISOPEP_PROOF_ALLOWLIST") {
            config.proof_allowlist = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    ContentDigest::parse(s).map_err(|_| ConfigError::Invalid {
                        var: "ISOPEP_PROOF_ALLOWLIST",
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        config.json_logs = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(config)
    }
}

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AgreementEngine>,
    pub oracle: Arc<MockOracle>,
    pub erp: Arc<MemoryErp>,
    pub cas: Arc<dyn UploadService>,
    pub verdicts: Arc<VerdictBook>,
    pub verifier: Arc<AllowlistVerifier>,
    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Run an engine operation on the blocking pool.
    pub async fn run_engine<T, F>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&AgreementEngine) -> Result<T, AgreementError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| AppError::Internal(format!("engine task failed: {e}")))?
            .map_err(AppError::from)
    }

    /// In-memory state with default configuration.
    pub fn new() -> Self {
        let config = AppConfig::default();
        let oracle = Arc::new(MockOracle::with_answer(config.oracle_value));
        let engine = AgreementEngine::new(config.deployment.clone()).with_oracle(oracle.clone());
        Self::assemble(engine, oracle, config)
    }

    /// Open the journal and stores named by `config`.
    pub fn with_config(config: AppConfig) -> Result<Self, AgreementError> {
        let journal: Box<dyn Journal> = match &config.journal_path {
            Some(path) => Box::new(FileJournal::open(path)?),
            None => Box::new(MemoryJournal::new()),
        };
        let oracle = Arc::new(MockOracle::with_answer(config.oracle_value));
        let engine =
            AgreementEngine::open(config.deployment.clone(), journal)?.with_oracle(oracle.clone());
        Ok(Self::assemble(engine, oracle, config))
    }

    fn assemble(engine: AgreementEngine, oracle: Arc<MockOracle>, config: AppConfig) -> Self {
        let erp = Arc::new(MemoryErp::new());
        erp.set_failing(config.fail_erp);
        let cas: Arc<dyn UploadService> = match &config.cas_dir {
            Some(dir) => Arc::new(FsCas::new(dir)),
            None => Arc::new(MemoryCas::new()),
        };
        let verifier = Arc::new(AllowlistVerifier::new(config.proof_allowlist.iter().copied()));
        Self {
            engine: Arc::new(engine),
            oracle,
            erp,
            cas,
            verdicts: Arc::new(VerdictBook::new()),
            verifier,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
