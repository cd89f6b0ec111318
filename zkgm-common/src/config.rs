//! Pipeline configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables of the form `ZKGM__SECTION__KEY`
//! (e.g. `ZKGM__RELAY__API_KEY`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "ZKGM";
const DEFAULT_SUBGRAPH_URL: &str =
    "https://api.studio.thegraph.com/query/97956/veranon-subgraph/v1.0.0";
const DEFAULT_RPC_URL: &str = "https://rpc-amoy.polygon.technology";
const DEFAULT_CHAIN_ID: u64 = 80002;
const DEFAULT_ARTIFACT_BASE_URL: &str = "https://snark-artifacts.pse.dev";
const DEFAULT_ARTIFACT_FAMILY: &str = "semaphore";
const DEFAULT_ARTIFACT_VERSION: &str = "4.0.0";
const DEFAULT_RELAY_URL: &str = "https://api.gelato.digital";
const DEFAULT_FEE_TOKEN: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub artifacts: ArtifactSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub witness: WitnessSettings,
    #[serde(default)]
    pub prover: ProverSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_subgraph_url")]
    pub subgraph_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Contract exposing `getMerkleTreeRoot` / `getMerkleTreeSize`.
    #[serde(default)]
    pub membership_contract: Option<String>,
    /// Contract exposing `verifyAccount`; the relay target.
    #[serde(default)]
    pub verifier_contract: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactSettings {
    #[serde(default = "default_artifact_base_url")]
    pub base_url: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_artifact_family")]
    pub family: String,
    #[serde(default = "default_artifact_version")]
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_relay_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_fee_token")]
    pub fee_token: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WitnessSettings {
    #[serde(default)]
    pub sanity_check: bool,
    /// Fixed circuit depth; defaults to the real proof length.
    #[serde(default)]
    pub merkle_tree_depth: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProverSettings {
    /// External Groth16 prover invoked as `<command> <zkey> <wtns> <proof> <public>`.
    #[serde(default = "default_prover_command")]
    pub command: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            subgraph_url: default_subgraph_url(),
        }
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: DEFAULT_CHAIN_ID,
            membership_contract: None,
            verifier_contract: None,
        }
    }
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            base_url: default_artifact_base_url(),
            cache_dir: default_cache_dir(),
            family: default_artifact_family(),
            version: default_artifact_version(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            base_url: default_relay_url(),
            api_key: None,
            fee_token: default_fee_token(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Default for ProverSettings {
    fn default() -> Self {
        Self {
            command: default_prover_command(),
            work_dir: default_work_dir(),
        }
    }
}

fn default_subgraph_url() -> String {
    DEFAULT_SUBGRAPH_URL.to_string()
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_artifact_base_url() -> String {
    DEFAULT_ARTIFACT_BASE_URL.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache/snark-artifacts")
}

fn default_artifact_family() -> String {
    DEFAULT_ARTIFACT_FAMILY.to_string()
}

fn default_artifact_version() -> String {
    DEFAULT_ARTIFACT_VERSION.to_string()
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_fee_token() -> String {
    DEFAULT_FEE_TOKEN.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_prover_command() -> String {
    "rapidsnark".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Settings {
    /// Load settings from an optional TOML file plus `ZKGM__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
