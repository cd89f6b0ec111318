//! Groth16 proving backends.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use zkgm_relayer::Groth16Proof;

use crate::error::{io, PipelineError, Result};

pub const PROOF_FILE: &str = "proof.json";
pub const PUBLIC_FILE: &str = "public.json";

/// Proof plus public signals, as written by the prover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProverOutput {
    pub proof: Groth16Proof,
    /// `[root, nullifier, message, scope]` as decimal strings.
    pub public_signals: Vec<String>,
    pub proof_path: PathBuf,
    pub public_path: PathBuf,
}

impl ProverOutput {
    /// Load a proof and its public signals from disk.
    pub async fn read(proof_path: impl Into<PathBuf>, public_path: impl Into<PathBuf>) -> Result<Self> {
        let proof_path = proof_path.into();
        let public_path = public_path.into();

        let raw_proof = tokio::fs::read_to_string(&proof_path)
            .await
            .map_err(io(&proof_path))?;
        let proof = Groth16Proof::from_json(&raw_proof)?;

        let raw_public = tokio::fs::read_to_string(&public_path)
            .await
            .map_err(io(&public_path))?;
        let public_signals: Vec<String> = serde_json::from_str(&raw_public).map_err(|e| {
            PipelineError::Prover(format!("{}: {}", public_path.display(), e))
        })?;

        Ok(Self {
            proof,
            public_signals,
            proof_path,
            public_path,
        })
    }
}

/// Turns a proving key and a witness into a Groth16 proof.
#[async_trait]
pub trait ProvingBackend: Send + Sync {
    async fn prove(&self, proving_key: &Path, witness: &Path, out_dir: &Path) -> Result<ProverOutput>;
}

#[async_trait]
impl<T: ProvingBackend + ?Sized> ProvingBackend for &T {
    async fn prove(&self, proving_key: &Path, witness: &Path, out_dir: &Path) -> Result<ProverOutput> {
        (**self).prove(proving_key, witness, out_dir).await
    }
}

/// Runs an external prover taking `<zkey> <wtns> <proof.json> <public.json>`,
/// the argument order rapidsnark uses.
#[derive(Clone, Debug)]
pub struct CommandProver {
    program: String,
}

impl CommandProver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ProvingBackend for CommandProver {
    async fn prove(&self, proving_key: &Path, witness: &Path, out_dir: &Path) -> Result<ProverOutput> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(io(out_dir))?;
        let proof_path = out_dir.join(PROOF_FILE);
        let public_path = out_dir.join(PUBLIC_FILE);

        debug!(program = %self.program, "running prover");
        let output = Command::new(&self.program)
            .arg(proving_key)
            .arg(witness)
            .arg(&proof_path)
            .arg(&public_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::Prover(format!("could not start {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Prover(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        info!(proof = %proof_path.display(), "proof generated");
        ProverOutput::read(proof_path, public_path).await
    }
}
