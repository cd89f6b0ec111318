//! Reconstruct, assemble, compute, prove, submit.

use std::path::{Path, PathBuf};

use ethers::types::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zkgm_artifacts::{ArtifactCache, ArtifactFetcher, HttpFetcher};
use zkgm_common::{
    field::uint256_word, fr_to_decimal, ArtifactBundle, CircuitIdentifier, FieldValue, Fr,
    MerkleProof, Settings,
};
use zkgm_group::{
    ContractOracle, Group, GroupReconstructor, MembershipFeed, MembershipOracle, SubgraphFeed,
};
use zkgm_relayer::{
    encode_verify_account, parse_address, GelatoRelay, PollOutcome, ProofSubmissionClient,
    RelayApi, RelayTask, SemaphoreProof,
};
use zkgm_witness::{CircuitInputAssembler, Kernel, KernelOptions, WitnessInput};

use crate::{
    backend::{ProverOutput, ProvingBackend},
    error::{io, PipelineError, Result},
};

pub const WITNESS_FILE: &str = "witness.wtns";
pub const INPUT_FILE: &str = "input.json";

/// What to prove: membership of `commitment` in `group_id`, bound to a
/// scope and message.
#[derive(Clone, Debug)]
pub struct MembershipRequest {
    pub group_id: u64,
    pub secret: Fr,
    pub commitment: Fr,
    pub scope: FieldValue,
    pub message: FieldValue,
    /// Refuse to continue unless the rebuilt tree matches the contract.
    pub verify_onchain: bool,
}

/// A computed witness on disk, plus everything needed to prove and submit.
#[derive(Clone, Debug)]
pub struct PreparedWitness {
    pub group_id: u64,
    pub circuit: CircuitIdentifier,
    pub merkle_proof: MerkleProof,
    pub input: WitnessInput,
    pub artifacts: ArtifactBundle,
    pub witness_path: PathBuf,
    pub witness_len: usize,
}

impl PreparedWitness {
    /// Depth of the circuit the witness was computed for.
    pub fn merkle_tree_depth(&self) -> u64 {
        self.input.depth() as u64
    }
}

/// Public values and destination of a proof submission.
#[derive(Clone, Debug)]
pub struct SubmissionRequest {
    pub group_id: u64,
    pub merkle_tree_depth: u64,
    pub scope: FieldValue,
    pub message: FieldValue,
    pub target: Address,
}

pub struct ProofPipeline<F = SubgraphFeed, A = HttpFetcher, R = GelatoRelay> {
    reconstructor: GroupReconstructor<F>,
    oracle: Option<Box<dyn MembershipOracle>>,
    artifacts: ArtifactCache<A>,
    submission: ProofSubmissionClient<R>,
    assembler: CircuitInputAssembler,
    kernel_options: KernelOptions,
    family: String,
    version: String,
    work_dir: PathBuf,
}

impl ProofPipeline {
    /// Wire the production feed, artifact host, relay and (when a membership
    /// contract is configured) on-chain oracle.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let reconstructor = GroupReconstructor::new(SubgraphFeed::new(settings.feed.subgraph_url.clone()));
        let artifacts = ArtifactCache::from_settings(&settings.artifacts);
        let submission = ProofSubmissionClient::from_settings(settings)?;

        let assembler = match settings.witness.merkle_tree_depth {
            Some(depth) => CircuitInputAssembler::with_depth(depth as usize)?,
            None => CircuitInputAssembler::new(),
        };

        let mut pipeline = Self::new(reconstructor, artifacts, submission, settings.prover.work_dir.clone())
            .with_assembler(assembler)
            .with_kernel_options(KernelOptions {
                sanity_check: settings.witness.sanity_check,
            })
            .with_circuit(settings.artifacts.family.clone(), settings.artifacts.version.clone());

        if let Some(contract) = &settings.chain.membership_contract {
            pipeline = pipeline.with_oracle(ContractOracle::new(&settings.chain.rpc_url, contract)?);
        }
        Ok(pipeline)
    }
}

impl<F, A, R> ProofPipeline<F, A, R>
where
    F: MembershipFeed,
    A: ArtifactFetcher,
    R: RelayApi,
{
    pub fn new(
        reconstructor: GroupReconstructor<F>,
        artifacts: ArtifactCache<A>,
        submission: ProofSubmissionClient<R>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reconstructor,
            oracle: None,
            artifacts,
            submission,
            assembler: CircuitInputAssembler::new(),
            kernel_options: KernelOptions::default(),
            family: "semaphore".to_string(),
            version: "4.0.0".to_string(),
            work_dir: work_dir.into(),
        }
    }

    pub fn with_oracle(mut self, oracle: impl MembershipOracle + 'static) -> Self {
        self.oracle = Some(Box::new(oracle));
        self
    }

    pub fn with_assembler(mut self, assembler: CircuitInputAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_kernel_options(mut self, options: KernelOptions) -> Self {
        self.kernel_options = options;
        self
    }

    pub fn with_circuit(mut self, family: impl Into<String>, version: impl Into<String>) -> Self {
        self.family = family.into();
        self.version = version.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn artifacts(&self) -> &ArtifactCache<A> {
        &self.artifacts
    }

    pub fn submission(&self) -> &ProofSubmissionClient<R> {
        &self.submission
    }

    /// Circuit of the configured family and version for a tree depth.
    pub fn circuit(&self, depth: usize) -> CircuitIdentifier {
        CircuitIdentifier::new(self.family.clone(), vec![depth as u32], self.version.clone())
    }

    /// Rebuild a group, checked against the chain when `verify_onchain` is set.
    pub async fn group(&self, group_id: u64, verify_onchain: bool) -> Result<Group> {
        if !verify_onchain {
            return Ok(self.reconstructor.build(group_id).await?);
        }
        let oracle = self.oracle.as_deref().ok_or_else(|| {
            PipelineError::InvalidRequest("on-chain verification needs a membership contract".into())
        })?;
        Ok(self.reconstructor.build_verified(group_id, oracle).await?)
    }

    /// Everything up to and including the witness file.
    pub async fn prepare(&self, request: &MembershipRequest) -> Result<PreparedWitness> {
        let group = self.group(request.group_id, request.verify_onchain).await?;
        let merkle_proof = group.merkle_proof(&request.commitment)?;
        debug!(
            group_id = request.group_id,
            index = merkle_proof.index,
            siblings = merkle_proof.siblings.len(),
            "membership proven"
        );

        let input = self.assembler.assemble(
            &request.secret,
            &merkle_proof,
            &request.scope,
            &request.message,
        )?;
        let circuit = self.circuit(input.depth());
        let artifacts = self.artifacts.resolve(&circuit).await?;

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(io(&self.work_dir))?;
        let input_path = self.work_dir.join(INPUT_FILE);
        let input_json = serde_json::to_vec_pretty(&input)
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;
        tokio::fs::write(&input_path, input_json)
            .await
            .map_err(io(&input_path))?;

        let witness_path = self.work_dir.join(WITNESS_FILE);
        let witness_len = compute_witness_file(
            artifacts.circuit_binary.clone(),
            input.clone(),
            self.kernel_options,
            witness_path.clone(),
        )
        .await?;

        info!(
            group_id = request.group_id,
            circuit = %circuit.file_stem(),
            root = %fr_to_decimal(&merkle_proof.root),
            witness = %witness_path.display(),
            "witness ready"
        );

        Ok(PreparedWitness {
            group_id: request.group_id,
            circuit,
            merkle_proof,
            input,
            artifacts,
            witness_path,
            witness_len,
        })
    }

    pub async fn prove<B>(&self, prepared: &PreparedWitness, backend: &B) -> Result<ProverOutput>
    where
        B: ProvingBackend + ?Sized,
    {
        backend
            .prove(&prepared.artifacts.proving_key, &prepared.witness_path, &self.work_dir)
            .await
    }

    /// Relay a proof; returns the relay task id.
    pub async fn submit(&self, request: &SubmissionRequest, output: &ProverOutput) -> Result<String> {
        let proof = SemaphoreProof::from_prover_output(
            request.merkle_tree_depth,
            &output.proof,
            &output.public_signals,
            onchain_uint(&request.message, "message")?,
            onchain_uint(&request.scope, "scope")?,
        )?;
        let calldata = encode_verify_account(request.group_id, &proof);
        Ok(self.submission.submit(request.target, calldata).await?)
    }

    /// Follow a relay task until it settles or `cancel` fires.
    pub async fn await_task<O>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        observer: O,
    ) -> Result<PollOutcome>
    where
        O: FnMut(&RelayTask),
    {
        Ok(self.submission.poll_status(task_id, cancel, observer).await?)
    }
}

/// The verifier contract takes scope and message as raw `uint256` values and
/// hashes them itself, so only integers can be submitted.
pub fn onchain_uint(value: &FieldValue, name: &str) -> Result<U256> {
    match value {
        FieldValue::Integer(n) => Ok(U256::from_big_endian(&uint256_word(n)?)),
        FieldValue::Text(_) => Err(PipelineError::InvalidRequest(format!(
            "{} must be an integer to be verified on-chain",
            name
        ))),
    }
}

pub fn parse_target(raw: &str) -> Result<Address> {
    Ok(parse_address(raw)?)
}

/// Load the kernel and write the witness on a blocking thread.
async fn compute_witness_file(
    circuit_binary: PathBuf,
    input: WitnessInput,
    options: KernelOptions,
    witness_path: PathBuf,
) -> Result<usize> {
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut kernel = Kernel::load_file(&circuit_binary, options)?;
        let witness = kernel.compute_witness(&input)?;
        witness.write_wtns(&witness_path)?;
        Ok(witness.len())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_pass_through_unhashed() {
        assert_eq!(
            onchain_uint(&FieldValue::from(3u64), "message").unwrap(),
            U256::from(3)
        );
        assert!(matches!(
            onchain_uint(&FieldValue::Text("vote".into()), "scope"),
            Err(PipelineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn oversized_integers_are_rejected() {
        let huge = FieldValue::parse(&format!("0x1{}", "0".repeat(64))).unwrap();
        assert!(matches!(
            onchain_uint(&huge, "scope"),
            Err(PipelineError::Field(_))
        ));
    }
}
