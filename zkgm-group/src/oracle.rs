//! On-chain view of a group's Merkle tree, used to validate reconstruction.

use async_trait::async_trait;
use ethers::{
    abi::{self, ParamType, Token},
    prelude::*,
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, U256},
};
use tracing::debug;
use zkgm_common::{parse_fr_decimal, Fr};

use crate::error::{GroupError, Result};

/// Authoritative root and size of a group's tree.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn merkle_root(&self, group_id: u64) -> Result<Fr>;
    async fn merkle_size(&self, group_id: u64) -> Result<u64>;
}

#[async_trait]
impl<T: MembershipOracle + ?Sized> MembershipOracle for &T {
    async fn merkle_root(&self, group_id: u64) -> Result<Fr> {
        (**self).merkle_root(group_id).await
    }

    async fn merkle_size(&self, group_id: u64) -> Result<u64> {
        (**self).merkle_size(group_id).await
    }
}

const ROOT_SIGNATURE: &str = "getMerkleTreeRoot(uint256)";
const SIZE_SIGNATURE: &str = "getMerkleTreeSize(uint256)";

/// Reads the group tree from the membership contract over JSON-RPC.
pub struct ContractOracle {
    provider: Provider<Http>,
    contract: Address,
}

impl ContractOracle {
    pub fn new(rpc_url: &str, contract: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| GroupError::Oracle(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        let contract: Address = contract
            .parse()
            .map_err(|e| GroupError::Oracle(format!("invalid contract address {}: {}", contract, e)))?;
        Ok(Self { provider, contract })
    }

    async fn call_uint(&self, signature: &str, group_id: u64) -> Result<U256> {
        let calldata = group_call(signature, group_id);
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.contract)
            .data(Bytes::from(calldata))
            .into();

        let output = self
            .provider
            .call(&tx, None)
            .await
            .map_err(|e| GroupError::Oracle(format!("{} failed: {}", signature, e)))?;

        let value = decode_uint(&output)?;
        debug!(group_id, %value, "{} returned", signature);
        Ok(value)
    }
}

#[async_trait]
impl MembershipOracle for ContractOracle {
    async fn merkle_root(&self, group_id: u64) -> Result<Fr> {
        let value = self.call_uint(ROOT_SIGNATURE, group_id).await?;
        uint_to_fr(value)
    }

    async fn merkle_size(&self, group_id: u64) -> Result<u64> {
        let value = self.call_uint(SIZE_SIGNATURE, group_id).await?;
        if value > U256::from(u64::MAX) {
            return Err(GroupError::Oracle(format!("tree size {} overflows u64", value)));
        }
        Ok(value.as_u64())
    }
}

/// Selector followed by the ABI-encoded group id.
pub fn group_call(signature: &str, group_id: u64) -> Vec<u8> {
    let selector = &ethers::utils::keccak256(signature)[..4];
    let mut calldata = selector.to_vec();
    calldata.extend_from_slice(&abi::encode(&[Token::Uint(U256::from(group_id))]));
    calldata
}

fn decode_uint(output: &[u8]) -> Result<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], output)
        .map_err(|e| GroupError::Oracle(format!("cannot decode uint256: {}", e)))?;
    match tokens.into_iter().next() {
        Some(Token::Uint(value)) => Ok(value),
        other => Err(GroupError::Oracle(format!("unexpected return value {:?}", other))),
    }
}

/// The contract stores field elements, so anything at or above the modulus is
/// a broken contract or the wrong address.
pub fn uint_to_fr(value: U256) -> Result<Fr> {
    parse_fr_decimal(&value.to_string()).map_err(|e| GroupError::Oracle(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calldata_layout() {
        let data = group_call(ROOT_SIGNATURE, 7);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &ethers::utils::keccak256(ROOT_SIGNATURE)[..4]);
        assert_eq!(data[35], 7);
        assert!(data[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn uint_conversion_rejects_values_outside_field() {
        assert_eq!(uint_to_fr(U256::from(42u64)).unwrap(), Fr::from(42u64));
        assert!(uint_to_fr(U256::MAX).is_err());
    }

    #[test]
    fn decodes_single_word() {
        let encoded = abi::encode(&[Token::Uint(U256::from(3u64))]);
        assert_eq!(decode_uint(&encoded).unwrap(), U256::from(3u64));
        assert!(decode_uint(&[1, 2, 3]).is_err());
    }
}
