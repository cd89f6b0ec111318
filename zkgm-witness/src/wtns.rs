//! Witness vectors and the binary `wtns` container.
//!
//! Layout (all integers little endian):
//!
//! ```text
//! "wtns" | version u32 = 2 | sections u32 = 2
//! section 1: id u32 = 1 | len u64 = 8 + n8 | n8 u32 | prime [n8] | count u32
//! section 2: id u32 = 2 | len u64 = n8 * count | values [n8] * count
//! ```

use std::path::Path;

use num_bigint::BigUint;
use zkgm_common::{biguint_to_fr, modulus, Fr};

use crate::error::{Result, WitnessError};

pub const WTNS_MAGIC: &[u8; 4] = b"wtns";
pub const WTNS_VERSION: u32 = 2;
const HEADER_SECTION: u32 = 1;
const WITNESS_SECTION: u32 = 2;

/// Dense witness produced by one kernel run. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessVector {
    prime: BigUint,
    n8: u32,
    values: Vec<BigUint>,
}

impl WitnessVector {
    /// Every value must be a canonical element of the prime field and the
    /// prime must fit in `n8` bytes.
    pub fn new(prime: BigUint, n8: u32, values: Vec<BigUint>) -> Result<Self> {
        if n8 == 0 || n8 % 4 != 0 {
            return Err(WitnessError::InvalidWitness(format!(
                "field width {} is not a positive multiple of 4 bytes",
                n8
            )));
        }
        if prime.to_bytes_le().len() > n8 as usize {
            return Err(WitnessError::InvalidWitness(format!(
                "prime does not fit in {} bytes",
                n8
            )));
        }
        if let Some(position) = values.iter().position(|v| v >= &prime) {
            return Err(WitnessError::InvalidWitness(format!(
                "witness value {} is not below the prime",
                position
            )));
        }
        Ok(Self { prime, n8, values })
    }

    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    /// Field element width in bytes.
    pub fn n8(&self) -> u32 {
        self.n8
    }

    pub fn values(&self) -> &[BigUint] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values as BN254 scalars; fails for witnesses over any other prime.
    pub fn to_fr_values(&self) -> Result<Vec<Fr>> {
        if &self.prime != modulus() {
            return Err(WitnessError::InvalidWitness(
                "witness is not over the BN254 scalar field".into(),
            ));
        }
        Ok(self.values.iter().map(biguint_to_fr).collect())
    }

    pub fn to_wtns_bytes(&self) -> Vec<u8> {
        let n8 = self.n8 as usize;
        let mut out = Vec::with_capacity(12 + 12 + 8 + n8 + 12 + n8 * self.values.len());

        out.extend_from_slice(WTNS_MAGIC);
        out.extend_from_slice(&WTNS_VERSION.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());

        out.extend_from_slice(&HEADER_SECTION.to_le_bytes());
        out.extend_from_slice(&(8 + n8 as u64).to_le_bytes());
        out.extend_from_slice(&self.n8.to_le_bytes());
        push_fixed(&mut out, &self.prime, n8);
        out.extend_from_slice(&(self.values.len() as u32).to_le_bytes());

        out.extend_from_slice(&WITNESS_SECTION.to_le_bytes());
        out.extend_from_slice(&((n8 * self.values.len()) as u64).to_le_bytes());
        for value in &self.values {
            push_fixed(&mut out, value, n8);
        }
        out
    }

    pub fn from_wtns_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        if reader.take(4)? != WTNS_MAGIC {
            return Err(container("bad magic"));
        }
        let version = reader.u32()?;
        if version != WTNS_VERSION {
            return Err(container(format!("unsupported version {}", version)));
        }
        let sections = reader.u32()?;
        if sections != 2 {
            return Err(container(format!("expected 2 sections, found {}", sections)));
        }

        let mut header = None;
        let mut witness = None;
        for _ in 0..sections {
            let id = reader.u32()?;
            let len = usize::try_from(reader.u64()?)
                .map_err(|_| container("section length overflows"))?;
            let body = reader.take(len)?;
            let slot = match id {
                HEADER_SECTION => &mut header,
                WITNESS_SECTION => &mut witness,
                other => return Err(container(format!("unknown section id {}", other))),
            };
            if slot.replace(body).is_some() {
                return Err(container(format!("duplicate section {}", id)));
            }
        }
        if !reader.is_done() {
            return Err(container("trailing bytes after last section"));
        }

        let header = header.ok_or_else(|| container("missing header section"))?;
        let witness = witness.ok_or_else(|| container("missing witness section"))?;

        let mut header = Reader::new(header);
        let n8 = header.u32()?;
        let width = n8 as usize;
        if header.remaining() != width + 4 {
            return Err(container("header section length does not match field width"));
        }
        let prime = BigUint::from_bytes_le(header.take(width)?);
        let count = header.u32()? as usize;

        if width == 0 || witness.len() != width * count {
            return Err(container(format!(
                "witness section holds {} bytes, expected {} values of {} bytes",
                witness.len(),
                count,
                width
            )));
        }
        let values = witness.chunks(width).map(BigUint::from_bytes_le).collect();

        Self::new(prime, n8, values)
    }

    pub fn write_wtns(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_wtns_bytes())?;
        Ok(())
    }

    pub fn read_wtns(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_wtns_bytes(&std::fs::read(path)?)
    }
}

fn push_fixed(out: &mut Vec<u8>, value: &BigUint, width: usize) {
    let mut bytes = value.to_bytes_le();
    bytes.resize(width, 0);
    out.extend_from_slice(&bytes);
}

fn container(reason: impl Into<String>) -> WitnessError {
    WitnessError::Container(reason.into())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| container("unexpected end of data"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WitnessVector {
        let values = vec![
            BigUint::from(1u32),
            BigUint::from(7u32),
            modulus() - 1u32,
            BigUint::from(0u32),
        ];
        WitnessVector::new(modulus().clone(), 32, values).unwrap()
    }

    #[test]
    fn layout_is_byte_exact() {
        let bytes = sample().to_wtns_bytes();
        assert_eq!(bytes.len(), 12 + (12 + 40) + (12 + 4 * 32));
        assert_eq!(&bytes[0..4], b"wtns");
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &40u64.to_le_bytes());
        assert_eq!(&bytes[24..28], &32u32.to_le_bytes());
        // prime, little endian
        assert_eq!(&bytes[28..32], &[0x01, 0x00, 0x00, 0xf0]);
        assert_eq!(bytes[59], 0x30);
        assert_eq!(&bytes[60..64], &4u32.to_le_bytes());
        assert_eq!(&bytes[64..68], &2u32.to_le_bytes());
        assert_eq!(&bytes[68..76], &128u64.to_le_bytes());
        assert_eq!(bytes[76], 1);
        assert_eq!(bytes[108], 7);
    }

    #[test]
    fn parses_back_identical_values() {
        let witness = sample();
        let parsed = WitnessVector::from_wtns_bytes(&witness.to_wtns_bytes()).unwrap();
        assert_eq!(parsed, witness);
        assert_eq!(parsed.to_fr_values().unwrap()[1], Fr::from(7u64));
    }

    #[test]
    fn rejects_malformed_containers() {
        let bytes = sample().to_wtns_bytes();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'x';
        assert!(matches!(
            WitnessVector::from_wtns_bytes(&bad_magic),
            Err(WitnessError::Container(_))
        ));

        let mut bad_version = bytes.clone();
        bad_version[4] = 1;
        assert!(WitnessVector::from_wtns_bytes(&bad_version).is_err());

        assert!(WitnessVector::from_wtns_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(WitnessVector::from_wtns_bytes(&trailing).is_err());
    }

    #[test]
    fn rejects_values_outside_field() {
        assert!(WitnessVector::new(modulus().clone(), 32, vec![modulus().clone()]).is_err());
        assert!(WitnessVector::new(modulus().clone(), 4, vec![]).is_err());
        assert!(WitnessVector::new(BigUint::from(97u32), 8, vec![BigUint::from(3u32)])
            .unwrap()
            .to_fr_values()
            .is_err());
    }
}
