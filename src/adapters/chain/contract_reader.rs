//! On-chain Contract Reader - `uint256` View Calls
//!
//! Builds calldata from a canonical function signature and decimal
//! `uint256` arguments, executes one read-only call through a
//! `ChainReader`, decodes the `uint256` / `uint256[]` return data and
//! scales every bound element by its declared decimals before it enters
//! the payload. Nothing here signs or spends gas.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{U256, keccak256};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, warn};

use crate::domain::observation::{ContractPayload, ContractReading, FetchError, Observation};
use crate::domain::scaling::from_base_units;
use crate::domain::source::{ContractCall, ReturnKind, SourceQuery, SourceSpec};
use crate::ports::chain_reader::ChainReader;
use crate::ports::source_adapter::SourceAdapter;

const WORD: usize = 32;

/// Four-byte selector followed by each argument as a 32-byte word.
pub fn encode_call(signature: &str, args: &[String]) -> Result<Vec<u8>, FetchError> {
    let mut calldata = Vec::with_capacity(4 + WORD * args.len());
    calldata.extend_from_slice(&keccak256(signature.as_bytes())[..4]);
    for arg in args {
        let word = U256::from_str(arg)
            .map_err(|e| FetchError::Provider(format!("argument '{arg}' is not a uint256: {e}")))?;
        calldata.extend_from_slice(&word.to_be_bytes::<WORD>());
    }
    Ok(calldata)
}

fn word_at(data: &[u8], offset: usize) -> Result<U256, FetchError> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| FetchError::Decode("return offset overflow".into()))?;
    data.get(offset..end)
        .map(U256::from_be_slice)
        .ok_or_else(|| {
            FetchError::Decode(format!(
                "return data too short: need {end} bytes, got {}",
                data.len()
            ))
        })
}

fn word_as_usize(word: U256, what: &str) -> Result<usize, FetchError> {
    usize::try_from(word).map_err(|_| FetchError::Decode(format!("{what} {word} out of range")))
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256, FetchError> {
    word_at(data, 0)
}

/// Decode a dynamic `uint256[]` return value (head offset, length, items).
pub fn decode_uint_array(data: &[u8]) -> Result<Vec<U256>, FetchError> {
    let offset = word_as_usize(word_at(data, 0)?, "array offset")?;
    let len = word_as_usize(word_at(data, offset)?, "array length")?;

    let needed = len
        .checked_mul(WORD)
        .and_then(|n| n.checked_add(offset + WORD))
        .ok_or_else(|| FetchError::Decode("array length overflow".into()))?;
    if data.len() < needed {
        return Err(FetchError::Decode(format!(
            "array of {len} needs {needed} bytes, got {}",
            data.len()
        )));
    }

    (0..len)
        .map(|i| word_at(data, offset + WORD * (i + 1)))
        .collect()
}

/// Bind decoded words to output bindings and scale them.
pub fn bind_outputs(call: &ContractCall, words: &[U256]) -> Result<Vec<ContractReading>, FetchError> {
    if words.len() < call.outputs.len() {
        return Err(FetchError::Decode(format!(
            "{} returned {} values, {} bound",
            call.signature,
            words.len(),
            call.outputs.len()
        )));
    }

    call.outputs
        .iter()
        .zip(words)
        .map(|(binding, word)| {
            let raw = u128::try_from(*word)
                .map_err(|_| FetchError::Decode(format!("{word} exceeds 128 bits")))?;
            Ok(ContractReading {
                metric: binding.metric.clone(),
                unit: binding.unit,
                raw: raw.to_string(),
                decimals: binding.decimals,
                value: from_base_units(raw, binding.decimals)?,
            })
        })
        .collect()
}

/// `SourceAdapter` for `OnChainContract` sources.
pub struct OnChainAdapter<R: ChainReader> {
    reader: R,
    timeout: Duration,
}

impl<R: ChainReader> OnChainAdapter<R> {
    pub const fn new(reader: R, timeout: Duration) -> Self {
        Self { reader, timeout }
    }

    async fn read(&self, spec: &SourceSpec) -> Result<ContractPayload, FetchError> {
        let SourceQuery::Contract(call) = &spec.query else {
            return Err(FetchError::Provider(format!(
                "source {} is not a contract call",
                spec.id
            )));
        };

        let calldata = encode_call(&call.signature, &call.args)?;
        let returned = tokio::time::timeout(
            self.timeout,
            self.reader.call(&spec.endpoint, &call.address, calldata),
        )
        .await
        .map_err(|_| FetchError::Transport(format!("timed out after {:?}", self.timeout)))??;

        let words = match call.returns {
            ReturnKind::Uint256 => vec![decode_uint(&returned)?],
            ReturnKind::Uint256Array => decode_uint_array(&returned)?,
        };

        Ok(ContractPayload {
            entity: spec.entity.clone(),
            address: call.address.clone(),
            signature: call.signature.clone(),
            readings: bind_outputs(call, &words)?,
        })
    }
}

#[async_trait]
impl<R: ChainReader> SourceAdapter for OnChainAdapter<R> {
    #[instrument(skip(self, spec), fields(source = %spec.id))]
    async fn fetch(&self, spec: &SourceSpec) -> Observation {
        match self.read(spec).await {
            Ok(payload) => match serde_json::to_value(&payload) {
                Ok(value) => Observation::ok(spec.id.clone(), value),
                Err(e) => Observation::failed(spec.id.clone(), FetchError::Decode(e.to_string())),
            },
            Err(reason) => {
                warn!(error = %reason, "Contract read failed");
                Observation::failed(spec.id.clone(), reason)
            }
        }
        .at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::source::{OutputBinding, Unit};

    fn word(v: u128) -> [u8; 32] {
        U256::from(v).to_be_bytes::<32>()
    }

    #[test]
    fn test_total_supply_selector() {
        let calldata = encode_call("totalSupply()", &[]).unwrap();
        assert_eq!(calldata, vec![0x18, 0x16, 0x0d, 0xdd]);
    }

    #[test]
    fn test_balances_argument_encoding() {
        let calldata = encode_call("balances(uint256)", &["1".to_string()]).unwrap();
        assert_eq!(calldata.len(), 36);
        assert_eq!(calldata[35], 1);
        assert!(encode_call("balances(uint256)", &["-1".to_string()]).is_err());
    }

    #[test]
    fn test_decode_array() {
        let mut data = Vec::new();
        data.extend_from_slice(&word(32));
        data.extend_from_slice(&word(2));
        data.extend_from_slice(&word(5_000_000));
        data.extend_from_slice(&word(7));
        let values = decode_uint_array(&data).unwrap();
        assert_eq!(values, vec![U256::from(5_000_000u64), U256::from(7u64)]);

        data.truncate(96);
        assert!(matches!(decode_uint_array(&data), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_short_return_is_decode_error() {
        assert!(matches!(decode_uint(&[0u8; 12]), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_bind_outputs_scales_each_element() {
        let call = ContractCall {
            address: "0x1220868672d5b10f3e1cb9ab519e4d0b08545ea4".into(),
            signature: "get_balances()".into(),
            args: vec![],
            returns: ReturnKind::Uint256Array,
            outputs: vec![
                OutputBinding { metric: "usdc_balance".into(), decimals: 6, unit: Unit::Token },
                OutputBinding { metric: "lvlusd_balance".into(), decimals: 18, unit: Unit::Token },
            ],
        };
        let words = [U256::from(2_500_000u64), U256::from(3_000_000_000_000_000_000u128)];
        let readings = bind_outputs(&call, &words).unwrap();
        assert_eq!(readings[0].value, dec!(2.5));
        assert_eq!(readings[1].value, dec!(3));
        assert!(bind_outputs(&call, &words[..1]).is_err());
    }
}
