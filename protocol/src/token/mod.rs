//! # Token Configuration & Base Token Operations
//!
//! A token chaincode persists one [`TokenConfig`] under `tokenMetadata`
//! when it is initialised. The config names the native symbol and the
//! issuer, and carries the optional transfer fee and the rate table used by
//! `buyToken`, `buyBack` and fee conversion.
//!
//! [`fee`] computes transfer fees; [`handlers`] holds the operations every
//! token contract exposes and [`routes`] registers them.

pub mod fee;
pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::config::{KEY_TOKEN_METADATA, RATE_DEAL_CONVERT};
use crate::error::{LedgerError, LedgerResult};
use crate::stub::ChaincodeStub;
use crate::types::proto::{self, FeeRecord, RateRecord, TokenConfigRecord};
use crate::types::{Address, BigInt};

pub use fee::{compute_fee, FeeCharge};
pub use handlers::routes;

/// Transfer fee settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    /// Currency the fee is charged in; the native symbol or a foreign one.
    pub currency: String,
    /// Fee rate, fixed point with eight decimals.
    #[serde(default)]
    pub rate: BigInt,
    #[serde(default)]
    pub floor: BigInt,
    /// Zero means uncapped.
    #[serde(default)]
    pub cap: BigInt,
    #[serde(default)]
    pub collector: Option<Address>,
}

/// Rate table entry for one `(deal type, currency)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    pub deal_type: String,
    pub currency: String,
    /// Currency units per token, fixed point with eight decimals.
    pub rate: BigInt,
    #[serde(default)]
    pub min: BigInt,
    /// Zero means unlimited.
    #[serde(default)]
    pub max: BigInt,
}

impl Rate {
    /// Checks `amount` against `[min, max]`.
    pub fn check_limits(&self, amount: &BigInt) -> LedgerResult<()> {
        if amount < &self.min || (!self.max.is_zero() && amount > &self.max) {
            return Err(LedgerError::AmountOutOfLimits);
        }
        Ok(())
    }
}

/// Persisted token configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub decimals: u32,
    pub issuer: Address,
    /// May change the fee; the issuer when unset.
    #[serde(default)]
    pub fee_setter: Option<Address>,
    /// May change the fee collector; the issuer when unset.
    #[serde(default)]
    pub fee_address_setter: Option<Address>,
    #[serde(default)]
    pub total_emission: BigInt,
    #[serde(default)]
    pub fee: Option<Fee>,
    #[serde(default)]
    pub rates: Vec<Rate>,
}

fn optional_address(bytes: &[u8]) -> LedgerResult<Option<Address>> {
    if bytes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Address::from_slice(bytes)?))
    }
}

fn address_bytes(address: &Option<Address>) -> Vec<u8> {
    address.map(|a| a.as_bytes().to_vec()).unwrap_or_default()
}

impl TokenConfig {
    pub fn new(symbol: impl Into<String>, issuer: Address) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            decimals: 0,
            issuer,
            fee_setter: None,
            fee_address_setter: None,
            total_emission: BigInt::zero(),
            fee: None,
            rates: Vec::new(),
        }
    }

    pub fn fee_setter(&self) -> Address {
        self.fee_setter.unwrap_or(self.issuer)
    }

    pub fn fee_address_setter(&self) -> Address {
        self.fee_address_setter.unwrap_or(self.issuer)
    }

    pub fn rate(&self, deal_type: &str, currency: &str) -> Option<&Rate> {
        self.rates
            .iter()
            .find(|r| r.deal_type == deal_type && r.currency == currency)
    }

    /// Rate used to express a native amount in `currency`.
    pub fn conversion_rate(&self, currency: &str) -> Option<&Rate> {
        self.rate(RATE_DEAL_CONVERT, currency)
    }

    /// Inserts or replaces the entry for `(deal_type, currency)`, keeping
    /// existing limits on replacement.
    pub fn set_rate(&mut self, deal_type: &str, currency: &str, rate: BigInt) {
        match self
            .rates
            .iter_mut()
            .find(|r| r.deal_type == deal_type && r.currency == currency)
        {
            Some(existing) => existing.rate = rate,
            None => self.rates.push(Rate {
                deal_type: deal_type.to_string(),
                currency: currency.to_string(),
                rate,
                min: BigInt::zero(),
                max: BigInt::zero(),
            }),
        }
    }

    /// Removes the entry; `false` if there was none.
    pub fn delete_rate(&mut self, deal_type: &str, currency: &str) -> bool {
        let before = self.rates.len();
        self.rates
            .retain(|r| !(r.deal_type == deal_type && r.currency == currency));
        self.rates.len() != before
    }

    pub fn to_record(&self) -> TokenConfigRecord {
        TokenConfigRecord {
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            issuer: self.issuer.as_bytes().to_vec(),
            fee_setter: address_bytes(&self.fee_setter),
            fee_address_setter: address_bytes(&self.fee_address_setter),
            total_emission: self.total_emission.to_bytes(),
            fee: self.fee.as_ref().map(|f| FeeRecord {
                currency: f.currency.clone(),
                fee: f.rate.to_bytes(),
                floor: f.floor.to_bytes(),
                cap: f.cap.to_bytes(),
                address: address_bytes(&f.collector),
            }),
            rates: self
                .rates
                .iter()
                .map(|r| RateRecord {
                    deal_type: r.deal_type.clone(),
                    currency: r.currency.clone(),
                    rate: r.rate.to_bytes(),
                    min: r.min.to_bytes(),
                    max: r.max.to_bytes(),
                })
                .collect(),
            name: self.name.clone(),
        }
    }

    pub fn from_record(record: TokenConfigRecord) -> LedgerResult<Self> {
        let fee = match record.fee {
            Some(f) => Some(Fee {
                currency: f.currency,
                rate: BigInt::from_bytes(&f.fee),
                floor: BigInt::from_bytes(&f.floor),
                cap: BigInt::from_bytes(&f.cap),
                collector: optional_address(&f.address)?,
            }),
            None => None,
        };
        Ok(Self {
            symbol: record.symbol,
            name: record.name,
            decimals: record.decimals,
            issuer: Address::from_slice(&record.issuer)?,
            fee_setter: optional_address(&record.fee_setter)?,
            fee_address_setter: optional_address(&record.fee_address_setter)?,
            total_emission: BigInt::from_bytes(&record.total_emission),
            fee,
            rates: record
                .rates
                .into_iter()
                .map(|r| Rate {
                    deal_type: r.deal_type,
                    currency: r.currency,
                    rate: BigInt::from_bytes(&r.rate),
                    min: BigInt::from_bytes(&r.min),
                    max: BigInt::from_bytes(&r.max),
                })
                .collect(),
        })
    }

    pub fn load(stub: &dyn ChaincodeStub) -> LedgerResult<Option<Self>> {
        match stub.get_state(KEY_TOKEN_METADATA)? {
            Some(bytes) => Ok(Some(Self::from_record(proto::decode(&bytes)?)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, stub: &mut dyn ChaincodeStub) -> LedgerResult<()> {
        stub.put_state(KEY_TOKEN_METADATA, proto::encode(&self.to_record()))
    }

    /// Persists `self` unless a config already exists.
    pub fn initialize(&self, stub: &mut dyn ChaincodeStub) -> LedgerResult<()> {
        if self.symbol.is_empty() {
            return Err(LedgerError::domain("token symbol must not be empty"));
        }
        if stub.get_state(KEY_TOKEN_METADATA)?.is_some() {
            return Err(LedgerError::AlreadyInitialized);
        }
        self.save(stub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::MemoryWorld;

    fn sample() -> TokenConfig {
        let mut cfg = TokenConfig::new("FIAT", Address::from_public_key(b"issuer"));
        cfg.name = "Fiat".into();
        cfg.decimals = 2;
        cfg.fee = Some(Fee {
            currency: "FIAT".into(),
            rate: BigInt::from(500_000),
            floor: BigInt::from(1),
            cap: BigInt::from(100),
            collector: Some(Address::from_public_key(b"collector")),
        });
        cfg.set_rate("buyToken", "USD", BigInt::from(100_000_000));
        cfg
    }

    #[test]
    fn record_conversion_keeps_everything() {
        let cfg = sample();
        assert_eq!(TokenConfig::from_record(cfg.to_record()).unwrap(), cfg);
    }

    #[test]
    fn json_shape() {
        let issuer = Address::from_public_key(b"issuer");
        let text = format!(r#"{{"symbol":"FIAT","issuer":"{}","totalEmission":"0"}}"#, issuer);
        let cfg: TokenConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(cfg.issuer, issuer);
        assert_eq!(cfg.fee_setter(), issuer);
        assert!(cfg.fee.is_none());
    }

    #[test]
    fn initialize_once() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let cfg = sample();
        cfg.initialize(&mut stub).unwrap();
        assert!(matches!(cfg.initialize(&mut stub), Err(LedgerError::AlreadyInitialized)));
        assert_eq!(TokenConfig::load(&stub).unwrap(), Some(cfg));
    }

    #[test]
    fn rate_table_upsert_and_delete() {
        let mut cfg = sample();
        cfg.set_rate("buyToken", "USD", BigInt::from(2));
        assert_eq!(cfg.rates.len(), 1);
        assert_eq!(cfg.rate("buyToken", "USD").unwrap().rate, BigInt::from(2));
        assert!(cfg.delete_rate("buyToken", "USD"));
        assert!(!cfg.delete_rate("buyToken", "USD"));
    }

    #[test]
    fn limits() {
        let rate = Rate {
            deal_type: "buyToken".into(),
            currency: "USD".into(),
            rate: BigInt::from(1),
            min: BigInt::from(10),
            max: BigInt::from(20),
        };
        assert!(rate.check_limits(&BigInt::from(9)).is_err());
        rate.check_limits(&BigInt::from(10)).unwrap();
        rate.check_limits(&BigInt::from(20)).unwrap();
        let over = rate.check_limits(&BigInt::from(21));
        assert!(matches!(over, Err(LedgerError::AmountOutOfLimits)));
    }
}
