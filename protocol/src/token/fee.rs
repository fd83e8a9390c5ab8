//! Transfer fees.
//!
//! ```text
//! base = amount * fee.rate / 1e8                (native units)
//! fee  = base                                   if fee.currency == symbol
//!      = base * convert[fee.currency] / 1e8     otherwise
//! fee  = clamp(fee, fee.floor, fee.cap)         cap 0 = uncapped
//! ```
//!
//! A zero result means no fee is charged.

use serde::{Deserialize, Serialize};

use super::TokenConfig;
use crate::config::RATE_PRECISION;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{Address, BigInt};

/// A fee to charge on one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCharge {
    pub currency: String,
    pub amount: BigInt,
    pub collector: Option<Address>,
}

impl FeeCharge {
    /// Returns `true` when the fee is paid in the native token.
    pub fn is_native(&self, symbol: &str) -> bool {
        self.currency == symbol
    }
}

/// Fee for transferring `amount`, or `None` when nothing is charged.
pub fn compute_fee(config: &TokenConfig, amount: &BigInt) -> LedgerResult<Option<FeeCharge>> {
    let Some(fee) = &config.fee else {
        return Ok(None);
    };
    let precision = BigInt::from(RATE_PRECISION);
    let base = amount.mul_div(&fee.rate, &precision)?;
    let converted = if fee.currency.is_empty() || fee.currency == config.symbol {
        base
    } else {
        let rate = config.conversion_rate(&fee.currency).ok_or_else(|| {
            LedgerError::domain(format!("no conversion rate for {}", fee.currency))
        })?;
        base.mul_div(&rate.rate, &precision)?
    };
    let charged = converted.clamp_between(&fee.floor, &fee.cap);
    if charged.is_zero() {
        return Ok(None);
    }
    let currency = if fee.currency.is_empty() {
        config.symbol.clone()
    } else {
        fee.currency.clone()
    };
    Ok(Some(FeeCharge {
        currency,
        amount: charged,
        collector: fee.collector,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Fee;

    fn config(currency: &str, rate: u64, floor: u64, cap: u64) -> TokenConfig {
        let mut cfg = TokenConfig::new("FIAT", Address::from_public_key(b"issuer"));
        cfg.fee = Some(Fee {
            currency: currency.into(),
            rate: BigInt::from(rate),
            floor: BigInt::from(floor),
            cap: BigInt::from(cap),
            collector: Some(Address::from_public_key(b"collector")),
        });
        cfg
    }

    #[test]
    fn floor_lifts_tiny_fee() {
        let fee = compute_fee(&config("FIAT", 500_000, 1, 100), &BigInt::from(1)).unwrap().unwrap();
        assert_eq!(fee.amount, BigInt::from(1));
        assert!(fee.is_native("FIAT"));
    }

    #[test]
    fn cap_limits_large_fee() {
        let fee = compute_fee(&config("FIAT", 500_000, 1, 100), &BigInt::from(1_000_000))
            .unwrap()
            .unwrap();
        assert_eq!(fee.amount, BigInt::from(100));
    }

    #[test]
    fn proportional_between_bounds() {
        // 0.5% of 10_000
        let fee = compute_fee(&config("FIAT", 500_000, 1, 0), &BigInt::from(10_000))
            .unwrap()
            .unwrap();
        assert_eq!(fee.amount, BigInt::from(50));
    }

    #[test]
    fn no_fee_config_or_zero_result() {
        let cfg = TokenConfig::new("FIAT", Address::from_public_key(b"issuer"));
        assert_eq!(compute_fee(&cfg, &BigInt::from(10)).unwrap(), None);
        assert_eq!(compute_fee(&config("FIAT", 0, 0, 0), &BigInt::from(10)).unwrap(), None);
    }

    #[test]
    fn foreign_currency_needs_conversion_rate() {
        let mut cfg = config("USD", 1_000_000, 0, 0);
        assert!(compute_fee(&cfg, &BigInt::from(1000)).is_err());
        // 1 FIAT = 2 USD
        cfg.set_rate("convert", "USD", BigInt::from(200_000_000));
        let fee = compute_fee(&cfg, &BigInt::from(1000)).unwrap().unwrap();
        assert_eq!(fee.currency, "USD");
        assert_eq!(fee.amount, BigInt::from(20));
    }
}
