use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of a quote source ("chart", "ticker", ...).
pub type SourceId = String;

/// One OHLCV snapshot of an instrument, already converted to canonical form.
///
/// Prices are fixed-point decimals and the timestamp is UTC. `close` is the
/// only mandatory price: a source response without a usable close never
/// becomes a `NormalizedQuote`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedQuote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub volume: Option<u64>,
    pub source: SourceId,
}

impl NormalizedQuote {
    /// Checks the record invariants: every present price is positive and,
    /// when both are present, `high >= low`.
    pub fn validate(&self) -> Result<(), String> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", Some(self.close)),
        ];

        for (name, price) in prices {
            if let Some(p) = price {
                if p <= Decimal::ZERO {
                    return Err(format!("{name} must be positive, got {p}"));
                }
            }
        }

        if let (Some(high), Some(low)) = (self.high, self.low) {
            if high < low {
                return Err(format!("high {high} below low {low}"));
            }
        }

        if self.symbol.trim().is_empty() {
            return Err("empty symbol".to_string());
        }

        Ok(())
    }

    /// Volume usable for averaging (present and non-zero).
    pub fn valid_volume(&self) -> Option<u64> {
        self.volume.filter(|v| *v > 0)
    }
}

/// A monitored instrument.
///
/// Some sources use different ticker conventions ("PETR4.SA" vs "petr4.br");
/// `aliases` maps a source id to the symbol that source expects.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Instrument {
    pub symbol: String,
    aliases: HashMap<SourceId, String>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, source: impl Into<SourceId>, alias: impl Into<String>) -> Self {
        self.aliases.insert(source.into(), alias.into());
        self
    }

    /// Symbol to send to `source`; falls back to the canonical symbol.
    pub fn symbol_for(&self, source: &str) -> &str {
        self.aliases
            .get(source)
            .map(String::as_str)
            .unwrap_or(&self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote() -> NormalizedQuote {
        NormalizedQuote {
            symbol: "PETR4".into(),
            timestamp: Utc::now(),
            open: Some(dec!(10.00)),
            high: Some(dec!(10.50)),
            low: Some(dec!(9.90)),
            close: dec!(10.20),
            volume: Some(1_000),
            source: "chart".into(),
        }
    }

    #[test]
    fn well_formed_quote_validates() {
        assert!(quote().validate().is_ok());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut q = quote();
        q.high = Some(dec!(9.00));
        assert!(q.validate().unwrap_err().contains("below low"));
    }

    #[test]
    fn non_positive_prices_are_rejected() {
        let mut q = quote();
        q.close = dec!(0);
        assert!(q.validate().is_err());

        let mut q = quote();
        q.open = Some(dec!(-1));
        assert!(q.validate().is_err());
    }

    #[test]
    fn missing_optional_prices_are_fine() {
        let mut q = quote();
        q.open = None;
        q.high = None;
        q.low = None;
        q.volume = None;
        assert!(q.validate().is_ok());
        assert_eq!(q.valid_volume(), None);
    }

    #[test]
    fn alias_lookup_falls_back_to_symbol() {
        let i = Instrument::new("PETR4").with_alias("ticker", "petr4.br");
        assert_eq!(i.symbol_for("ticker"), "petr4.br");
        assert_eq!(i.symbol_for("chart"), "PETR4");
    }
}
