use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GST components of a tax-inclusive amount
///
/// Exactly one of (`cgst` + `sgst`) or `igst` is non-zero for a non-zero tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub tax_amount: Decimal,
    pub base_amount: Decimal,
}

impl TaxBreakdown {
    /// Tax-inclusive amount the breakdown was derived from
    pub fn total(&self) -> Decimal {
        self.base_amount + self.tax_amount
    }

    pub fn is_intra_state(&self) -> bool {
        self.igst.is_zero()
    }
}

/// Identifies the state whose transactions are taxed as CGST + SGST
///
/// Matching is case-insensitive against any of the configured names, so a
/// state code ("UP") and the full name ("Uttar Pradesh") can both be listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeState {
    names: Vec<String>,
}

impl HomeState {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.into().trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list of names ("UP,Uttar Pradesh")
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn matches(&self, state: &str) -> bool {
        let state = state.trim();
        self.names.iter().any(|n| n.eq_ignore_ascii_case(state))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
