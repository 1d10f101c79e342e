//! Dual-currency amounts and the rounding rules applied to them.
//!
//! Every amount is carried in USD and LBP side by side. USD rounds to cents,
//! LBP to whole pounds, both half away from zero. Lines are rounded one by one;
//! the document total is the rounding of the exact sum, and whatever the two
//! disagree by is the remainder posted to the rounding account.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Scale of money columns in storage.
pub const STORAGE_SCALE: u32 = 4;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Lbp,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Usd, Currency::Lbp];

    /// Number of decimal places of the currency's minor unit.
    pub fn minor_scale(self) -> u32 {
        match self {
            Currency::Usd => 2,
            Currency::Lbp => 0,
        }
    }

    pub fn round(self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.minor_scale(), RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Normalises a value read back from storage. Some backends round-trip
/// decimals through binary floats.
pub fn from_storage(value: Decimal) -> Decimal {
    value.round_dp(STORAGE_SCALE).normalize()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualAmount {
    pub usd: Decimal,
    pub lbp: Decimal,
}

impl DualAmount {
    pub const ZERO: DualAmount = DualAmount {
        usd: Decimal::ZERO,
        lbp: Decimal::ZERO,
    };

    pub fn new(usd: Decimal, lbp: Decimal) -> Self {
        Self { usd, lbp }
    }

    /// Builds both sides from a USD amount, deriving LBP from the rate.
    pub fn from_usd(usd: Decimal, rate: Decimal) -> Self {
        Self { usd, lbp: usd * rate }
    }

    /// Fills whichever side is missing from the other and the rate.
    pub fn normalize(usd: Option<Decimal>, lbp: Option<Decimal>, rate: Decimal) -> Self {
        match (usd, lbp) {
            (Some(usd), Some(lbp)) => Self { usd, lbp },
            (Some(usd), None) => Self::from_usd(usd, rate),
            (None, Some(lbp)) if !rate.is_zero() => Self { usd: lbp / rate, lbp },
            (None, Some(lbp)) => Self {
                usd: Decimal::ZERO,
                lbp,
            },
            (None, None) => Self::ZERO,
        }
    }

    pub fn get(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Usd => self.usd,
            Currency::Lbp => self.lbp,
        }
    }

    pub fn set(&mut self, currency: Currency, value: Decimal) {
        match currency {
            Currency::Usd => self.usd = value,
            Currency::Lbp => self.lbp = value,
        }
    }

    pub fn rounded(self) -> Self {
        Self {
            usd: Currency::Usd.round(self.usd),
            lbp: Currency::Lbp.round(self.lbp),
        }
    }

    pub fn scale(self, factor: Decimal) -> Self {
        Self {
            usd: self.usd * factor,
            lbp: self.lbp * factor,
        }
    }

    /// `scale` that reports overflow instead of panicking.
    pub fn checked_scale(self, factor: Decimal) -> Option<Self> {
        Some(Self {
            usd: self.usd.checked_mul(factor)?,
            lbp: self.lbp.checked_mul(factor)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.usd.is_zero() && self.lbp.is_zero()
    }

    /// Positive part per currency.
    pub fn positive_part(self) -> Self {
        Self {
            usd: self.usd.max(Decimal::ZERO),
            lbp: self.lbp.max(Decimal::ZERO),
        }
    }

    pub fn from_storage(usd: Decimal, lbp: Decimal) -> Self {
        Self {
            usd: from_storage(usd),
            lbp: from_storage(lbp),
        }
    }
}

impl Add for DualAmount {
    type Output = DualAmount;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            usd: self.usd + rhs.usd,
            lbp: self.lbp + rhs.lbp,
        }
    }
}

impl AddAssign for DualAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.usd += rhs.usd;
        self.lbp += rhs.lbp;
    }
}

impl Sub for DualAmount {
    type Output = DualAmount;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            usd: self.usd - rhs.usd,
            lbp: self.lbp - rhs.lbp,
        }
    }
}

impl SubAssign for DualAmount {
    fn sub_assign(&mut self, rhs: Self) {
        self.usd -= rhs.usd;
        self.lbp -= rhs.lbp;
    }
}

impl Neg for DualAmount {
    type Output = DualAmount;

    fn neg(self) -> Self::Output {
        Self {
            usd: -self.usd,
            lbp: -self.lbp,
        }
    }
}

impl Sum for DualAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(DualAmount::ZERO, |acc, x| acc + x)
    }
}

/// Tracks exact and rounded sums of the components of one document.
#[derive(Debug, Clone, Default)]
pub struct RoundingLedger {
    exact: DualAmount,
    rounded: DualAmount,
}

impl RoundingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one component and returns its individually rounded value.
    pub fn push(&mut self, exact: DualAmount) -> DualAmount {
        let rounded = exact.rounded();
        self.exact += exact;
        self.rounded += rounded;
        rounded
    }

    /// The document total: one rounding of the exact sum.
    pub fn total(&self) -> DualAmount {
        self.exact.rounded()
    }

    pub fn rounded_sum(&self) -> DualAmount {
        self.rounded
    }

    /// `total - sum(rounded components)`; positive means the components fell short.
    pub fn remainder(&self) -> DualAmount {
        self.total() - self.rounded
    }
}
