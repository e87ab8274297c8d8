//! Order tax computation.
//!
//! Amounts are integer cents, so the subtotal and taxable base are exact.
//! The tax itself is the only fractional quantity; it is rounded once, half
//! away from zero, when the summary is produced.

use serde::{Deserialize, Serialize};
use store::{LineItem, LineStatus, Money};

/// Tax rate in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate {
    basis_points: u32,
}

impl TaxRate {
    pub const fn from_basis_points(basis_points: u32) -> Self {
        Self { basis_points }
    }

    /// Creates a rate from a whole percentage, e.g. `10` for 10%.
    ///
    /// Saturates at `u32::MAX` basis points.
    pub const fn from_percent(percent: u32) -> Self {
        Self {
            basis_points: percent.saturating_mul(100),
        }
    }

    pub fn basis_points(&self) -> u32 {
        self.basis_points
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::from_percent(10)
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}%",
            self.basis_points / 100,
            self.basis_points % 100
        )
    }
}

/// The slice of a line the calculator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxableLine {
    pub quantity: u32,
    pub unit_price: Money,
    pub taxable: bool,
}

impl TaxableLine {
    pub fn new(quantity: u32, unit_price: Money, taxable: bool) -> Self {
        Self {
            quantity,
            unit_price,
            taxable,
        }
    }

    /// Builds a taxable line from a stored line and its product's taxable flag.
    pub fn from_line(line: &LineItem, taxable: bool) -> Self {
        Self::new(line.quantity, line.unit_price, taxable)
    }

    fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Derived tax figures for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSummary {
    /// Sum of every line total.
    pub subtotal: Money,
    /// Sum of taxable line totals only.
    pub tax_base: Money,
    /// `tax_base * rate`, rounded to the cent.
    pub tax_amount: Money,
    /// `subtotal + tax_amount`.
    pub grand_total: Money,
}

/// Pure tax function over a set of lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxCalculator {
    rate: TaxRate,
}

impl TaxCalculator {
    pub fn new(rate: TaxRate) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> TaxRate {
        self.rate
    }

    /// Computes the tax summary for `lines`. Order of lines is irrelevant.
    pub fn calculate(&self, lines: &[TaxableLine]) -> TaxSummary {
        let mut subtotal = Money::zero();
        let mut tax_base = Money::zero();
        for line in lines {
            let total = line.total();
            subtotal += total;
            if line.taxable {
                tax_base += total;
            }
        }

        let tax_amount = self.tax_on(tax_base);
        TaxSummary {
            subtotal,
            tax_base,
            tax_amount,
            grand_total: subtotal + tax_amount,
        }
    }

    /// Computes the summary for stored lines, skipping cancelled ones.
    ///
    /// `is_taxable` resolves the taxable flag of a line's product.
    pub fn calculate_for_lines<F>(&self, lines: &[LineItem], is_taxable: F) -> TaxSummary
    where
        F: Fn(&LineItem) -> bool,
    {
        let taxable: Vec<TaxableLine> = lines
            .iter()
            .filter(|l| l.status != LineStatus::Cancelled)
            .map(|l| TaxableLine::from_line(l, is_taxable(l)))
            .collect();
        self.calculate(&taxable)
    }

    fn tax_on(&self, base: Money) -> Money {
        let scaled = i128::from(base.cents()) * i128::from(self.rate.basis_points);
        let cents = div_round_half_away(scaled, 10_000);
        Money::from_cents(i64::try_from(cents).unwrap_or(i64::MAX))
    }
}

/// Integer division rounding half away from zero. `d` must be positive.
fn div_round_half_away(n: i128, d: i128) -> i128 {
    let quotient = n / d;
    let remainder = n % d;
    if 2 * remainder.abs() >= d {
        quotient + n.signum()
    } else {
        quotient
    }
}
