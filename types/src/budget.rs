//! Context window budget reading.

use serde::{Deserialize, Serialize};

/// Severity band of the context meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetBand {
    /// Below half of the window.
    Nominal,
    /// Below 80% of the window.
    Warning,
    Critical,
}

impl BudgetBand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetBand::Nominal => "nominal",
            BudgetBand::Warning => "warning",
            BudgetBand::Critical => "critical",
        }
    }
}

/// Tokens used by the next request against the model's context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub used: u64,
    pub max: u64,
}

impl TokenBudget {
    #[must_use]
    pub const fn new(used: u64, max: u64) -> Self {
        Self { used, max }
    }

    /// Fraction of the window in use. A zero-sized window counts as full.
    #[must_use]
    pub fn ratio(self) -> f64 {
        if self.max == 0 {
            return 1.0;
        }
        self.used as f64 / self.max as f64
    }

    /// Percentage for display, clamped to 100.
    #[must_use]
    pub fn percent(self) -> f64 {
        (self.ratio() * 100.0).min(100.0)
    }

    #[must_use]
    pub fn band(self) -> BudgetBand {
        let ratio = self.ratio();
        if ratio < 0.5 {
            BudgetBand::Nominal
        } else if ratio < 0.8 {
            BudgetBand::Warning
        } else {
            BudgetBand::Critical
        }
    }

    #[must_use]
    pub fn remaining(self) -> u64 {
        self.max.saturating_sub(self.used)
    }
}

impl std::fmt::Display for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} tokens ({:.1}%)",
            self.used,
            self.max,
            self.percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{BudgetBand, TokenBudget};

    #[test]
    fn band_thresholds() {
        assert_eq!(TokenBudget::new(0, 1000).band(), BudgetBand::Nominal);
        assert_eq!(TokenBudget::new(499, 1000).band(), BudgetBand::Nominal);
        assert_eq!(TokenBudget::new(500, 1000).band(), BudgetBand::Warning);
        assert_eq!(TokenBudget::new(799, 1000).band(), BudgetBand::Warning);
        assert_eq!(TokenBudget::new(800, 1000).band(), BudgetBand::Critical);
        assert_eq!(TokenBudget::new(5000, 1000).band(), BudgetBand::Critical);
    }

    #[test]
    fn percent_is_clamped() {
        assert!((TokenBudget::new(250, 1000).percent() - 25.0).abs() < f64::EPSILON);
        assert!((TokenBudget::new(3000, 1000).percent() - 100.0).abs() < f64::EPSILON);
        assert_eq!(TokenBudget::new(3000, 1000).remaining(), 0);
    }

    #[test]
    fn zero_window_is_critical() {
        assert_eq!(TokenBudget::new(0, 0).band(), BudgetBand::Critical);
    }
}
