use crate::commission::FALLBACK_HOUSE_CUT_RATIO;
use crate::error::{EngineError, Result};
use crate::reconciler::DEFAULT_TOLERANCE;
use crate::schema::AccountingBasis;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_year() -> i32 {
    2024
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_house_cut_ratio() -> f64 {
    FALLBACK_HOUSE_CUT_RATIO
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_year")]
    #[schemars(description = "Calendar year the report, budgets and forecast cover")]
    pub year: i32,

    #[serde(default)]
    pub basis: AccountingBasis,

    #[serde(default = "default_tolerance")]
    #[schemars(
        description = "Differences below this amount between internal and external totals are rounding noise"
    )]
    pub reconciliation_tolerance: f64,

    #[serde(default = "default_house_cut_ratio")]
    #[schemars(
        description = "House cut ratio used when a deal has no positive GCI to derive it from. Business assumption, confirm with the brokerage."
    )]
    pub fallback_house_cut_ratio: f64,

    #[serde(default)]
    #[schemars(description = "Include LOI/PSA stage payments in forecast income")]
    pub include_pipeline: bool,

    #[serde(default)]
    #[schemars(description = "Include under-contract and contingent payments in forecast income")]
    pub include_under_contract: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            year: default_year(),
            basis: AccountingBasis::default(),
            reconciliation_tolerance: default_tolerance(),
            fallback_house_cut_ratio: default_house_cut_ratio(),
            include_pipeline: false,
            include_under_contract: false,
        }
    }
}

impl EngineConfig {
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reconciliation_tolerance.is_finite() || self.reconciliation_tolerance < 0.0 {
            return Err(EngineError::InvalidTolerance(self.reconciliation_tolerance));
        }

        if !(0.0..=1.0).contains(&self.fallback_house_cut_ratio) {
            return Err(EngineError::InvalidHouseCutRatio(
                self.fallback_house_cut_ratio,
            ));
        }

        Ok(())
    }
}
