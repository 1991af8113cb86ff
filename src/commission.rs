//! Commission waterfall: deal fee → referral fee → GCI → house cut → AGCI,
//! derived per payment.

use crate::error::{DataQualityWarning, EngineError, Result};
use crate::schema::{Deal, Payment};
use crate::utils::round_to_cents;
use log::warn;
use serde::{Deserialize, Serialize};

/// House cut ratio applied when a deal's GCI is not positive. This is a
/// business assumption, not derived from data.
pub const FALLBACK_HOUSE_CUT_RATIO: f64 = 0.45;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DealWaterfall {
    pub deal_gci: f64,
    pub house_cut_ratio: f64,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommissionBreakdown {
    pub payment_id: String,
    pub deal_id: String,
    pub payment_amount: f64,
    pub referral_fee_percent: f64,
    pub referral_fee_usd: f64,
    pub payment_gci: f64,
    pub payment_agci: f64,
    /// Portion of GCI paid out to brokers.
    pub broker_splits_total: f64,
    pub house_net: f64,
    pub warnings: Vec<DataQualityWarning>,
}

/// A user edit to a payment. Every change triggers a full recalculation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum PaymentChange {
    /// Manually entered amount; marks the payment as overridden.
    Amount { value: f64 },
    AmountOverride { enabled: bool },
    ReferralFeePercentOverride { percent: Option<f64> },
}

#[derive(Debug, Clone, Copy)]
pub struct CommissionWaterfallCalculator {
    fallback_house_cut_ratio: f64,
}

impl Default for CommissionWaterfallCalculator {
    fn default() -> Self {
        Self {
            fallback_house_cut_ratio: FALLBACK_HOUSE_CUT_RATIO,
        }
    }
}

impl CommissionWaterfallCalculator {
    pub fn new(fallback_house_cut_ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fallback_house_cut_ratio) {
            return Err(EngineError::InvalidHouseCutRatio(fallback_house_cut_ratio));
        }
        Ok(Self {
            fallback_house_cut_ratio,
        })
    }

    pub fn deal_waterfall(&self, deal: &Deal) -> (DealWaterfall, Option<DataQualityWarning>) {
        let deal_gci = deal.fee * (1.0 - deal.referral_fee_percent / 100.0);

        if deal_gci > 0.0 {
            let waterfall = DealWaterfall {
                deal_gci,
                house_cut_ratio: (deal_gci - deal.agci) / deal_gci,
                used_fallback: false,
            };
            return (waterfall, None);
        }

        warn!(
            "Deal {} has non-positive GCI {:.2}; using fallback house cut {}",
            deal.id, deal_gci, self.fallback_house_cut_ratio
        );
        let waterfall = DealWaterfall {
            deal_gci,
            house_cut_ratio: self.fallback_house_cut_ratio,
            used_fallback: true,
        };
        let warning = DataQualityWarning::DivisionByZero {
            deal_id: deal.id.clone(),
            details: format!(
                "deal GCI is {:.2}; applied fallback house cut ratio {}",
                deal_gci, self.fallback_house_cut_ratio
            ),
        };
        (waterfall, Some(warning))
    }

    /// The amount a payment should carry: the manual value when overridden,
    /// otherwise an even share of the fee.
    pub fn payment_amount(
        &self,
        deal: &Deal,
        payment: &Payment,
    ) -> (f64, Option<DataQualityWarning>) {
        if payment.amount_override {
            return (payment.amount, None);
        }

        if deal.number_of_payments == 0 {
            warn!(
                "Deal {} has zero payments; keeping stored amount on payment {}",
                deal.id, payment.id
            );
            let warning = DataQualityWarning::DivisionByZero {
                deal_id: deal.id.clone(),
                details: format!(
                    "number_of_payments is 0; payment {} keeps its stored amount",
                    payment.id
                ),
            };
            return (payment.amount, Some(warning));
        }

        (
            round_to_cents(deal.fee / f64::from(deal.number_of_payments)),
            None,
        )
    }

    pub fn calculate(&self, deal: &Deal, payment: &Payment) -> CommissionBreakdown {
        let (waterfall, deal_warning) = self.deal_waterfall(deal);
        let (payment_amount, amount_warning) = self.payment_amount(deal, payment);

        let referral_fee_percent = payment
            .referral_fee_percent_override
            .unwrap_or(deal.referral_fee_percent);
        let referral_fee_usd = round_to_cents(payment_amount * referral_fee_percent / 100.0);
        let payment_gci = round_to_cents(payment_amount - referral_fee_usd);
        let payment_agci = round_to_cents(payment_gci * (1.0 - waterfall.house_cut_ratio));
        let broker_splits_total = round_to_cents(payment_gci - payment_agci);
        let house_net = round_to_cents(payment_amount - referral_fee_usd - broker_splits_total);

        CommissionBreakdown {
            payment_id: payment.id.clone(),
            deal_id: deal.id.clone(),
            payment_amount,
            referral_fee_percent,
            referral_fee_usd,
            payment_gci,
            payment_agci,
            broker_splits_total,
            house_net,
            warnings: deal_warning.into_iter().chain(amount_warning).collect(),
        }
    }

    /// Recalculates a payment and writes the derived fields back onto it.
    pub fn recalculate(&self, deal: &Deal, payment: &mut Payment) -> Result<CommissionBreakdown> {
        if payment.deal_id != deal.id {
            return Err(EngineError::UnknownDeal(payment.deal_id.clone()));
        }

        let breakdown = self.calculate(deal, payment);
        payment.amount = breakdown.payment_amount;
        payment.referral_fee_usd = breakdown.referral_fee_usd;
        payment.agci = breakdown.payment_agci;
        Ok(breakdown)
    }

    /// Applies a user edit and immediately recalculates, so derived fields
    /// never lag behind the amount or referral inputs.
    pub fn apply_change(
        &self,
        deal: &Deal,
        payment: &mut Payment,
        change: &PaymentChange,
    ) -> Result<CommissionBreakdown> {
        match change {
            PaymentChange::Amount { value } => {
                payment.amount = *value;
                payment.amount_override = true;
            }
            PaymentChange::AmountOverride { enabled } => {
                payment.amount_override = *enabled;
            }
            PaymentChange::ReferralFeePercentOverride { percent } => {
                payment.referral_fee_percent_override = *percent;
            }
        }
        self.recalculate(deal, payment)
    }
}
