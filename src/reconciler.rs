use crate::chart_of_accounts::ReportSection;
use crate::commission::CommissionWaterfallCalculator;
use crate::error::{DataQualityWarning, EngineError, Result};
use crate::schema::{Deal, ExternalReport, Payment};
use crate::utils::{compare_names, round_to_cents};
use crate::ProfitAndLossReport;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Differences smaller than a dollar are rounding noise.
pub const DEFAULT_TOLERANCE: f64 = 1.0;

/// Stored payment fields may drift by at most a cent before they count as stale.
const STALE_FIELD_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountDifference {
    pub account_name: String,
    pub internal: f64,
    pub external: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryReconciliation {
    pub category: String,
    pub internal_total: f64,
    pub external_total: f64,
    /// Internal minus external, in cents precision.
    pub difference: f64,
    pub flagged: bool,
    /// Populated only for flagged categories, largest difference first.
    pub drill_down: Vec<AccountDifference>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub categories: Vec<CategoryReconciliation>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ReconciliationReport {
    pub fn flagged(&self) -> impl Iterator<Item = &CategoryReconciliation> {
        self.categories.iter().filter(|c| c.flagged)
    }

    pub fn is_reconciled(&self) -> bool {
        self.flagged().next().is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationReconciler {
    tolerance: f64,
}

impl Default for ValidationReconciler {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ValidationReconciler {
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(EngineError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn is_discrepancy(&self, internal: f64, external: f64) -> bool {
        round_to_cents(internal - external).abs() >= self.tolerance
    }

    /// Per-account differences over the union of names from both sides,
    /// keeping only those at or above the tolerance.
    pub fn drill_down(
        &self,
        internal: &BTreeMap<String, f64>,
        external: &BTreeMap<String, f64>,
    ) -> Vec<AccountDifference> {
        let names: BTreeSet<&String> = internal.keys().chain(external.keys()).collect();

        let mut differences: Vec<AccountDifference> = names
            .into_iter()
            .map(|name| {
                let internal = internal.get(name).copied().unwrap_or(0.0);
                let external = external.get(name).copied().unwrap_or(0.0);
                AccountDifference {
                    account_name: name.clone(),
                    internal,
                    external,
                    difference: round_to_cents(internal - external),
                }
            })
            .filter(|d| d.difference.abs() >= self.tolerance)
            .collect();

        differences.sort_by(|a, b| {
            b.difference
                .abs()
                .partial_cmp(&a.difference.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| compare_names(&a.account_name, &b.account_name))
        });
        differences
    }

    pub fn reconcile_category(
        &self,
        category: &str,
        internal_total: f64,
        external_total: f64,
        internal_leaves: &BTreeMap<String, f64>,
        external_leaves: &BTreeMap<String, f64>,
    ) -> CategoryReconciliation {
        let flagged = self.is_discrepancy(internal_total, external_total);
        let drill_down = if flagged {
            self.drill_down(internal_leaves, external_leaves)
        } else {
            Vec::new()
        };

        if flagged {
            warn!(
                "{}: internal {:.2} vs external {:.2} ({} accounts differ)",
                category,
                internal_total,
                external_total,
                drill_down.len()
            );
        }

        CategoryReconciliation {
            category: category.to_string(),
            internal_total,
            external_total,
            difference: round_to_cents(internal_total - external_total),
            flagged,
            drill_down,
        }
    }

    /// Compares every section of a built report with the external report.
    pub fn reconcile_report(
        &self,
        report: &ProfitAndLossReport,
        external: &ExternalReport,
    ) -> ReconciliationReport {
        let mut warnings = Vec::new();
        let mut external_totals: HashMap<ReportSection, f64> = HashMap::new();
        let mut external_leaves: HashMap<ReportSection, BTreeMap<String, f64>> = HashMap::new();

        for total in &external.totals {
            match ReportSection::from_label(&total.category) {
                Some(section) => *external_totals.entry(section).or_default() += total.total,
                None => push_unknown_category(&mut warnings, &total.category),
            }
        }

        for item in &external.line_items {
            match ReportSection::from_label(&item.category) {
                Some(section) => {
                    *external_leaves
                        .entry(section)
                        .or_default()
                        .entry(item.qualified_name())
                        .or_default() += item.amount;
                }
                None => push_unknown_category(&mut warnings, &item.category),
            }
        }

        let mut categories = Vec::new();
        for section in ReportSection::ALL {
            let internal_total = report.section_total(section);
            let internal_leaves: BTreeMap<String, f64> = report
                .section(section)
                .map(|s| s.tree.leaf_amounts().into_iter().collect())
                .unwrap_or_default();
            let external_total = external_totals.get(&section).copied().unwrap_or(0.0);
            let empty = BTreeMap::new();
            let section_external_leaves = external_leaves.get(&section).unwrap_or(&empty);

            categories.push(self.reconcile_category(
                section.label(),
                internal_total,
                external_total,
                &internal_leaves,
                section_external_leaves,
            ));
        }

        let flagged = categories.iter().filter(|c| c.flagged).count();
        info!(
            "Reconciled {} categories against external report, {} flagged",
            categories.len(),
            flagged
        );

        ReconciliationReport {
            categories,
            warnings,
        }
    }

    /// Recomputes each payment's waterfall and reports stored fields that no
    /// longer match. Nothing is corrected here.
    pub fn check_commission_freshness(
        &self,
        calculator: &CommissionWaterfallCalculator,
        deals: &[Deal],
        payments: &[Payment],
    ) -> Vec<DataQualityWarning> {
        let deals_by_id: HashMap<&str, &Deal> = deals.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut warnings = Vec::new();

        for payment in payments {
            let Some(deal) = deals_by_id.get(payment.deal_id.as_str()) else {
                debug!(
                    "Skipping freshness check for payment {} (unknown deal {})",
                    payment.id, payment.deal_id
                );
                continue;
            };

            let expected = calculator.calculate(deal, payment);
            let fields = [
                ("amount", payment.amount, expected.payment_amount),
                (
                    "referral_fee_usd",
                    payment.referral_fee_usd,
                    expected.referral_fee_usd,
                ),
                ("agci", payment.agci, expected.payment_agci),
            ];

            for (field, stored, expected) in fields {
                if (stored - expected).abs() > STALE_FIELD_TOLERANCE {
                    warn!(
                        "Payment {} has stale {}: stored {:.2}, expected {:.2}",
                        payment.id, field, stored, expected
                    );
                    warnings.push(DataQualityWarning::StaleOverride {
                        payment_id: payment.id.clone(),
                        field: field.to_string(),
                        stored,
                        expected,
                    });
                }
            }
        }

        warnings
    }
}

fn push_unknown_category(warnings: &mut Vec<DataQualityWarning>, category: &str) {
    let warning = DataQualityWarning::UnknownCategory {
        category: category.to_string(),
    };
    if !warnings.contains(&warning) {
        warn!("{}", warning);
        warnings.push(warning);
    }
}
