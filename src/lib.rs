//! # Brokerage Finance Engine
//!
//! Hierarchical profit-and-loss aggregation, budgeting, commission waterfalls,
//! cash-flow forecasting and reconciliation for a commercial brokerage.
//!
//! ## Core Concepts
//!
//! - **Chart of accounts**: colon-delimited qualified names (`Expenses:Utilities:Electric`)
//!   become a category forest per P&L section
//! - **Basis**: Accrual keeps every transaction, Cash drops bills and invoices explicitly
//!   marked unpaid
//! - **Rollup**: every category amount is its own contribution plus all descendants
//! - **Commission waterfall**: fee → referral fee → GCI → house cut → AGCI, per payment
//! - **Forecast**: budgeted expenses against invoiced (and optionally pipeline) house net
//! - **Reconciliation**: internal section totals against an external report, with a
//!   per-account drill-down when they disagree
//!
//! ## Example
//!
//! ```rust,ignore
//! use brokerage_finance_engine::*;
//!
//! let snapshot = FinanceSnapshot::from_json(&std::fs::read_to_string("snapshot.json")?)?;
//! let config = EngineConfig::for_year(2024);
//!
//! let report = build_report(&snapshot, &config)?;
//! println!("Net income: {:.2}", report.summary.net_income);
//!
//! for warning in &report.warnings {
//!     println!("warning: {}", warning);
//! }
//! ```

pub mod budget;
pub mod chart_of_accounts;
pub mod classifier;
pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod ingestion;
pub mod reconciler;
pub mod schema;
pub mod tree;
pub mod utils;

pub use budget::{
    compute_variance, percent_used, BudgetEdit, BudgetRecord, BudgetStore, MonthlyFigures,
    Variance,
};
pub use chart_of_accounts::{parse_qualified_name, ChartOfAccounts, ReportSection};
pub use classifier::{Classification, ClassifiedTransaction, TransactionClassifier};
pub use commission::{
    CommissionBreakdown, CommissionWaterfallCalculator, DealWaterfall, PaymentChange,
    FALLBACK_HOUSE_CUT_RATIO,
};
pub use config::EngineConfig;
pub use engine::{AggregationEngine, PnlSummary};
pub use error::{DataQualityWarning, EngineError, Result};
pub use forecast::{
    CashFlowForecast, CashFlowForecaster, ForecastCategory, ForecastOptions, MonthlyForecast,
};
pub use ingestion::*;
pub use reconciler::{
    AccountDifference, CategoryReconciliation, ReconciliationReport, ValidationReconciler,
    DEFAULT_TOLERANCE,
};
pub use schema::*;
pub use tree::{AccountTreeBuilder, CategoryNode, CategoryTree, NodeId};
pub use utils::*;

use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One rendered P&L section.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SectionReport {
    pub section: ReportSection,
    pub tree: CategoryTree,
    pub total: f64,
    pub budget_total: f64,
    pub variance: Variance,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfitAndLossReport {
    pub year: i32,
    pub basis: AccountingBasis,
    /// Sections in presentation order. A section that failed to build is
    /// absent and has a `SectionFailed` warning instead.
    pub sections: Vec<SectionReport>,
    pub summary: PnlSummary,
    pub warnings: Vec<DataQualityWarning>,
}

impl ProfitAndLossReport {
    pub fn section(&self, section: ReportSection) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.section == section)
    }

    /// Zero for a missing or failed section.
    pub fn section_total(&self, section: ReportSection) -> f64 {
        self.section(section).map(|s| s.total).unwrap_or(0.0)
    }
}

pub struct FinancialReportProcessor;

impl FinancialReportProcessor {
    /// Builds the full P&L for `config.year`. Best effort: data-quality
    /// problems and failed sections become warnings on the report.
    pub fn build_report(
        snapshot: &FinanceSnapshot,
        config: &EngineConfig,
    ) -> Result<ProfitAndLossReport> {
        config.validate()?;

        info!(
            "Building {:?} basis P&L for {} from {} accounts and {} transactions",
            config.basis,
            config.year,
            snapshot.accounts.len(),
            snapshot.transactions.len()
        );

        let chart = ChartOfAccounts::from_accounts(&snapshot.accounts);
        let budgets = BudgetStore::from_records(&snapshot.budgets);

        let in_year: Vec<Transaction> = snapshot
            .transactions
            .iter()
            .filter(|t| month_in_year(t.date, config.year).is_some())
            .cloned()
            .collect();
        if in_year.len() < snapshot.transactions.len() {
            debug!(
                "Ignoring {} transactions dated outside {}",
                snapshot.transactions.len() - in_year.len(),
                config.year
            );
        }

        let classification =
            TransactionClassifier::new(&chart, &snapshot.items, config.basis).classify(&in_year);

        let mut warnings = chart.warnings.clone();
        warnings.extend(classification.warnings.iter().cloned());

        let mut sections = Vec::with_capacity(ReportSection::ALL.len());
        let mut totals = BTreeMap::new();

        for section in ReportSection::ALL {
            let raw = AccountTreeBuilder::new(section, &classification)
                .with_budgets(&budgets, config.year)
                .build(chart.section(section));

            match AggregationEngine::aggregate(raw) {
                Ok(tree) => {
                    let total = tree.total();
                    let budget_total = tree.budget_total();
                    totals.insert(section, total);
                    sections.push(SectionReport {
                        section,
                        total,
                        budget_total,
                        variance: compute_variance(budget_total, total),
                        tree,
                    });
                }
                Err(e) => {
                    error!("Section {} failed: {}", section.label(), e);
                    warnings.push(DataQualityWarning::SectionFailed {
                        section: section.label().to_string(),
                        details: e.to_string(),
                    });
                }
            }
        }

        let summary = PnlSummary::from_section_totals(&totals);
        info!(
            "P&L for {}: income {:.2}, net income {:.2}, {} warnings",
            config.year,
            summary.income,
            summary.net_income,
            warnings.len()
        );

        Ok(ProfitAndLossReport {
            year: config.year,
            basis: config.basis,
            sections,
            summary,
            warnings,
        })
    }

    pub fn forecast(snapshot: &FinanceSnapshot, config: &EngineConfig) -> Result<CashFlowForecast> {
        config.validate()?;

        let chart = ChartOfAccounts::from_accounts(&snapshot.accounts);
        let budgets = BudgetStore::from_records(&snapshot.budgets);
        let calculator = CommissionWaterfallCalculator::new(config.fallback_house_cut_ratio)?;
        let options = ForecastOptions {
            year: config.year,
            include_pipeline: config.include_pipeline,
            include_under_contract: config.include_under_contract,
        };

        let mut forecast = CashFlowForecaster::new(&snapshot.accounts, &budgets, calculator, options)
            .forecast(&snapshot.deals, &snapshot.payments);

        // Budgets of accounts kept out of the tree are still forecast, but the
        // caller should know their paths are broken.
        let mut warnings = chart.warnings;
        warnings.append(&mut forecast.warnings);
        forecast.warnings = warnings;
        Ok(forecast)
    }

    pub fn reconcile(
        report: &ProfitAndLossReport,
        external: &ExternalReport,
        config: &EngineConfig,
    ) -> Result<ReconciliationReport> {
        let reconciler = ValidationReconciler::new(config.reconciliation_tolerance)?;
        Ok(reconciler.reconcile_report(report, external))
    }

    /// Builds the report, reconciles it against the external report and adds
    /// stale commission fields to the reconciliation warnings.
    pub fn reconcile_snapshot(
        snapshot: &FinanceSnapshot,
        external: &ExternalReport,
        config: &EngineConfig,
    ) -> Result<ReconciliationReport> {
        let report = Self::build_report(snapshot, config)?;
        let mut reconciliation = Self::reconcile(&report, external, config)?;
        reconciliation
            .warnings
            .extend(Self::check_commissions(snapshot, config)?);
        Ok(reconciliation)
    }

    /// Reports payments whose stored derived fields disagree with a fresh
    /// waterfall. Read-only.
    pub fn check_commissions(
        snapshot: &FinanceSnapshot,
        config: &EngineConfig,
    ) -> Result<Vec<DataQualityWarning>> {
        let calculator = CommissionWaterfallCalculator::new(config.fallback_house_cut_ratio)?;
        let reconciler = ValidationReconciler::new(config.reconciliation_tolerance)?;
        Ok(reconciler.check_commission_freshness(&calculator, &snapshot.deals, &snapshot.payments))
    }

    /// Recomputes every payment's waterfall and saves it through the
    /// repository. Payments on unknown deals are skipped.
    pub fn refresh_commissions<R: PaymentRepository>(
        repository: &mut R,
        config: &EngineConfig,
    ) -> Result<Vec<CommissionBreakdown>> {
        let calculator = CommissionWaterfallCalculator::new(config.fallback_house_cut_ratio)?;
        let deals = repository.deals()?;
        let deals_by_id: HashMap<&str, &Deal> = deals.iter().map(|d| (d.id.as_str(), d)).collect();

        let mut breakdowns = Vec::new();
        for mut payment in repository.payments()? {
            let Some(deal) = deals_by_id.get(payment.deal_id.as_str()) else {
                warn!(
                    "Payment {} references unknown deal {}; not recalculated",
                    payment.id, payment.deal_id
                );
                continue;
            };
            let breakdown = calculator.recalculate(deal, &mut payment)?;
            repository.save_commission(&breakdown)?;
            breakdowns.push(breakdown);
        }

        info!("Refreshed commissions on {} payments", breakdowns.len());
        Ok(breakdowns)
    }

    /// Applies budget edits on top of the stored budgets and upserts every
    /// touched record. A cleared budget is stored as twelve zeros.
    pub fn apply_budget_edits<R: BudgetRepository>(
        repository: &mut R,
        year: i32,
        edits: &[BudgetEdit],
    ) -> Result<BudgetStore> {
        let mut store = BudgetStore::from_records(&repository.budgets_for_year(year)?);

        for edit in edits {
            store.apply(edit)?;
            let (account_id, edit_year) = edit.key();
            if edit_year != year {
                debug!(
                    "Budget edit for {} targets {}, not {}",
                    account_id, edit_year, year
                );
            }
            repository.upsert_budget(BudgetRecord {
                account_id: account_id.to_string(),
                year: edit_year,
                months: store.monthly(account_id, edit_year),
            })?;
        }

        Ok(store)
    }
}

pub fn build_report(snapshot: &FinanceSnapshot, config: &EngineConfig) -> Result<ProfitAndLossReport> {
    FinancialReportProcessor::build_report(snapshot, config)
}

pub fn forecast_cash_flow(
    snapshot: &FinanceSnapshot,
    config: &EngineConfig,
) -> Result<CashFlowForecast> {
    FinancialReportProcessor::forecast(snapshot, config)
}

pub fn reconcile_with_external(
    snapshot: &FinanceSnapshot,
    external: &ExternalReport,
    config: &EngineConfig,
) -> Result<ReconciliationReport> {
    FinancialReportProcessor::reconcile_snapshot(snapshot, external, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn account(id: &str, name: &str, account_type: AccountType) -> Account {
        Account {
            id: id.to_string(),
            qualified_name: name.to_string(),
            account_type,
            budget_amount: None,
            active: true,
        }
    }

    fn transaction(
        id: &str,
        kind: TransactionKind,
        target: &str,
        amount: f64,
        paid_status: Option<PaidStatus>,
    ) -> Transaction {
        Transaction {
            id: id.to_string(),
            kind,
            target_ref: target.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            paid_status,
        }
    }

    fn snapshot() -> FinanceSnapshot {
        FinanceSnapshot {
            accounts: vec![
                account("inc", "Income:Commissions", AccountType::Income),
                account("rent", "Expenses:Rent", AccountType::Expense),
                account("util", "Expenses:Utilities", AccountType::Expense),
            ],
            items: vec![Item {
                id: "item-lease".to_string(),
                income_account_id: Some("inc".to_string()),
            }],
            transactions: vec![
                transaction("t1", TransactionKind::Invoice, "item-lease", 8_000.0, None),
                transaction("t2", TransactionKind::Bill, "inc", -500.0, None),
                transaction("t3", TransactionKind::Bill, "rent", 2_000.0, Some(PaidStatus::Unpaid)),
                transaction("t4", TransactionKind::Expense, "util", 300.0, None),
            ],
            ..FinanceSnapshot::default()
        }
    }

    #[test]
    fn test_income_refund_is_sign_flipped() {
        let report = build_report(&snapshot(), &EngineConfig::for_year(2024)).unwrap();
        let income = report.section(ReportSection::Income).unwrap();
        assert_eq!(income.total, 8_500.0);
        assert_eq!(report.summary.income, 8_500.0);
    }

    #[test]
    fn test_cash_basis_drops_unpaid_bill_only() {
        let mut config = EngineConfig::for_year(2024);
        let accrual = build_report(&snapshot(), &config).unwrap();
        config.basis = AccountingBasis::Cash;
        let cash = build_report(&snapshot(), &config).unwrap();

        assert_eq!(
            accrual.section_total(ReportSection::OperatingExpenses),
            2_300.0
        );
        assert_eq!(cash.section_total(ReportSection::OperatingExpenses), 300.0);
        assert_eq!(cash.section_total(ReportSection::Income), 8_500.0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let config = EngineConfig::for_year(2024);
        let first = build_report(&snapshot(), &config).unwrap();
        let second = build_report(&snapshot(), &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_out_of_year_transactions_ignored() {
        let mut snap = snapshot();
        snap.transactions[3].date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let report = build_report(&snap, &EngineConfig::for_year(2024)).unwrap();
        assert_eq!(
            report.section_total(ReportSection::OperatingExpenses),
            2_000.0
        );
    }

    #[test]
    fn test_failed_section_is_reported_and_others_render() {
        let mut snap = snapshot();
        snap.transactions
            .push(transaction("t5", TransactionKind::Expense, "rent", f64::MAX, None));
        snap.transactions
            .push(transaction("t6", TransactionKind::Expense, "util", f64::MAX, None));

        let report = build_report(&snap, &EngineConfig::for_year(2024)).unwrap();
        assert!(report.section(ReportSection::OperatingExpenses).is_none());
        assert!(report.section(ReportSection::Income).is_some());
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            DataQualityWarning::SectionFailed { section, .. } if section == "Operating Expenses"
        )));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::for_year(2024);
        config.reconciliation_tolerance = -1.0;
        assert!(matches!(
            build_report(&snapshot(), &config),
            Err(EngineError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn test_apply_budget_edits_upserts() {
        let mut ledger = InMemoryLedger::default();
        let store = FinancialReportProcessor::apply_budget_edits(
            &mut ledger,
            2024,
            &[
                BudgetEdit::SetAnnual {
                    account_id: "rent".to_string(),
                    year: 2024,
                    value: 1_200.0,
                },
                BudgetEdit::SetMonth {
                    account_id: "rent".to_string(),
                    year: 2024,
                    month: 2,
                    value: 250.0,
                },
            ],
        )
        .unwrap();

        assert_eq!(store.annual_total("rent", 2024), 1_350.0);
        assert_eq!(ledger.budgets.len(), 1);
        assert_eq!(ledger.budgets[0].months[0], 100.0);
        assert_eq!(ledger.budgets[0].months[1], 250.0);
    }
}
