//! Collaborator interfaces and snapshot loading.
//!
//! All I/O happens here, before any computation. The engine itself only ever
//! sees a validated `FinanceSnapshot`.

use crate::budget::BudgetRecord;
use crate::commission::CommissionBreakdown;
use crate::error::{EngineError, Result};
use crate::schema::{
    Account, Deal, ExternalCategoryTotal, ExternalLineItem, ExternalReport, FinanceSnapshot, Item,
    Payment, Transaction,
};
use crate::utils::year_bounds;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::HashSet;

pub trait AccountRepository {
    fn active_accounts(&self) -> Result<Vec<Account>>;
}

pub trait TransactionRepository {
    /// Transactions dated within `[start, end]`, inclusive.
    fn transactions_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>>;
}

pub trait ItemRepository {
    fn items(&self) -> Result<Vec<Item>>;
}

pub trait BudgetRepository {
    fn budgets_for_year(&self, year: i32) -> Result<Vec<BudgetRecord>>;
    fn upsert_budget(&mut self, record: BudgetRecord) -> Result<()>;
}

pub trait ExternalReportService {
    fn category_totals(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<ExternalCategoryTotal>>;
    fn line_items(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ExternalLineItem>>;

    fn report(&self, start: NaiveDate, end: NaiveDate) -> Result<ExternalReport> {
        Ok(ExternalReport {
            totals: self.category_totals(start, end)?,
            line_items: self.line_items(start, end)?,
        })
    }
}

pub trait PaymentRepository {
    fn deals(&self) -> Result<Vec<Deal>>;
    fn payments(&self) -> Result<Vec<Payment>>;
    /// Writes a recalculated waterfall back onto its payment record.
    fn save_commission(&mut self, breakdown: &CommissionBreakdown) -> Result<()>;
}

impl FinanceSnapshot {
    /// Gathers everything needed for one calendar year from the collaborators.
    pub fn load<R>(repository: &R, year: i32) -> Result<Self>
    where
        R: AccountRepository
            + TransactionRepository
            + ItemRepository
            + BudgetRepository
            + PaymentRepository,
    {
        let (start, end) = year_bounds(year).ok_or_else(|| EngineError::ValidationError {
            entity: "year".to_string(),
            id: year.to_string(),
            details: "year is out of range".to_string(),
        })?;

        let snapshot = Self {
            accounts: repository.active_accounts()?,
            items: repository.items()?,
            transactions: repository.transactions_between(start, end)?,
            budgets: repository.budgets_for_year(year)?,
            deals: repository.deals()?,
            payments: repository.payments()?,
        };
        snapshot.validate()?;

        info!(
            "Loaded snapshot for {}: {} accounts, {} transactions, {} budgets, {} payments",
            year,
            snapshot.accounts.len(),
            snapshot.transactions.len(),
            snapshot.budgets.len(),
            snapshot.payments.len()
        );

        Ok(snapshot)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Rejects records whose shape deserialized but whose content cannot be
    /// used: empty or duplicate ids, non-finite money, negative percentages.
    /// Data-quality issues that only affect one row (unknown references,
    /// malformed paths) are left to the engine, which degrades gracefully.
    pub fn validate(&self) -> Result<()> {
        check_ids("account", self.accounts.iter().map(|a| a.id.as_str()))?;
        check_ids("item", self.items.iter().map(|i| i.id.as_str()))?;
        check_ids("transaction", self.transactions.iter().map(|t| t.id.as_str()))?;
        check_ids("deal", self.deals.iter().map(|d| d.id.as_str()))?;
        check_ids("payment", self.payments.iter().map(|p| p.id.as_str()))?;

        for account in &self.accounts {
            if let Some(budget) = account.budget_amount {
                check_finite("account", &account.id, "budget_amount", budget)?;
            }
        }

        for budget in &self.budgets {
            for (idx, value) in budget.months.iter().enumerate() {
                check_finite(
                    "budget",
                    &budget.account_id,
                    &format!("month {}", idx + 1),
                    *value,
                )?;
            }
        }

        for deal in &self.deals {
            check_finite("deal", &deal.id, "fee", deal.fee)?;
            check_finite("deal", &deal.id, "agci", deal.agci)?;
            check_percent("deal", &deal.id, deal.referral_fee_percent)?;
        }

        for payment in &self.payments {
            check_finite("payment", &payment.id, "amount", payment.amount)?;
            if let Some(percent) = payment.referral_fee_percent_override {
                check_percent("payment", &payment.id, percent)?;
            }
        }

        debug!("Snapshot passed boundary validation");
        Ok(())
    }
}

fn check_ids<'a>(entity: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(EngineError::ValidationError {
                entity: entity.to_string(),
                id: id.to_string(),
                details: "id must not be empty".to_string(),
            });
        }
        if !seen.insert(id) {
            return Err(EngineError::ValidationError {
                entity: entity.to_string(),
                id: id.to_string(),
                details: "duplicate id".to_string(),
            });
        }
    }
    Ok(())
}

fn check_finite(entity: &str, id: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(EngineError::ValidationError {
        entity: entity.to_string(),
        id: id.to_string(),
        details: format!("{} is not a finite number ({})", field, value),
    })
}

fn check_percent(entity: &str, id: &str, percent: f64) -> Result<()> {
    if percent.is_finite() && percent >= 0.0 {
        return Ok(());
    }
    Err(EngineError::ValidationError {
        entity: entity.to_string(),
        id: id.to_string(),
        details: format!("referral fee percent {} must be non-negative", percent),
    })
}

/// Collaborator backed by plain vectors. Used for tests, demos and callers
/// that already hold the data in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    pub accounts: Vec<Account>,
    pub items: Vec<Item>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<BudgetRecord>,
    pub deals: Vec<Deal>,
    pub payments: Vec<Payment>,
    pub external: ExternalReport,
}

impl InMemoryLedger {
    pub fn from_snapshot(snapshot: FinanceSnapshot) -> Self {
        Self {
            accounts: snapshot.accounts,
            items: snapshot.items,
            transactions: snapshot.transactions,
            budgets: snapshot.budgets,
            deals: snapshot.deals,
            payments: snapshot.payments,
            external: ExternalReport::default(),
        }
    }
}

impl AccountRepository for InMemoryLedger {
    fn active_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.iter().filter(|a| a.active).cloned().collect())
    }
}

impl TransactionRepository for InMemoryLedger {
    fn transactions_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }
}

impl ItemRepository for InMemoryLedger {
    fn items(&self) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }
}

impl BudgetRepository for InMemoryLedger {
    fn budgets_for_year(&self, year: i32) -> Result<Vec<BudgetRecord>> {
        Ok(self
            .budgets
            .iter()
            .filter(|b| b.year == year)
            .cloned()
            .collect())
    }

    fn upsert_budget(&mut self, record: BudgetRecord) -> Result<()> {
        match self
            .budgets
            .iter_mut()
            .find(|b| b.account_id == record.account_id && b.year == record.year)
        {
            Some(existing) => existing.months = record.months,
            None => self.budgets.push(record),
        }
        Ok(())
    }
}

impl ExternalReportService for InMemoryLedger {
    fn category_totals(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<ExternalCategoryTotal>> {
        Ok(self.external.totals.clone())
    }

    fn line_items(&self, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<ExternalLineItem>> {
        Ok(self.external.line_items.clone())
    }
}

impl PaymentRepository for InMemoryLedger {
    fn deals(&self) -> Result<Vec<Deal>> {
        Ok(self.deals.clone())
    }

    fn payments(&self) -> Result<Vec<Payment>> {
        Ok(self.payments.clone())
    }

    fn save_commission(&mut self, breakdown: &CommissionBreakdown) -> Result<()> {
        let payment = self
            .payments
            .iter_mut()
            .find(|p| p.id == breakdown.payment_id)
            .ok_or_else(|| EngineError::UnknownPayment(breakdown.payment_id.clone()))?;
        payment.amount = breakdown.payment_amount;
        payment.referral_fee_usd = breakdown.referral_fee_usd;
        payment.agci = breakdown.payment_agci;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AccountType, DealStage, TransactionKind};

    fn ledger() -> InMemoryLedger {
        InMemoryLedger {
            accounts: vec![
                Account {
                    id: "a1".to_string(),
                    qualified_name: "Expenses:Rent".to_string(),
                    account_type: AccountType::Expense,
                    budget_amount: Some(12_000.0),
                    active: true,
                },
                Account {
                    id: "a2".to_string(),
                    qualified_name: "Expenses:Old".to_string(),
                    account_type: AccountType::Expense,
                    budget_amount: None,
                    active: false,
                },
            ],
            transactions: vec![
                Transaction {
                    id: "t1".to_string(),
                    kind: TransactionKind::Purchase,
                    target_ref: "a1".to_string(),
                    amount: 1000.0,
                    date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                    paid_status: None,
                },
                Transaction {
                    id: "t2".to_string(),
                    kind: TransactionKind::Purchase,
                    target_ref: "a1".to_string(),
                    amount: 1000.0,
                    date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
                    paid_status: None,
                },
            ],
            deals: vec![Deal {
                id: "d1".to_string(),
                name: "Office Lease".to_string(),
                fee: 6_000.0,
                number_of_payments: 3,
                agci: 3_000.0,
                referral_fee_percent: 0.0,
                stage: DealStage::Booked,
            }],
            payments: vec![Payment {
                id: "p1".to_string(),
                deal_id: "d1".to_string(),
                amount: 2_000.0,
                amount_override: false,
                referral_fee_percent_override: None,
                referral_fee_usd: 0.0,
                agci: 0.0,
                estimated_date: None,
            }],
            ..InMemoryLedger::default()
        }
    }

    #[test]
    fn test_load_filters_year_and_inactive_accounts() {
        let snapshot = FinanceSnapshot::load(&ledger(), 2024).unwrap();
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.transactions.len(), 1);
        assert_eq!(snapshot.transactions[0].id, "t1");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut snapshot = FinanceSnapshot::load(&ledger(), 2024).unwrap();
        snapshot.transactions.push(snapshot.transactions[0].clone());
        assert!(matches!(
            snapshot.validate(),
            Err(EngineError::ValidationError { ref details, .. }) if details == "duplicate id"
        ));
    }

    #[test]
    fn test_non_finite_fee_rejected() {
        let mut snapshot = FinanceSnapshot::load(&ledger(), 2024).unwrap();
        snapshot.deals[0].fee = f64::NAN;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_negative_referral_percent_rejected() {
        let mut snapshot = FinanceSnapshot::load(&ledger(), 2024).unwrap();
        snapshot.payments[0].referral_fee_percent_override = Some(-5.0);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_from_json_rejects_malformed_records() {
        let json = r#"{"accounts": [{"id": "a1", "qualified_name": "Rent"}]}"#;
        assert!(matches!(
            FinanceSnapshot::from_json(json),
            Err(EngineError::SerializationError(_))
        ));
    }

    #[test]
    fn test_missing_snapshot_file_is_io_error() {
        assert!(matches!(
            FinanceSnapshot::from_json_file("/nonexistent/snapshot.json"),
            Err(EngineError::IoError(_))
        ));
    }

    #[test]
    fn test_upsert_budget_and_save_commission() {
        let mut repo = ledger();
        repo.upsert_budget(BudgetRecord {
            account_id: "a1".to_string(),
            year: 2024,
            months: [100.0; 12],
        })
        .unwrap();
        repo.upsert_budget(BudgetRecord {
            account_id: "a1".to_string(),
            year: 2024,
            months: [200.0; 12],
        })
        .unwrap();
        assert_eq!(repo.budgets_for_year(2024).unwrap().len(), 1);
        assert_eq!(repo.budgets[0].months[0], 200.0);

        let calculator = crate::commission::CommissionWaterfallCalculator::default();
        let mut breakdown = calculator.calculate(&repo.deals[0], &repo.payments[0]);
        repo.save_commission(&breakdown).unwrap();
        assert_eq!(repo.payments[0].amount, 2_000.0);
        assert!((repo.payments[0].agci - breakdown.payment_agci).abs() < 1e-9);

        breakdown.payment_id = "missing".to_string();
        assert!(matches!(
            repo.save_commission(&breakdown),
            Err(EngineError::UnknownPayment(_))
        ));
    }
}
