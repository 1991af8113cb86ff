use crate::chart_of_accounts::{ChartOfAccounts, ReportSection};
use crate::error::DataQualityWarning;
use crate::schema::{AccountingBasis, Item, PaidStatus, Transaction, TransactionKind};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A transaction resolved to its leaf account with the amount it adds to
/// that account's category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedTransaction {
    pub transaction: Transaction,
    pub account_id: String,
    pub section: ReportSection,
    pub contribution: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Leaf account id to its transactions, in input order.
    pub grouped: BTreeMap<String, Vec<ClassifiedTransaction>>,
    pub excluded_by_basis: usize,
    pub warnings: Vec<DataQualityWarning>,
}

impl Classification {
    pub fn for_account(&self, account_id: &str) -> &[ClassifiedTransaction] {
        self.grouped
            .get(account_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contribution_total(&self, account_id: &str) -> f64 {
        self.for_account(account_id)
            .iter()
            .map(|t| t.contribution)
            .sum()
    }
}

/// Cash basis drops only bills and invoices explicitly marked unpaid.
/// Unsynced transactions (no status) stay in.
pub fn passes_basis_filter(transaction: &Transaction, basis: AccountingBasis) -> bool {
    match basis {
        AccountingBasis::Accrual => true,
        AccountingBasis::Cash => {
            !(transaction.kind.is_payable() && transaction.paid_status == Some(PaidStatus::Unpaid))
        }
    }
}

/// Income-section bills and purchases are recorded as negative refunds on the
/// ledger and are flipped to positive income.
pub fn signed_contribution(section: ReportSection, kind: TransactionKind, amount: f64) -> f64 {
    match (section, kind) {
        (ReportSection::Income, TransactionKind::Purchase | TransactionKind::Bill) => -amount,
        _ => amount,
    }
}

pub struct TransactionClassifier<'a> {
    chart: &'a ChartOfAccounts,
    item_accounts: HashMap<&'a str, Option<&'a str>>,
    basis: AccountingBasis,
}

impl<'a> TransactionClassifier<'a> {
    pub fn new(chart: &'a ChartOfAccounts, items: &'a [Item], basis: AccountingBasis) -> Self {
        let item_accounts = items
            .iter()
            .map(|item| (item.id.as_str(), item.income_account_id.as_deref()))
            .collect();

        Self {
            chart,
            item_accounts,
            basis,
        }
    }

    /// Resolves the account id a transaction posts to, redirecting item
    /// references through the item's income account.
    pub fn resolve_account_id(
        &self,
        transaction: &Transaction,
    ) -> std::result::Result<&'a str, DataQualityWarning> {
        let missing = |reference: &str, details: &str| DataQualityWarning::MissingReference {
            transaction_id: transaction.id.clone(),
            reference: reference.to_string(),
            details: details.to_string(),
        };

        let account_id = if transaction.kind.targets_item() {
            match self.item_accounts.get(transaction.target_ref.as_str()) {
                Some(Some(account_id)) => *account_id,
                Some(None) => {
                    return Err(missing(
                        &transaction.target_ref,
                        "item has no income account mapping",
                    ))
                }
                None => return Err(missing(&transaction.target_ref, "unknown item")),
            }
        } else {
            transaction.target_ref.as_str()
        };

        self.chart
            .find(account_id)
            .map(|account| account.id.as_str())
            .ok_or_else(|| missing(account_id, "unknown or inactive account"))
    }

    pub fn classify(&self, transactions: &[Transaction]) -> Classification {
        let mut result = Classification::default();

        for transaction in transactions {
            if !transaction.amount.is_finite() {
                warn!(
                    "Rejecting transaction {} with non-finite amount",
                    transaction.id
                );
                result.warnings.push(DataQualityWarning::RejectedTransaction {
                    transaction_id: transaction.id.clone(),
                    details: format!("non-finite amount {}", transaction.amount),
                });
                continue;
            }

            if !passes_basis_filter(transaction, self.basis) {
                result.excluded_by_basis += 1;
                continue;
            }

            let account_id = match self.resolve_account_id(transaction) {
                Ok(id) => id,
                Err(warning) => {
                    warn!("Dropping transaction: {}", warning);
                    result.warnings.push(warning);
                    continue;
                }
            };

            let Some(account) = self.chart.find(account_id) else {
                continue;
            };
            let section = ReportSection::for_account_type(account.account_type);

            result
                .grouped
                .entry(account_id.to_string())
                .or_default()
                .push(ClassifiedTransaction {
                    transaction: transaction.clone(),
                    account_id: account_id.to_string(),
                    section,
                    contribution: signed_contribution(
                        section,
                        transaction.kind,
                        transaction.amount,
                    ),
                });
        }

        debug!(
            "Classified {} transactions into {} accounts ({} excluded by {:?} basis, {} warnings)",
            transactions.len(),
            result.grouped.len(),
            result.excluded_by_basis,
            self.basis,
            result.warnings.len()
        );

        result
    }
}
