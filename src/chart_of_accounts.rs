use crate::error::DataQualityWarning;
use crate::schema::{Account, AccountType};
use crate::utils::compare_names;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// P&L sections in presentation order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum ReportSection {
    Income,
    CostOfGoodsSold,
    OperatingExpenses,
    OtherIncome,
    OtherExpenses,
}

impl ReportSection {
    pub const ALL: [ReportSection; 5] = [
        ReportSection::Income,
        ReportSection::CostOfGoodsSold,
        ReportSection::OperatingExpenses,
        ReportSection::OtherIncome,
        ReportSection::OtherExpenses,
    ];

    pub fn for_account_type(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Income => Self::Income,
            AccountType::CostOfGoodsSold => Self::CostOfGoodsSold,
            AccountType::Expense => Self::OperatingExpenses,
            AccountType::OtherIncome => Self::OtherIncome,
            AccountType::OtherExpense => Self::OtherExpenses,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::CostOfGoodsSold => "Cost of Goods Sold",
            Self::OperatingExpenses => "Operating Expenses",
            Self::OtherIncome => "Other Income",
            Self::OtherExpenses => "Other Expenses",
        }
    }

    /// Matches the category labels used by external accounting reports.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "income" | "revenue" | "total income" => Some(Self::Income),
            "cost of goods sold" | "cogs" | "cost of sales" => Some(Self::CostOfGoodsSold),
            "expenses" | "expense" | "operating expenses" | "total expenses" => {
                Some(Self::OperatingExpenses)
            }
            "other income" => Some(Self::OtherIncome),
            "other expenses" | "other expense" => Some(Self::OtherExpenses),
            _ => None,
        }
    }
}

/// Splits a qualified name into trimmed segments. Returns `None` when any
/// segment is empty, e.g. `"Expenses::Rent"` or `"Expenses:"`.
pub fn parse_qualified_name(qualified_name: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = qualified_name.split(':').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Active accounts grouped by section, with malformed and colliding paths
/// filtered out.
#[derive(Debug, Clone, Default)]
pub struct ChartOfAccounts {
    sections: BTreeMap<ReportSection, Vec<Account>>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ChartOfAccounts {
    pub fn from_accounts(accounts: &[Account]) -> Self {
        let mut sections: BTreeMap<ReportSection, Vec<Account>> = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut seen_paths: HashMap<String, String> = HashMap::new();

        for account in accounts.iter().filter(|a| a.active) {
            let Some(segments) = parse_qualified_name(&account.qualified_name) else {
                warn!(
                    "Excluding account {} with malformed path '{}'",
                    account.id, account.qualified_name
                );
                warnings.push(DataQualityWarning::MalformedPath {
                    account_id: account.id.clone(),
                    qualified_name: account.qualified_name.clone(),
                });
                continue;
            };

            let full_path = segments.join(":");
            if let Some(kept) = seen_paths.get(&full_path) {
                warn!(
                    "Account {} collides with {} on '{}'",
                    account.id, kept, full_path
                );
                warnings.push(DataQualityWarning::AmbiguousPath {
                    account_id: account.id.clone(),
                    qualified_name: account.qualified_name.clone(),
                    kept_account_id: kept.clone(),
                });
                continue;
            }
            seen_paths.insert(full_path, account.id.clone());

            sections
                .entry(ReportSection::for_account_type(account.account_type))
                .or_default()
                .push(account.clone());
        }

        for accounts in sections.values_mut() {
            accounts.sort_by(|a, b| compare_names(&a.qualified_name, &b.qualified_name));
        }

        Self { sections, warnings }
    }

    pub fn section(&self, section: ReportSection) -> &[Account] {
        self.sections
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        ReportSection::ALL
            .iter()
            .flat_map(move |section| self.section(*section).iter())
    }

    pub fn find(&self, account_id: &str) -> Option<&Account> {
        self.accounts().find(|a| a.id == account_id)
    }

    pub fn total_accounts(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}
