use crate::budget::BudgetRecord;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum AccountType {
    #[schemars(description = "Commission and fee revenue (Income section)")]
    Income,

    #[schemars(description = "Direct costs of closing deals (Cost of Goods Sold section)")]
    CostOfGoodsSold,

    #[schemars(description = "Operating expenses such as rent, payroll, marketing")]
    Expense,

    #[schemars(description = "Non-operating income such as interest")]
    OtherIncome,

    #[schemars(description = "Non-operating expenses such as depreciation")]
    OtherExpense,
}

impl AccountType {
    pub fn is_income(&self) -> bool {
        matches!(self, Self::Income | Self::OtherIncome)
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Account {
    pub id: String,

    #[schemars(
        description = "Colon-delimited hierarchical path, e.g. 'Expenses:Utilities:Electric'"
    )]
    pub qualified_name: String,

    pub account_type: AccountType,

    #[serde(default)]
    #[schemars(description = "Annual budget carried on the account itself, if any")]
    pub budget_amount: Option<f64>,

    #[serde(default = "default_active")]
    pub active: bool,
}

/// A product or service line. Invoices and sales receipts reference items,
/// which map onto an income account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub income_account_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TransactionKind {
    Bill,
    Invoice,
    Purchase,
    SalesReceipt,
    CreditCardCredit,
    VendorCredit,
    JournalEntry,
    Deposit,
    Expense,
    Check,
}

impl TransactionKind {
    /// Invoices and sales receipts carry an item id in `target_ref`.
    pub fn targets_item(&self) -> bool {
        matches!(self, Self::Invoice | Self::SalesReceipt)
    }

    /// Kinds that can sit unpaid and are therefore subject to the cash-basis filter.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Bill | Self::Invoice)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PaidStatus {
    Paid,
    Unpaid,
    #[schemars(description = "Settled at the time of the transaction (no payable/receivable)")]
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,

    #[schemars(
        description = "Account id, or Item id for Invoice and SalesReceipt transactions"
    )]
    pub target_ref: String,

    pub amount: f64,
    pub date: NaiveDate,

    #[serde(default)]
    #[schemars(description = "Null means not yet synced and is treated like Immediate")]
    pub paid_status: Option<PaidStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AccountingBasis {
    #[schemars(description = "Count unpaid bills and invoices in the period")]
    #[default]
    Accrual,

    #[schemars(description = "Exclude bills and invoices explicitly flagged unpaid")]
    Cash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum DealStage {
    Lead,
    Prospect,
    #[schemars(description = "Letter of intent signed")]
    Loi,
    #[schemars(description = "Purchase and sale agreement in negotiation")]
    Psa,
    UnderContract,
    Contingent,
    Booked,
    Executed,
    ClosedPaid,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Deal {
    pub id: String,
    pub name: String,

    #[schemars(description = "Total commission fee for the deal")]
    pub fee: f64,

    pub number_of_payments: u32,

    #[schemars(description = "Deal-level adjusted gross commission income")]
    pub agci: f64,

    #[serde(default)]
    pub referral_fee_percent: f64,

    pub stage: DealStage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Payment {
    pub id: String,
    pub deal_id: String,

    pub amount: f64,

    #[serde(default)]
    #[schemars(description = "When true, `amount` was entered manually and is never re-derived")]
    pub amount_override: bool,

    #[serde(default)]
    pub referral_fee_percent_override: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Derived by the commission waterfall and written back")]
    pub referral_fee_usd: f64,

    #[serde(default)]
    #[schemars(description = "Derived by the commission waterfall and written back")]
    pub agci: f64,

    #[serde(default)]
    pub estimated_date: Option<NaiveDate>,
}

/// Authoritative section total from the external accounting system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExternalCategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExternalLineItem {
    pub account_name: String,
    #[serde(default)]
    pub ancestor_path: Vec<String>,
    pub amount: f64,
    pub category: String,
}

impl ExternalLineItem {
    pub fn qualified_name(&self) -> String {
        self.ancestor_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.account_name.as_str()))
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExternalReport {
    #[serde(default)]
    pub totals: Vec<ExternalCategoryTotal>,
    #[serde(default)]
    pub line_items: Vec<ExternalLineItem>,
}

/// Everything a report is computed from. Collaborators fill this in before
/// any computation starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FinanceSnapshot {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub budgets: Vec<BudgetRecord>,
    #[serde(default)]
    pub deals: Vec<Deal>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl FinanceSnapshot {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FinanceSnapshot)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = FinanceSnapshot::schema_as_json().unwrap();
        assert!(schema_json.contains("qualified_name"));
        assert!(schema_json.contains("referral_fee_percent_override"));
        assert!(schema_json.contains("transactions"));
    }

    #[test]
    fn test_transaction_deserialization_defaults() {
        let json = r#"{
            "id": "t1",
            "kind": "Bill",
            "target_ref": "a1",
            "amount": -500.0,
            "date": "2024-03-15"
        }"#;

        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TransactionKind::Bill);
        assert_eq!(tx.paid_status, None);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn test_malformed_shape_is_rejected() {
        let json = r#"{
            "id": "t1",
            "kind": "Refund",
            "target_ref": "a1",
            "amount": 10.0,
            "date": "2024-03-15"
        }"#;

        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }

    #[test]
    fn test_account_active_defaults_to_true() {
        let json = r#"{"id": "a1", "qualified_name": "Income:Fees", "account_type": "Income"}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert!(account.active);
        assert_eq!(account.budget_amount, None);
    }

    #[test]
    fn test_external_line_item_qualified_name() {
        let item = ExternalLineItem {
            account_name: "Electric".to_string(),
            ancestor_path: vec!["Expenses".to_string(), "Utilities".to_string()],
            amount: 120.0,
            category: "Expenses".to_string(),
        };
        assert_eq!(item.qualified_name(), "Expenses:Utilities:Electric");
    }
}
