use crate::budget::BudgetStore;
use crate::commission::CommissionWaterfallCalculator;
use crate::error::DataQualityWarning;
use crate::schema::{Account, AccountType, Deal, DealStage, Payment};
use crate::utils::{compare_names, is_zero_amount, month_in_year, round_to_cents};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How much confidence the forecast places in a deal's payments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum ForecastCategory {
    /// Booked, executed or closed; always counted.
    Invoiced,
    /// LOI or PSA stage, roughly 50%+ likely.
    Pipeline,
    UnderContract,
}

impl ForecastCategory {
    pub fn for_stage(stage: DealStage) -> Option<Self> {
        match stage {
            DealStage::Booked | DealStage::Executed | DealStage::ClosedPaid => {
                Some(Self::Invoiced)
            }
            DealStage::Loi | DealStage::Psa => Some(Self::Pipeline),
            DealStage::UnderContract | DealStage::Contingent => Some(Self::UnderContract),
            DealStage::Lead | DealStage::Prospect | DealStage::Lost => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastOptions {
    pub year: i32,
    pub include_pipeline: bool,
    pub include_under_contract: bool,
}

impl ForecastOptions {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            include_pipeline: false,
            include_under_contract: false,
        }
    }

    pub fn includes(&self, category: ForecastCategory) -> bool {
        match category {
            ForecastCategory::Invoiced => true,
            ForecastCategory::Pipeline => self.include_pipeline,
            ForecastCategory::UnderContract => self.include_under_contract,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPayment {
    pub payment_id: String,
    pub deal_id: String,
    pub deal_name: String,
    pub category: ForecastCategory,
    pub estimated_date: NaiveDate,
    pub house_net: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseCategoryBudget {
    pub account_id: String,
    pub qualified_name: String,
    pub account_type: AccountType,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyForecast {
    /// 1 = January.
    pub month: u32,
    pub invoiced_income: f64,
    pub pipeline_income: f64,
    pub under_contract_income: f64,
    /// Income from enabled categories only.
    pub included_income: f64,
    pub cogs_expenses: f64,
    pub operating_expenses: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub cumulative_cash_flow: f64,
    pub payments: Vec<ForecastPayment>,
    pub expense_categories: Vec<ExpenseCategoryBudget>,
}

impl MonthlyForecast {
    fn add_income(&mut self, category: ForecastCategory, amount: f64) {
        match category {
            ForecastCategory::Invoiced => self.invoiced_income += amount,
            ForecastCategory::Pipeline => self.pipeline_income += amount,
            ForecastCategory::UnderContract => self.under_contract_income += amount,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CashFlowForecast {
    pub year: i32,
    pub months: Vec<MonthlyForecast>,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cash_flow: f64,
    pub heaviest_expense_months: Vec<u32>,
    pub lightest_expense_months: Vec<u32>,
    pub surplus_months: Vec<u32>,
    pub deficit_months: Vec<u32>,
    pub warnings: Vec<DataQualityWarning>,
}

pub struct CashFlowForecaster<'a> {
    /// Budgets are keyed by account id, so accounts whose paths are kept out
    /// of the P&L tree still contribute their spend here.
    accounts: &'a [Account],
    budgets: &'a BudgetStore,
    calculator: CommissionWaterfallCalculator,
    options: ForecastOptions,
}

impl<'a> CashFlowForecaster<'a> {
    pub fn new(
        accounts: &'a [Account],
        budgets: &'a BudgetStore,
        calculator: CommissionWaterfallCalculator,
        options: ForecastOptions,
    ) -> Self {
        Self {
            accounts,
            budgets,
            calculator,
            options,
        }
    }

    pub fn forecast(&self, deals: &[Deal], payments: &[Payment]) -> CashFlowForecast {
        let year = self.options.year;
        info!(
            "Forecasting cash flow for {} (pipeline: {}, under contract: {})",
            year, self.options.include_pipeline, self.options.include_under_contract
        );

        let mut months: Vec<MonthlyForecast> = (1..=12)
            .map(|month| MonthlyForecast {
                month,
                ..MonthlyForecast::default()
            })
            .collect();
        let mut warnings = Vec::new();

        self.bucket_payments(deals, payments, &mut months, &mut warnings);
        self.bucket_expenses(&mut months);

        let mut cumulative = 0.0;
        for month in months.iter_mut() {
            month.included_income = month.invoiced_income;
            if self.options.include_pipeline {
                month.included_income += month.pipeline_income;
            }
            if self.options.include_under_contract {
                month.included_income += month.under_contract_income;
            }
            month.included_income = round_to_cents(month.included_income);
            month.total_expenses = round_to_cents(month.cogs_expenses + month.operating_expenses);
            month.net_cash_flow = round_to_cents(month.included_income - month.total_expenses);
            cumulative = round_to_cents(cumulative + month.net_cash_flow);
            month.cumulative_cash_flow = cumulative;
        }

        let total_income = round_to_cents(months.iter().map(|m| m.included_income).sum());
        let total_expenses = round_to_cents(months.iter().map(|m| m.total_expenses).sum());

        let surplus_months = months
            .iter()
            .filter(|m| m.net_cash_flow > 0.0)
            .map(|m| m.month)
            .collect();
        let deficit_months = months
            .iter()
            .filter(|m| m.net_cash_flow < 0.0)
            .map(|m| m.month)
            .collect();

        CashFlowForecast {
            year,
            heaviest_expense_months: rank_expense_months(&months, true),
            lightest_expense_months: rank_expense_months(&months, false),
            surplus_months,
            deficit_months,
            total_income,
            total_expenses,
            net_cash_flow: round_to_cents(total_income - total_expenses),
            months,
            warnings,
        }
    }

    fn bucket_payments(
        &self,
        deals: &[Deal],
        payments: &[Payment],
        months: &mut [MonthlyForecast],
        warnings: &mut Vec<DataQualityWarning>,
    ) {
        let deals_by_id: HashMap<&str, &Deal> = deals.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut skipped = 0usize;

        for payment in payments {
            let Some(deal) = deals_by_id.get(payment.deal_id.as_str()) else {
                warn!(
                    "Payment {} references unknown deal {}",
                    payment.id, payment.deal_id
                );
                warnings.push(DataQualityWarning::MissingReference {
                    transaction_id: payment.id.clone(),
                    reference: payment.deal_id.clone(),
                    details: "payment references an unknown deal".to_string(),
                });
                continue;
            };

            let Some(category) = ForecastCategory::for_stage(deal.stage) else {
                skipped += 1;
                continue;
            };
            let Some(date) = payment.estimated_date else {
                skipped += 1;
                continue;
            };
            let Some(month) = month_in_year(date, self.options.year) else {
                skipped += 1;
                continue;
            };
            let Some(slot) = months.get_mut(month as usize - 1) else {
                continue;
            };

            let breakdown = self.calculator.calculate(deal, payment);
            for warning in breakdown.warnings {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }

            slot.add_income(category, breakdown.house_net);
            if self.options.includes(category) {
                slot.payments.push(ForecastPayment {
                    payment_id: payment.id.clone(),
                    deal_id: deal.id.clone(),
                    deal_name: deal.name.clone(),
                    category,
                    estimated_date: date,
                    house_net: breakdown.house_net,
                });
            }
        }

        for month in months.iter_mut() {
            month.invoiced_income = round_to_cents(month.invoiced_income);
            month.pipeline_income = round_to_cents(month.pipeline_income);
            month.under_contract_income = round_to_cents(month.under_contract_income);
            month.payments.sort_by(|a, b| {
                a.estimated_date
                    .cmp(&b.estimated_date)
                    .then_with(|| a.payment_id.cmp(&b.payment_id))
            });
        }

        debug!(
            "Skipped {} payments outside {} or without a forecastable stage/date",
            skipped, self.options.year
        );
    }

    fn bucket_expenses(&self, months: &mut [MonthlyForecast]) {
        for account in self.accounts {
            if !account.active || account.account_type.is_income() {
                continue;
            }

            let figures = self.budgets.monthly(&account.id, self.options.year);
            for (month, amount) in months.iter_mut().zip(figures) {
                if is_zero_amount(amount) {
                    continue;
                }

                if account.account_type == AccountType::CostOfGoodsSold {
                    month.cogs_expenses += amount;
                } else {
                    month.operating_expenses += amount;
                }
                month.expense_categories.push(ExpenseCategoryBudget {
                    account_id: account.id.clone(),
                    qualified_name: account.qualified_name.clone(),
                    account_type: account.account_type,
                    amount,
                });
            }
        }

        for month in months.iter_mut() {
            month.cogs_expenses = round_to_cents(month.cogs_expenses);
            month.operating_expenses = round_to_cents(month.operating_expenses);
            month.expense_categories.sort_by(|a, b| {
                b.amount
                    .partial_cmp(&a.amount)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| compare_names(&a.qualified_name, &b.qualified_name))
                    .then_with(|| a.account_id.cmp(&b.account_id))
            });
        }
    }
}

/// Top three months by total expenses, ignoring months with no expenses.
fn rank_expense_months(months: &[MonthlyForecast], heaviest: bool) -> Vec<u32> {
    let mut ranked: Vec<&MonthlyForecast> = months
        .iter()
        .filter(|m| !is_zero_amount(m.total_expenses))
        .collect();

    ranked.sort_by(|a, b| {
        let by_amount = a
            .total_expenses
            .partial_cmp(&b.total_expenses)
            .unwrap_or(Ordering::Equal);
        let by_amount = if heaviest {
            by_amount.reverse()
        } else {
            by_amount
        };
        by_amount.then_with(|| a.month.cmp(&b.month))
    });

    ranked.into_iter().take(3).map(|m| m.month).collect()
}
