use brokerage_finance_engine::*;
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

fn bill(id: &str, target: &str, amount: f64, month: u32, paid: Option<PaidStatus>) -> Transaction {
    Transaction {
        id: id.to_string(),
        kind: TransactionKind::Bill,
        target_ref: target.to_string(),
        amount,
        date: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
        paid_status: paid,
    }
}

fn print_tree(tree: &CategoryTree) {
    for id in tree.pre_order() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        println!(
            "  {:indent$}{:<28} ${:>12.2}  budget ${:>10.2}",
            "",
            node.name,
            node.amount,
            node.budget_amount,
            indent = node.depth * 2
        );
    }
}

fn main() -> anyhow::Result<()> {
    println!("📊 Brokerage P&L Demo\n");

    let mut ledger = InMemoryLedger {
        accounts: vec![
            account("inc", "Income:Commissions:Leasing", AccountType::Income),
            account("rent", "Expenses:Occupancy:Rent", AccountType::Expense),
            account("electric", "Expenses:Occupancy:Electric", AccountType::Expense),
            account("mktg", "Expenses:Marketing", AccountType::Expense),
        ],
        items: vec![Item {
            id: "lease-fee".to_string(),
            income_account_id: Some("inc".to_string()),
        }],
        transactions: vec![
            Transaction {
                id: "inv-1".to_string(),
                kind: TransactionKind::Invoice,
                target_ref: "lease-fee".to_string(),
                amount: 48_000.0,
                date: NaiveDate::from_ymd_opt(2024, 2, 12).unwrap(),
                paid_status: Some(PaidStatus::Paid),
            },
            bill("b-1", "rent", 4_500.0, 1, Some(PaidStatus::Paid)),
            bill("b-2", "rent", 4_500.0, 2, Some(PaidStatus::Unpaid)),
            bill("b-3", "electric", 380.0, 2, None),
            bill("b-4", "inc", -1_200.0, 3, None),
        ],
        deals: vec![
            Deal {
                id: "d-1".to_string(),
                name: "Harbor Point Lease".to_string(),
                fee: 60_000.0,
                number_of_payments: 3,
                agci: 24_000.0,
                referral_fee_percent: 10.0,
                stage: DealStage::Executed,
            },
            Deal {
                id: "d-2".to_string(),
                name: "Elm St Acquisition".to_string(),
                fee: 25_000.0,
                number_of_payments: 1,
                agci: 10_000.0,
                referral_fee_percent: 0.0,
                stage: DealStage::Loi,
            },
        ],
        payments: (1..=3)
            .map(|n| Payment {
                id: format!("d-1-p{}", n),
                deal_id: "d-1".to_string(),
                amount: 0.0,
                amount_override: false,
                referral_fee_percent_override: None,
                referral_fee_usd: 0.0,
                agci: 0.0,
                estimated_date: NaiveDate::from_ymd_opt(2024, n * 3, 15),
            })
            .chain(std::iter::once(Payment {
                id: "d-2-p1".to_string(),
                deal_id: "d-2".to_string(),
                amount: 0.0,
                amount_override: false,
                referral_fee_percent_override: None,
                referral_fee_usd: 0.0,
                agci: 0.0,
                estimated_date: NaiveDate::from_ymd_opt(2024, 8, 1),
            }))
            .collect(),
        ..InMemoryLedger::default()
    };

    let config = EngineConfig {
        include_pipeline: true,
        ..EngineConfig::for_year(2024)
    };

    FinancialReportProcessor::apply_budget_edits(
        &mut ledger,
        config.year,
        &[
            BudgetEdit::SetAnnual {
                account_id: "rent".to_string(),
                year: 2024,
                value: 54_000.0,
            },
            BudgetEdit::SetAnnual {
                account_id: "mktg".to_string(),
                year: 2024,
                value: 6_000.0,
            },
        ],
    )?;
    FinancialReportProcessor::refresh_commissions(&mut ledger, &config)?;

    let snapshot = FinanceSnapshot::load(&ledger, config.year)?;

    for basis in [AccountingBasis::Accrual, AccountingBasis::Cash] {
        let report = build_report(&snapshot, &EngineConfig { basis, ..config.clone() })?;
        println!("📋 {:?} basis", basis);
        for section in &report.sections {
            if section.tree.is_empty() {
                continue;
            }
            println!(
                " {} (${:.2}, {:.1}% of budget)",
                section.section.label(),
                section.total,
                section.variance.percent_used
            );
            print_tree(&section.tree);
        }
        println!("  Net income: ${:.2}\n", report.summary.net_income);
    }

    let forecast = forecast_cash_flow(&snapshot, &config)?;
    println!("💵 Cash flow forecast {}", forecast.year);
    for month in &forecast.months {
        println!(
            "  {:<10} in ${:>10.2}  out ${:>10.2}  cumulative ${:>11.2}",
            month_name(month.month).unwrap_or_default(),
            month.included_income,
            month.total_expenses,
            month.cumulative_cash_flow
        );
    }
    println!("  Heaviest expense months: {:?}", forecast.heaviest_expense_months);
    println!("  Deficit months: {:?}\n", forecast.deficit_months);

    ledger.external = ExternalReport {
        totals: vec![
            ExternalCategoryTotal {
                category: "Income".to_string(),
                total: 49_200.0,
            },
            ExternalCategoryTotal {
                category: "Expenses".to_string(),
                total: 9_375.0,
            },
        ],
        line_items: vec![ExternalLineItem {
            account_name: "Electric".to_string(),
            ancestor_path: vec!["Expenses".to_string(), "Occupancy".to_string()],
            amount: 375.0,
            category: "Expenses".to_string(),
        }],
    };
    let (start, end) =
        year_bounds(config.year).ok_or_else(|| anyhow::anyhow!("invalid year {}", config.year))?;
    let external = ledger.report(start, end)?;
    let reconciliation = reconcile_with_external(&snapshot, &external, &config)?;

    println!("🔍 Reconciliation");
    for category in &reconciliation.categories {
        let marker = if category.flagged { "❌" } else { "✅" };
        println!(
            "  {} {:<20} internal ${:>10.2}  external ${:>10.2}",
            marker, category.category, category.internal_total, category.external_total
        );
        for diff in &category.drill_down {
            println!("      {:<32} {:>+10.2}", diff.account_name, diff.difference);
        }
    }

    Ok(())
}
