use crate::chart_of_accounts::ReportSection;
use crate::error::{EngineError, Result};
use crate::tree::{CategoryTree, NodeId};
use crate::utils::{compare_names, is_zero_amount};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Turns a raw section forest into its presentation form: rolled up, pruned,
/// sorted and compacted.
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn aggregate(mut tree: CategoryTree) -> Result<CategoryTree> {
        Self::rollup(&mut tree);

        let total = tree.total();
        if !total.is_finite() {
            return Err(EngineError::NonFiniteTotal {
                section: tree.section.label().to_string(),
                amount: total,
            });
        }

        let before = tree.len();
        Self::prune(&mut tree);
        Self::sort(&mut tree);
        tree.compact();

        debug!(
            "{}: {} nodes after pruning {} empty categories, total {:.2}",
            tree.section.label(),
            tree.len(),
            before - tree.len(),
            tree.total()
        );

        Ok(tree)
    }

    /// Sums `amount` and `budget_amount` from the leaves up.
    pub fn rollup(tree: &mut CategoryTree) {
        for id in tree.post_order() {
            let (child_amount, child_budget) = tree
                .children(id)
                .fold((0.0, 0.0), |(a, b), child| {
                    (a + child.amount, b + child.budget_amount)
                });

            if let Some(node) = tree.nodes.get_mut(id) {
                node.amount = node.own_amount + child_amount;
                node.budget_amount = node.own_budget + child_budget;
            }
        }
    }

    /// Detaches childless zero-amount nodes, deepest first, so a parent whose
    /// children all disappear is itself reconsidered.
    ///
    /// A dropped leaf under half a cent keeps its amount in the parent's
    /// rollup, so after pruning a parent matches its visible children to
    /// within half a cent per removed leaf.
    pub fn prune(tree: &mut CategoryTree) {
        let mut removed: HashSet<NodeId> = HashSet::new();

        for id in tree.post_order() {
            let Some(node) = tree.nodes.get_mut(id) else {
                continue;
            };
            node.children.retain(|c| !removed.contains(c));
            node.is_parent = !node.children.is_empty();

            if node.children.is_empty() && is_zero_amount(node.amount) {
                removed.insert(id);
            }
        }

        tree.roots.retain(|r| !removed.contains(r));
    }

    pub fn sort(tree: &mut CategoryTree) {
        let names: Vec<String> = tree.nodes.iter().map(|n| n.name.clone()).collect();
        let by_name = |a: &NodeId, b: &NodeId| {
            compare_names(
                names.get(*a).map(String::as_str).unwrap_or_default(),
                names.get(*b).map(String::as_str).unwrap_or_default(),
            )
        };

        tree.roots.sort_by(by_name);
        for node in tree.nodes.iter_mut() {
            node.children.sort_by(by_name);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PnlSummary {
    pub income: f64,
    pub cost_of_goods_sold: f64,
    pub gross_profit: f64,
    pub operating_expenses: f64,
    pub operating_income: f64,
    pub other_income: f64,
    pub other_expenses: f64,
    pub net_income: f64,
}

impl PnlSummary {
    /// Missing sections count as zero.
    pub fn from_section_totals(totals: &BTreeMap<ReportSection, f64>) -> Self {
        let total = |section: ReportSection| totals.get(&section).copied().unwrap_or(0.0);

        let income = total(ReportSection::Income);
        let cost_of_goods_sold = total(ReportSection::CostOfGoodsSold);
        let operating_expenses = total(ReportSection::OperatingExpenses);
        let other_income = total(ReportSection::OtherIncome);
        let other_expenses = total(ReportSection::OtherExpenses);

        let gross_profit = income - cost_of_goods_sold;
        let operating_income = gross_profit - operating_expenses;
        let net_income = operating_income + other_income - other_expenses;

        Self {
            income,
            cost_of_goods_sold,
            gross_profit,
            operating_expenses,
            operating_income,
            other_income,
            other_expenses,
            net_income,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::ChartOfAccounts;
    use crate::classifier::TransactionClassifier;
    use crate::schema::{Account, AccountType, AccountingBasis, Transaction, TransactionKind};
    use crate::tree::AccountTreeBuilder;
    use chrono::NaiveDate;

    fn account(id: &str, name: &str) -> Account {
        Account {
            id: id.to_string(),
            qualified_name: name.to_string(),
            account_type: AccountType::Expense,
            budget_amount: None,
            active: true,
        }
    }

    fn purchase(target: &str, amount: f64) -> Transaction {
        Transaction {
            id: format!("t-{}-{}", target, amount),
            kind: TransactionKind::Purchase,
            target_ref: target.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            paid_status: None,
        }
    }

    fn aggregate(accounts: &[Account], transactions: &[Transaction]) -> CategoryTree {
        let chart = ChartOfAccounts::from_accounts(accounts);
        let classification =
            TransactionClassifier::new(&chart, &[], AccountingBasis::Accrual).classify(transactions);
        let raw = AccountTreeBuilder::new(ReportSection::OperatingExpenses, &classification)
            .build(chart.section(ReportSection::OperatingExpenses));
        AggregationEngine::aggregate(raw).unwrap()
    }

    #[test]
    fn test_rollup_sums_descendants() {
        let tree = aggregate(
            &[
                account("1", "Expenses:Utilities:Electric"),
                account("2", "Expenses:Utilities:Water"),
                account("3", "Expenses:Rent"),
            ],
            &[purchase("1", 120.0), purchase("2", 30.0), purchase("3", 1000.0)],
        );

        assert_eq!(tree.find("Expenses:Utilities").unwrap().amount, 150.0);
        assert_eq!(tree.find("Expenses").unwrap().amount, 1150.0);
        assert_eq!(tree.total(), 1150.0);
    }

    #[test]
    fn test_zero_leaf_is_pruned_but_parent_with_nonzero_child_kept() {
        let tree = aggregate(
            &[
                account("1", "Expenses:Utilities:Electric"),
                account("2", "Expenses:Utilities:Water"),
                account("3", "Expenses:Parking"),
            ],
            &[purchase("1", 80.0)],
        );

        assert!(tree.find("Expenses:Utilities:Water").is_none());
        assert!(tree.find("Expenses:Parking").is_none());

        let utilities = tree.find("Expenses:Utilities").unwrap();
        assert_eq!(utilities.own_amount, 0.0);
        assert_eq!(utilities.amount, 80.0);
        assert_eq!(utilities.children.len(), 1);
    }

    #[test]
    fn test_sub_cent_leaf_pruned_but_kept_in_rollup() {
        let tree = aggregate(
            &[account("1", "Expenses:A"), account("2", "Expenses:B")],
            &[purchase("1", 100.0), purchase("2", 0.004)],
        );

        assert!(tree.find("Expenses:B").is_none());
        let parent = tree.find("Expenses").unwrap();
        assert_eq!(parent.children.len(), 1);
        assert!((parent.amount - 100.004).abs() < 1e-9);
        let visible: f64 = tree.children(tree.roots[0]).map(|c| c.amount).sum();
        assert!((parent.amount - visible).abs() < crate::utils::ZERO_EPSILON);
    }

    #[test]
    fn test_parent_with_offsetting_children_is_kept() {
        let tree = aggregate(
            &[account("1", "Expenses:A"), account("2", "Expenses:B")],
            &[purchase("1", 100.0), purchase("2", -100.0)],
        );

        let parent = tree.find("Expenses").unwrap();
        assert_eq!(parent.amount, 0.0);
        assert_eq!(parent.children.len(), 2);
    }

    #[test]
    fn test_whole_empty_branch_is_pruned() {
        let tree = aggregate(&[account("1", "Expenses:Unused:Deep")], &[]);
        assert!(tree.is_empty());
        assert!(tree.roots.is_empty());
    }

    #[test]
    fn test_children_sorted_case_insensitively() {
        let tree = aggregate(
            &[
                account("1", "Expenses:utilities"),
                account("2", "Expenses:Advertising"),
                account("3", "Expenses:bank fees"),
            ],
            &[purchase("1", 1.0), purchase("2", 1.0), purchase("3", 1.0)],
        );

        let root = tree.roots[0];
        let names: Vec<&str> = tree.children(root).map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Advertising", "bank fees", "utilities"]);
    }

    #[test]
    fn test_compaction_follows_presentation_order() {
        let tree = aggregate(
            &[account("1", "Zeta"), account("2", "Alpha:Beta")],
            &[purchase("1", 1.0), purchase("2", 2.0)],
        );

        let paths: Vec<&str> = tree.nodes.iter().map(|n| n.full_path.as_str()).collect();
        assert_eq!(paths, vec!["Alpha", "Alpha:Beta", "Zeta"]);
        assert_eq!(tree.pre_order(), vec![0, 1, 2]);
    }

    #[test]
    fn test_non_finite_total_fails_section() {
        let chart = ChartOfAccounts::from_accounts(&[account("1", "Expenses:Rent")]);
        let classification = crate::classifier::Classification::default();
        let mut raw = AccountTreeBuilder::new(ReportSection::OperatingExpenses, &classification)
            .build(chart.section(ReportSection::OperatingExpenses));
        raw.nodes[1].own_amount = f64::INFINITY;

        let result = AggregationEngine::aggregate(raw);
        assert!(matches!(result, Err(EngineError::NonFiniteTotal { .. })));
    }

    #[test]
    fn test_pnl_summary_math() {
        let mut totals = BTreeMap::new();
        totals.insert(ReportSection::Income, 100_000.0);
        totals.insert(ReportSection::CostOfGoodsSold, 20_000.0);
        totals.insert(ReportSection::OperatingExpenses, 50_000.0);
        totals.insert(ReportSection::OtherIncome, 2_000.0);
        totals.insert(ReportSection::OtherExpenses, 7_000.0);

        let summary = PnlSummary::from_section_totals(&totals);
        assert_eq!(summary.gross_profit, 80_000.0);
        assert_eq!(summary.operating_income, 30_000.0);
        assert_eq!(summary.net_income, 25_000.0);
    }

    #[test]
    fn test_pnl_summary_missing_sections() {
        let mut totals = BTreeMap::new();
        totals.insert(ReportSection::Income, 500.0);
        let summary = PnlSummary::from_section_totals(&totals);
        assert_eq!(summary.net_income, 500.0);
        assert_eq!(summary.cost_of_goods_sold, 0.0);
    }
}
