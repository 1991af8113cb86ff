//! Category forest for one P&L section.
//!
//! Nodes live in an arena and refer to each other by index. A `path -> index`
//! map guarantees each qualified-name prefix is created exactly once.

use crate::budget::{compute_variance, BudgetStore, Variance};
use crate::chart_of_accounts::{parse_qualified_name, ReportSection};
use crate::classifier::{Classification, ClassifiedTransaction};
use crate::schema::Account;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    pub name: String,
    pub full_path: String,
    /// Set only on nodes whose full path is an account's qualified name.
    pub account: Option<Account>,
    /// Contribution of this node's own transactions.
    pub own_amount: f64,
    /// `own_amount` plus every descendant's contribution, after rollup.
    pub amount: f64,
    pub own_budget: f64,
    pub budget_amount: f64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transactions: Vec<ClassifiedTransaction>,
    pub is_parent: bool,
    pub depth: usize,
}

impl CategoryNode {
    fn new(name: &str, full_path: String, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            name: name.to_string(),
            full_path,
            account: None,
            own_amount: 0.0,
            amount: 0.0,
            own_budget: 0.0,
            budget_amount: 0.0,
            parent,
            children: Vec::new(),
            transactions: Vec::new(),
            is_parent: false,
            depth,
        }
    }

    pub fn is_leaf_account(&self) -> bool {
        self.account.is_some()
    }

    pub fn variance(&self) -> Variance {
        compute_variance(self.budget_amount, self.amount)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTree {
    pub section: ReportSection,
    pub nodes: Vec<CategoryNode>,
    pub roots: Vec<NodeId>,
    #[serde(skip)]
    index: HashMap<String, NodeId>,
}

impl CategoryTree {
    pub fn new(section: ReportSection) -> Self {
        Self {
            section,
            nodes: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&CategoryNode> {
        self.nodes.get(id)
    }

    pub fn find(&self, full_path: &str) -> Option<&CategoryNode> {
        self.index.get(full_path).and_then(|id| self.nodes.get(*id))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &CategoryNode> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(move |node| node.children.iter().filter_map(move |c| self.nodes.get(*c)))
    }

    pub fn total(&self) -> f64 {
        self.roots
            .iter()
            .filter_map(|id| self.nodes.get(*id))
            .map(|n| n.amount)
            .sum()
    }

    pub fn budget_total(&self) -> f64 {
        self.roots
            .iter()
            .filter_map(|id| self.nodes.get(*id))
            .map(|n| n.budget_amount)
            .sum()
    }

    /// Node ids in presentation order: each node followed by its subtree.
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Node ids with every child before its parent.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = self.pre_order();
        order.reverse();
        order
    }

    /// Leaf-account amounts keyed by qualified path.
    pub fn leaf_amounts(&self) -> Vec<(String, f64)> {
        self.pre_order()
            .into_iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.is_leaf_account())
            .map(|n| (n.full_path.clone(), n.own_amount))
            .collect()
    }

    /// Finds or creates the node for `segments[..=depth]`.
    fn get_or_create(&mut self, segments: &[&str], parent: Option<NodeId>) -> NodeId {
        let full_path = segments.join(":");
        if let Some(id) = self.index.get(&full_path) {
            return *id;
        }

        let depth = segments.len() - 1;
        let name = segments.last().copied().unwrap_or_default();
        let id = self.nodes.len();
        self.nodes
            .push(CategoryNode::new(name, full_path.clone(), parent, depth));
        self.index.insert(full_path, id);

        match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent_node) => {
                parent_node.children.push(id);
                parent_node.is_parent = true;
            }
            None => self.roots.push(id),
        }
        id
    }

    /// Rebuilds the arena keeping only nodes reachable from the roots, laid
    /// out in pre-order. Indices become a pure function of the tree shape.
    pub(crate) fn compact(&mut self) {
        let order = self.pre_order();
        let remap: HashMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(new_id, old_id)| (*old_id, new_id))
            .collect();

        let mut old_nodes: Vec<Option<CategoryNode>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();

        let mut nodes = Vec::with_capacity(order.len());
        for old_id in &order {
            let Some(mut node) = old_nodes.get_mut(*old_id).and_then(Option::take) else {
                continue;
            };
            node.parent = node.parent.and_then(|p| remap.get(&p).copied());
            node.children = node
                .children
                .iter()
                .filter_map(|c| remap.get(c).copied())
                .collect();
            node.is_parent = !node.children.is_empty();
            nodes.push(node);
        }

        self.roots = self
            .roots
            .iter()
            .filter_map(|r| remap.get(r).copied())
            .collect();
        self.index = nodes
            .iter()
            .enumerate()
            .map(|(id, node)| (node.full_path.clone(), id))
            .collect();
        self.nodes = nodes;
    }
}

/// Builds the raw (un-aggregated) forest for one section.
pub struct AccountTreeBuilder<'a> {
    section: ReportSection,
    classification: &'a Classification,
    budgets: Option<(&'a BudgetStore, i32)>,
}

impl<'a> AccountTreeBuilder<'a> {
    pub fn new(section: ReportSection, classification: &'a Classification) -> Self {
        Self {
            section,
            classification,
            budgets: None,
        }
    }

    pub fn with_budgets(mut self, budgets: &'a BudgetStore, year: i32) -> Self {
        self.budgets = Some((budgets, year));
        self
    }

    fn leaf_budget(&self, account: &Account) -> f64 {
        match self.budgets {
            Some((store, year)) if store.contains(&account.id, year) => {
                store.annual_total(&account.id, year)
            }
            _ => account.budget_amount.unwrap_or(0.0),
        }
    }

    /// Accounts are expected to come from a `ChartOfAccounts`, which has
    /// already dropped malformed and colliding paths; any that slip through
    /// are skipped here.
    pub fn build(&self, accounts: &[Account]) -> CategoryTree {
        let mut tree = CategoryTree::new(self.section);

        for account in accounts {
            if ReportSection::for_account_type(account.account_type) != self.section {
                continue;
            }
            let Some(segments) = parse_qualified_name(&account.qualified_name) else {
                continue;
            };

            let mut parent = None;
            for depth in 0..segments.len() {
                parent = Some(tree.get_or_create(&segments[..=depth], parent));
            }
            let Some(leaf_id) = parent else {
                continue;
            };

            let transactions = self.classification.for_account(&account.id).to_vec();
            let budget = self.leaf_budget(account);

            if let Some(leaf) = tree.nodes.get_mut(leaf_id) {
                if leaf.account.is_some() {
                    continue;
                }
                leaf.own_amount = transactions.iter().map(|t| t.contribution).sum();
                leaf.own_budget = budget;
                leaf.amount = leaf.own_amount;
                leaf.budget_amount = budget;
                leaf.transactions = transactions;
                leaf.account = Some(account.clone());
            }
        }

        tree
    }
}
