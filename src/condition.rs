//! The condition tree a user builds for a segment.
//!
//! A tree is always rooted at a [`Group`]. Groups combine their children with a
//! single conjunction and may be negated; leaves are [`Rule`]s comparing one field
//! against zero or more operands. The serde shape is the persisted document:
//!
//! ```text
//! {"type":"group","conjunction":"AND","not":false,"children":[
//!     {"type":"rule","field":"kota","operator":"equal","value":["Bandung"]}
//! ]}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::schema::FieldType;

/// A node of the condition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Group(Group),
    Rule(Rule),
}

/// Logical combinator of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    /// Keyword used between siblings in a compiled query
    pub fn keyword(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub conjunction: Conjunction,
    #[serde(default)]
    pub not: bool,
    #[serde(default)]
    pub children: Vec<ConditionNode>,
}

impl Group {
    pub fn new(conjunction: Conjunction, children: Vec<ConditionNode>) -> Self {
        Self { conjunction, not: false, children }
    }

    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::new(Conjunction::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::new(Conjunction::Or, children)
    }

    pub fn negated(mut self) -> Self {
        self.not = !self.not;
        self
    }

    /// True when no rule exists anywhere below this group
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|child| match child {
            ConditionNode::Group(group) => group.is_empty(),
            ConditionNode::Rule(_) => false,
        })
    }

    fn collect_fields<'a>(&'a self, fields: &mut Vec<&'a str>) {
        for child in &self.children {
            match child {
                ConditionNode::Group(group) => group.collect_fields(fields),
                ConditionNode::Rule(rule) => {
                    if !fields.contains(&rule.field.as_str()) {
                        fields.push(&rule.field);
                    }
                }
            }
        }
    }
}

/// A leaf comparison, e.g. `harga_jual > 5000`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Vec<Operand>,
}

impl Rule {
    pub fn new(field: impl Into<String>, operator: Operator, value: Vec<Operand>) -> Self {
        Self { field: field.into(), operator, value }
    }
}

impl From<Rule> for ConditionNode {
    fn from(rule: Rule) -> Self {
        ConditionNode::Rule(rule)
    }
}

impl From<Group> for ConditionNode {
    fn from(group: Group) -> Self {
        ConditionNode::Group(group)
    }
}

/// A value a rule compares against.
///
/// Dates travel as text (`2024-03-01` or `2024-03-01 08:30:00`) and are checked
/// against the field type at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Text(String),
}

impl Operand {
    /// Interprets raw user input according to the type of the field it targets
    pub fn from_input(raw: &str, field_type: FieldType) -> Self {
        match field_type {
            FieldType::Number => raw
                .parse::<f64>()
                .map(Operand::Number)
                .unwrap_or_else(|_| Operand::Text(raw.to_string())),
            _ => Operand::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// The fixed operator set of the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Between,
    NotBetween,
    SelectAnyIn,
    SelectNotAnyIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

/// How many operands an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Zero,
    One,
    Two,
    AtLeastOne,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Zero => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::AtLeastOne => count >= 1,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Arity::Zero => "no values",
            Arity::One => "exactly one value",
            Arity::Two => "exactly two values",
            Arity::AtLeastOne => "at least one value",
        };
        f.write_str(text)
    }
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::LessOrEqual,
        Operator::Greater,
        Operator::GreaterOrEqual,
        Operator::Between,
        Operator::NotBetween,
        Operator::SelectAnyIn,
        Operator::SelectNotAnyIn,
        Operator::Like,
        Operator::NotLike,
        Operator::IsNull,
        Operator::IsNotNull,
    ];

    pub fn arity(&self) -> Arity {
        match self {
            Operator::IsNull | Operator::IsNotNull => Arity::Zero,
            Operator::Between | Operator::NotBetween => Arity::Two,
            Operator::SelectAnyIn | Operator::SelectNotAnyIn => Arity::AtLeastOne,
            _ => Arity::One,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::NotEqual => "not_equal",
            Operator::Less => "less",
            Operator::LessOrEqual => "less_or_equal",
            Operator::Greater => "greater",
            Operator::GreaterOrEqual => "greater_or_equal",
            Operator::Between => "between",
            Operator::NotBetween => "not_between",
            Operator::SelectAnyIn => "select_any_in",
            Operator::SelectNotAnyIn => "select_not_any_in",
            Operator::Like => "like",
            Operator::NotLike => "not_like",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let op = match normalized.as_str() {
            "==" | "=" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterOrEqual,
            "in" => Operator::SelectAnyIn,
            "not_in" => Operator::SelectNotAnyIn,
            other => Operator::ALL
                .into_iter()
                .find(|op| op.as_str() == other)
                .ok_or_else(|| format!("unknown operator '{}'", s))?,
        };
        Ok(op)
    }
}

/// A whole filter: a root group that may be empty ("no filter").
///
/// Serialised exactly like a [`ConditionNode`]; a bare rule document is accepted
/// and wrapped into an AND group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ConditionNode", into = "ConditionNode")]
pub struct ConditionTree {
    root: Group,
}

impl ConditionTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(root: Group) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Returns a copy of this tree with `node` appended to the root group
    pub fn with_child(&self, node: impl Into<ConditionNode>) -> Self {
        let mut root = self.root.clone();
        root.children.push(node.into());
        Self { root }
    }

    /// Returns a copy of this tree with a different root conjunction
    pub fn with_conjunction(&self, conjunction: Conjunction) -> Self {
        let mut root = self.root.clone();
        root.conjunction = conjunction;
        Self { root }
    }

    /// Distinct field names referenced anywhere in the tree, in first-use order
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.root.collect_fields(&mut fields);
        fields
    }
}

impl From<ConditionNode> for ConditionTree {
    fn from(node: ConditionNode) -> Self {
        match node {
            ConditionNode::Group(root) => Self { root },
            ConditionNode::Rule(rule) => Self { root: Group::and(vec![rule.into()]) },
        }
    }
}

impl From<ConditionTree> for ConditionNode {
    fn from(tree: ConditionTree) -> Self {
        ConditionNode::Group(tree.root)
    }
}

impl From<Group> for ConditionTree {
    fn from(root: Group) -> Self {
        Self { root }
    }
}
