//! Step predicates.
//!
//! A predicate decides whether a slot fires on a given step. Generated tracks
//! all share one shape (split the range at a threshold, test a disjunction of
//! congruences on each side) but the scripts they come from are free-form, so
//! the stored form is a small decision tree that covers both.

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::pattern::step_expr::{CmpOp, StepExpr};

/// A test on the (possibly rebased) step value `x`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Const(bool),
    /// `(x + offset) % modulus == 0`, with floored modulo.
    Congruent { offset: i64, modulus: i64 },
    Equals(i64),
    Below(i64),   // x < n
    AtMost(i64),  // x <= n
    Above(i64),   // x > n
    AtLeast(i64), // x >= n
    /// Anything that doesn't reduce to the forms above. False where the
    /// arithmetic has no value, like an integer division by zero.
    Compare { op: CmpOp, lhs: StepExpr, rhs: StepExpr },
    Any(Vec<Condition>),
    All(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn congruent(offset: i64, modulus: i64) -> Self {
        Condition::Congruent { offset, modulus }
    }

    /// Disjunction of `(x + offset) % modulus == 0` terms, in order.
    pub fn any_of(terms: &[(i64, i64)]) -> Self {
        match terms {
            [] => Condition::Const(false),
            [(offset, modulus)] => Condition::congruent(*offset, *modulus),
            _ => Condition::Any(
                terms
                    .iter()
                    .map(|&(offset, modulus)| Condition::congruent(offset, modulus))
                    .collect(),
            ),
        }
    }

    pub fn holds(&self, x: i64) -> bool {
        match self {
            Condition::Const(b) => *b,
            // the rebased step goes negative, so the modulo has to be floored
            Condition::Congruent { offset, modulus } => {
                *modulus > 0 && x.wrapping_add(*offset).rem_euclid(*modulus) == 0
            }
            Condition::Equals(n) => x == *n,
            Condition::Below(n) => x < *n,
            Condition::AtMost(n) => x <= *n,
            Condition::Above(n) => x > *n,
            Condition::AtLeast(n) => x >= *n,
            Condition::Compare { op, lhs, rhs } => match (lhs.eval(x), rhs.eval(x)) {
                (Some(a), Some(b)) => op.holds(a, b),
                _ => false,
            },
            Condition::Any(conds) => conds.iter().any(|c| c.holds(x)),
            Condition::All(conds) => conds.iter().all(|c| c.holds(x)),
            Condition::Not(c) => !c.holds(x),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self {
            Condition::Congruent { offset, modulus } if *modulus <= 0 => {
                bail!("modulus must be positive in ({offset}, {modulus})")
            }
            Condition::Any(conds) | Condition::All(conds) => {
                conds.iter().try_for_each(Condition::validate)
            }
            Condition::Not(c) => c.validate(),
            _ => Ok(()),
        }
    }
}

/// What a predicate hands back. Generated scripts sometimes return bare
/// integers where a boolean was meant; the host runtime treats those as
/// truthy, and so do we.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    True,
    False,
    Nil,
    Sentinel(i64),
}

impl Outcome {
    pub fn is_truthy(self) -> bool {
        matches!(self, Outcome::True | Outcome::Sentinel(_))
    }
}

impl From<bool> for Outcome {
    fn from(b: bool) -> Self {
        if b { Outcome::True } else { Outcome::False }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Return(Outcome),
    Test {
        when: Condition,
        then: Box<Rule>,
        otherwise: Box<Rule>,
    },
    /// Evaluate `rule` at `x - shift`.
    Rebase { shift: i64, rule: Box<Rule> },
}

impl Rule {
    pub fn test(when: Condition, then: Rule, otherwise: Rule) -> Self {
        Rule::Test {
            when,
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn rebase(shift: i64, rule: Rule) -> Self {
        Rule::Rebase { shift, rule: Box::new(rule) }
    }

    pub fn outcome(&self, step: i64) -> Outcome {
        let mut rule = self;
        let mut x = step;
        loop {
            match rule {
                Rule::Return(outcome) => return *outcome,
                Rule::Test { when, then, otherwise } => {
                    rule = if when.holds(x) { then } else { otherwise };
                }
                Rule::Rebase { shift, rule: inner } => {
                    x = x.wrapping_sub(*shift);
                    rule = inner;
                }
            }
        }
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Rule)) {
        f(self);
        match self {
            Rule::Return(_) => {}
            Rule::Test { then, otherwise, .. } => {
                then.visit(f);
                otherwise.visit(f);
            }
            Rule::Rebase { rule, .. } => rule.visit(f),
        }
    }
}

/// One side of a split predicate: an ordered list of `(offset, modulus)`
/// pairs and whether a hit means "don't fire".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConditionSet {
    pub terms: Vec<(i64, i64)>,
    pub invert: bool,
}

impl ConditionSet {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn any(terms: &[(i64, i64)]) -> Self {
        Self { terms: terms.to_vec(), invert: false }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    fn into_rule(self) -> Rule {
        if self.terms.is_empty() {
            // nothing can hit, so only the miss side is reachable
            return Rule::Return(Outcome::from(self.invert));
        }
        Rule::test(
            Condition::any_of(&self.terms),
            Rule::Return(Outcome::from(!self.invert)),
            Rule::Return(Outcome::from(self.invert)),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate {
    rule: Rule,
}

impl Predicate {
    pub fn new(rule: Rule) -> Self {
        Self { rule }
    }

    pub fn never() -> Self {
        Self::new(Rule::Return(Outcome::False))
    }

    pub fn always() -> Self {
        Self::new(Rule::Return(Outcome::True))
    }

    /// Steps below `threshold` are tested against `before`; the rest are
    /// shifted down by `range_len` and tested against `after`.
    pub fn split(threshold: i64, range_len: i64, before: ConditionSet, after: ConditionSet) -> Self {
        Self::new(Rule::test(
            Condition::Below(threshold),
            before.into_rule(),
            Rule::rebase(range_len, after.into_rule()),
        ))
    }

    pub fn evaluate(&self, step: i64) -> bool {
        self.rule.outcome(step).is_truthy()
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    // integer returns that can actually be reached; almost always generator noise
    pub fn sentinels(&self) -> Vec<i64> {
        let mut found = Vec::new();
        self.rule.visit(&mut |r| {
            if let Rule::Return(Outcome::Sentinel(n)) = r {
                found.push(*n);
            }
        });
        found
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut result = Ok(());
        self.rule.visit(&mut |r| {
            if result.is_ok() {
                if let Rule::Test { when, .. } = r {
                    result = when.validate();
                }
            }
        });
        result
    }
}
