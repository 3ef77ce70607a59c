//! Arithmetic on the step value.
//!
//! Most predicate terms reduce to a congruence, but the generator also emits
//! products, quotients and powers of the step (`(x * -1) % 3`,
//! `(260 * (0.5 ** x)) % 2`). Those are kept as expressions and evaluated
//! with the host runtime's number rules: integers stay integers until a float
//! or an overflow shows up, and `/` and `%` round toward negative infinity.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }

    pub fn neg(self) -> Num {
        match self {
            Num::Int(n) => n.checked_neg().map_or(Num::Float(-(n as f64)), Num::Int),
            Num::Float(f) => Num::Float(-f),
        }
    }

    // 1 == 1.0 holds; NaN compares as nothing
    pub fn compare(self, other: Num) -> Option<Ordering> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl ArithOp {
    pub fn from_symbol(op: &str) -> Option<Self> {
        Some(match op {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            "*" => ArithOp::Mul,
            "/" => ArithOp::Div,
            "%" => ArithOp::Rem,
            "**" => ArithOp::Pow,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::Pow => "**",
        }
    }

    /// None where the host would raise, which is integer division by zero.
    pub fn apply(self, a: Num, b: Num) -> Option<Num> {
        if let (Num::Int(x), Num::Int(y)) = (a, b) {
            let exact = match self {
                ArithOp::Add => x.checked_add(y),
                ArithOp::Sub => x.checked_sub(y),
                ArithOp::Mul => x.checked_mul(y),
                ArithOp::Div if y == 0 => return None,
                ArithOp::Rem if y == 0 => return None,
                ArithOp::Div => floor_div(x, y),
                ArithOp::Rem => floor_div(x, y).and_then(|q| y.checked_mul(q)).and_then(|p| x.checked_sub(p)),
                // a negative exponent gives a fraction, which only a float can hold here
                ArithOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
            };
            if let Some(n) = exact {
                return Some(Num::Int(n));
            }
        }
        let (x, y) = (a.as_f64(), b.as_f64());
        Some(Num::Float(match self {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Rem => x - y * (x / y).floor(),
            ArithOp::Pow => x.powf(y),
        }))
    }
}

/// Rounds toward negative infinity like the host runtime.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    Some(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExpr {
    Step,
    Const(Num),
    Neg(Box<StepExpr>),
    Binary {
        op: ArithOp,
        lhs: Box<StepExpr>,
        rhs: Box<StepExpr>,
    },
}

impl StepExpr {
    pub fn binary(op: ArithOp, lhs: StepExpr, rhs: StepExpr) -> Self {
        StepExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn eval(&self, x: i64) -> Option<Num> {
        match self {
            StepExpr::Step => Some(Num::Int(x)),
            StepExpr::Const(n) => Some(*n),
            StepExpr::Neg(e) => e.eval(x).map(Num::neg),
            StepExpr::Binary { op, lhs, rhs } => op.apply(lhs.eval(x)?, rhs.eval(x)?),
        }
    }

    pub fn uses_step(&self) -> bool {
        match self {
            StepExpr::Step => true,
            StepExpr::Const(_) => false,
            StepExpr::Neg(e) => e.uses_step(),
            StepExpr::Binary { lhs, rhs, .. } => lhs.uses_step() || rhs.uses_step(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn from_symbol(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CmpOp::Eq,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    pub fn holds(self, a: Num, b: Num) -> bool {
        let Some(ord) = a.compare(b) else {
            return false;
        };
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }
}
