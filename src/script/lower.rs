// Turns a parsed script into a Track: predicate functions become Rules,
// the sample lines of every playing loop become slot definitions.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};

use super::parser::{Expr, Stmt, StmtKind};
use crate::pattern::predicate::{Condition, Outcome, Predicate, Rule};
use crate::pattern::preset::SamplePreset;
use crate::pattern::step_expr::{self, ArithOp, CmpOp, Num, StepExpr};
use crate::pattern::track::{SampleSource, SlotDef, Track};
use crate::shared::SlotId;

// host default when a script never calls use_bpm
const DEFAULT_BPM: f64 = 60.0;

pub fn lower(stmts: &[Stmt], fallback_name: &str) -> anyhow::Result<Track> {
    let mut env = Env::default();
    let mut loops = Vec::new();

    for stmt in stmts {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::LiveLoop { name, body } => loops.push((name, body, line)),
            StmtKind::Define { name, param, body } => {
                let rule = FnLowering { param: param.as_deref() }
                    .block(&body.iter().collect::<Vec<_>>())
                    .with_context(|| format!("in :{name} (line {line})"))?;
                let predicate = Predicate::new(rule);
                let sentinels = predicate.sentinels();
                if !sentinels.is_empty() {
                    log::warn!(
                        target: "downbeat::script",
                        ":{name} can return integer {sentinels:?} instead of a boolean; treating it as truthy (likely a generator artifact)"
                    );
                }
                env.functions.insert(name.clone(), predicate);
            }
            StmtKind::Assign { name, value } => env
                .assign(name, value)
                .with_context(|| format!("line {line}"))?,
            StmtKind::Command { name, args, .. } => env
                .command(name, args)
                .with_context(|| format!("line {line}"))?,
            _ => log::warn!(target: "downbeat::script", "line {line}: ignoring top-level statement"),
        }
    }

    let playing: Vec<_> = loops
        .into_iter()
        .filter(|(name, body, _)| {
            let plays = body.iter().any(|s| sample_line(s).is_some());
            if !plays {
                log::debug!(target: "downbeat::script", "live_loop :{name} plays nothing, skipping");
            }
            plays
        })
        .collect();
    let Some(&(first_name, _, _)) = playing.first() else {
        bail!("script has no live_loop that plays samples");
    };

    let mut samples_dir = None;
    let mut clock: Option<(u32, f64)> = None;
    let mut slots = Vec::new();
    for (loop_name, body, line) in playing {
        let (count, time) = env
            .lower_loop(body, &mut samples_dir, &mut slots)
            .with_context(|| format!("in live_loop :{loop_name} (line {line})"))?;
        match clock {
            None => clock = Some((count, time)),
            // every loop shares the one step counter
            Some(first) if first != (count, time) => log::warn!(
                target: "downbeat::script",
                "line {line}: :{loop_name} steps {count} x {time} beats, following :{first_name} ({} x {} beats)",
                first.0,
                first.1
            ),
            Some(_) => {}
        }
    }
    number_builtins(&mut slots)?;

    let (downbeat_count, downbeat_time) = clock.unwrap_or_default();
    Ok(Track {
        name: if fallback_name.is_empty() { first_name.clone() } else { fallback_name.to_string() },
        samples_dir: PathBuf::from(samples_dir.unwrap_or_default()),
        bpm: env.bpm.unwrap_or(DEFAULT_BPM) as f32,
        downbeat_count,
        downbeat_time: downbeat_time as f32,
        slots,
    })
}

// bundled samples have no folder index, so they take the ids after the
// highest folder slot in the order they were written
fn number_builtins(slots: &mut [SlotDef]) -> anyhow::Result<()> {
    let base = slots
        .iter()
        .filter(|def| def.source == SampleSource::Folder)
        .map(|def| u32::from(def.slot.0) + 1)
        .max()
        .unwrap_or(0);
    let builtins = slots.iter_mut().filter(|def| def.builtin_name().is_some());
    for (i, def) in builtins.enumerate() {
        let id = u32::try_from(i).ok().and_then(|i| u16::try_from(base + i).ok());
        def.slot = SlotId(id.ok_or_else(|| anyhow!("too many samples to number {}", def.label))?);
    }
    Ok(())
}

// `sample ...` optionally wrapped in a trailing `if`
fn sample_line(stmt: &Stmt) -> Option<(&[Expr], &[(String, Expr)], Option<&Expr>)> {
    match &stmt.kind {
        StmtKind::Command { name, args, opts } if name == "sample" => {
            Some((args.as_slice(), opts.as_slice(), None))
        }
        StmtKind::If { arms, otherwise } if arms.len() == 1 && otherwise.is_empty() => {
            let (cond, body) = &arms[0];
            match body.as_slice() {
                [Stmt { kind: StmtKind::Command { name, args, opts }, .. }] if name == "sample" => {
                    Some((args.as_slice(), opts.as_slice(), Some(cond)))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[derive(Default)]
struct Env {
    strings: HashMap<String, String>,
    numbers: HashMap<String, f64>,
    ranges: HashMap<String, u32>,
    settings: HashMap<String, f64>,
    bpm: Option<f64>,
    functions: HashMap<String, Predicate>,
}

impl Env {
    fn assign(&mut self, name: &str, value: &Expr) -> anyhow::Result<()> {
        match value {
            Expr::Str(s) => {
                self.strings.insert(name.to_string(), s.clone());
            }
            Expr::Call { name: func, args } if func == "range" => {
                let bounds: Vec<f64> = args.iter().map(|a| self.number(a)).collect::<anyhow::Result<_>>()?;
                let (start, end, step) = match bounds.as_slice() {
                    [start, end] => (*start, *end, 1.0),
                    [start, end, step] => (*start, *end, *step),
                    _ => bail!("range takes two or three arguments"),
                };
                if start != 0.0 || step != 1.0 || end < 1.0 {
                    bail!("only range(0, n, 1) is supported for `{name}`");
                }
                self.ranges.insert(name.to_string(), end as u32);
            }
            other => match self.number(other) {
                Ok(v) => {
                    self.numbers.insert(name.to_string(), v);
                }
                Err(_) => log::debug!(target: "downbeat::script", "ignoring assignment to {name}"),
            },
        }
        Ok(())
    }

    fn command(&mut self, name: &str, args: &[Expr]) -> anyhow::Result<()> {
        match (name, args) {
            ("use_bpm", [bpm]) => self.bpm = Some(self.number(bpm)?),
            ("set", [Expr::Symbol(key), value]) => {
                let v = self.number(value)?;
                self.settings.insert(key.clone(), v);
            }
            _ => log::warn!(target: "downbeat::script", "ignoring `{name}`"),
        }
        Ok(())
    }

    fn number(&self, e: &Expr) -> anyhow::Result<f64> {
        Ok(match e {
            Expr::Int(v) => *v as f64,
            Expr::Float(v) => *v,
            Expr::Var(name) => *self
                .numbers
                .get(name)
                .ok_or_else(|| anyhow!("`{name}` is not a number"))?,
            Expr::Index { recv, key } => match (&**recv, &**key) {
                (Expr::Var(get), Expr::Symbol(k)) if get == "get" => *self
                    .settings
                    .get(k)
                    .ok_or_else(|| anyhow!(":{k} was never set"))?,
                _ => bail!("unsupported lookup {e:?}"),
            },
            Expr::Unary { op: "-", expr } => -self.number(expr)?,
            Expr::Binary { op, lhs, rhs } => {
                let (a, b) = (self.number(lhs)?, self.number(rhs)?);
                match *op {
                    "+" => a + b,
                    "-" => a - b,
                    "*" => a * b,
                    "/" if b != 0.0 => a / b,
                    "**" => a.powf(b),
                    _ => bail!("unsupported numeric expression {e:?}"),
                }
            }
            _ => bail!("expected a number, found {e:?}"),
        })
    }

    // Appends the loop's samples to `slots` and returns its step count and
    // beats per step.
    fn lower_loop(
        &self,
        body: &[Stmt],
        samples_dir: &mut Option<String>,
        slots: &mut Vec<SlotDef>,
    ) -> anyhow::Result<(u32, f64)> {
        let mut tick: Option<(&str, u32)> = None;
        let mut downbeat_time = None;

        for stmt in body {
            let line = stmt.line;
            if let Some((args, opts, guard)) = sample_line(stmt) {
                let (dir, def) = self
                    .sample(args, opts, guard, tick)
                    .with_context(|| format!("line {line}"))?;
                if let Some(dir) = dir {
                    match samples_dir.as_deref() {
                        None => *samples_dir = Some(dir),
                        Some(existing) if existing != dir => log::warn!(
                            target: "downbeat::script",
                            "line {line}: samples from {dir} will be looked up in {existing}"
                        ),
                        Some(_) => {}
                    }
                }
                slots.push(def);
                continue;
            }
            match &stmt.kind {
                StmtKind::Assign { name, value: Expr::Method { recv, name: method, .. } } if method == "tick" => {
                    let Expr::Var(range) = &**recv else {
                        bail!("line {line}: can only tick a named range");
                    };
                    let len = *self
                        .ranges
                        .get(range)
                        .ok_or_else(|| anyhow!("line {line}: `{range}` is not a range"))?;
                    tick = Some((name.as_str(), len));
                }
                StmtKind::Command { name, args, .. } if name == "sleep" => {
                    let [beats] = args.as_slice() else {
                        bail!("line {line}: sleep takes one argument");
                    };
                    downbeat_time = Some(self.number(beats).with_context(|| format!("line {line}"))?);
                }
                _ => log::warn!(target: "downbeat::script", "line {line}: ignoring statement in live_loop"),
            }
        }

        let (_, downbeat_count) = tick.ok_or_else(|| anyhow!("loop never ticks a range"))?;
        let downbeat_time = downbeat_time.ok_or_else(|| anyhow!("loop never sleeps"))?;
        Ok((downbeat_count, downbeat_time))
    }

    // The folder a sample comes from (None for a bundled one) and its slot.
    // Bundled samples get their slot id once every loop has been read.
    fn sample(
        &self,
        args: &[Expr],
        opts: &[(String, Expr)],
        guard: Option<&Expr>,
        tick: Option<(&str, u32)>,
    ) -> anyhow::Result<(Option<String>, SlotDef)> {
        let (dir, source, slot) = match args {
            [dir, slot] => {
                let dir = match dir {
                    Expr::Str(s) => s.clone(),
                    Expr::Var(v) => self
                        .strings
                        .get(v)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown sample folder `{v}`"))?,
                    other => bail!("unsupported sample folder {other:?}"),
                };
                let slot = match slot {
                    Expr::Int(n) => u16::try_from(*n).map_err(|_| anyhow!("bad sample index {n}"))?,
                    other => bail!("sample index must be an integer, found {other:?}"),
                };
                (Some(dir), SampleSource::Folder, SlotId(slot))
            }
            [Expr::Symbol(name)] => (None, SampleSource::Builtin(name.clone()), SlotId(0)),
            [Expr::Var(name)] if !self.strings.contains_key(name) => {
                (None, SampleSource::Builtin(name.clone()), SlotId(0))
            }
            _ => bail!("expected `sample <folder>, <index>` or `sample <name>`"),
        };
        let what = match &source {
            SampleSource::Builtin(name) => format!(":{name}"),
            SampleSource::Folder => format!("sample {slot}"),
        };

        let mut values = Vec::with_capacity(opts.len());
        for (key, value) in opts {
            let v = self.number(value).with_context(|| format!("option {key}"))?;
            values.push((key.as_str(), v as f32));
        }
        let (preset, unknown) = SamplePreset::from_options(values);
        for key in unknown {
            log::warn!(target: "downbeat::script", "{what}: ignoring option {key}");
        }

        let (label, predicate) = match guard {
            None => (None, Predicate::always()),
            Some(Expr::Call { name, args }) => {
                match (args.as_slice(), tick) {
                    ([Expr::Var(arg)], Some((idx, _))) if arg == idx => {}
                    _ => bail!("guard {name}(..) must be called with the ticked index"),
                }
                let predicate = match self.functions.get(name) {
                    Some(p) => p.clone(),
                    None => {
                        log::warn!(
                            target: "downbeat::script",
                            "{what} is guarded by undefined :{name}; it will never play"
                        );
                        Predicate::never()
                    }
                };
                (Some(name.clone()), predicate)
            }
            Some(cond) => {
                let param = tick.map(|(idx, _)| idx);
                let rule = FnLowering { param }.value(cond)?;
                (None, Predicate::new(rule))
            }
        };
        let mut def = match source {
            SampleSource::Folder => SlotDef::new(slot, predicate, preset),
            SampleSource::Builtin(name) => SlotDef::builtin(slot, &name, predicate, preset),
        };
        if let Some(label) = label {
            def.label = label;
        }
        Ok((dir, def))
    }
}

// ── Predicate bodies ──────────────────────────────────────────────

// integer view of an expression in terms of the step `x`
#[derive(Clone, Copy, Debug, PartialEq)]
enum Term {
    Const(i64),
    Step(i64),                              // x + offset
    Residue { offset: i64, modulus: i64 },  // (x + offset) % modulus
}

struct FnLowering<'a> {
    param: Option<&'a str>,
}

impl FnLowering<'_> {
    fn block(&self, stmts: &[&Stmt]) -> anyhow::Result<Rule> {
        let Some((first, rest)) = stmts.split_first() else {
            return Ok(Rule::Return(Outcome::Nil));
        };
        let line = first.line;
        let rule = match &first.kind {
            StmtKind::Return(None) => Ok(Rule::Return(Outcome::Nil)),
            StmtKind::Return(Some(e)) => self.value(e),
            StmtKind::If { arms, otherwise } => {
                let mut rule = self.block(&chain(otherwise, rest))?;
                for (cond, body) in arms.iter().rev() {
                    let taken = self.block(&chain(body, rest))?;
                    rule = match self.condition(cond).with_context(|| format!("line {line}"))? {
                        Condition::Const(true) => taken,
                        Condition::Const(false) => rule,
                        when => Rule::test(when, taken, rule),
                    };
                }
                Ok(rule)
            }
            StmtKind::Assign { name, value } if Some(name.as_str()) == self.param => {
                let shift = match self.arith(value) {
                    Ok(Term::Step(offset)) => -offset,
                    _ => bail!("line {line}: `{name}` can only be shifted by a constant"),
                };
                Ok(Rule::rebase(shift, self.block(rest)?))
            }
            StmtKind::Assign { name, .. } => bail!("line {line}: local variable `{name}` is not supported"),
            StmtKind::Expr(e) if rest.is_empty() => self.value(e),
            // no side effects to keep
            StmtKind::Expr(_) | StmtKind::Command { .. } if !rest.is_empty() => self.block(rest),
            StmtKind::Command { .. } => Ok(Rule::Return(Outcome::Nil)),
            _ => bail!("line {line}: unsupported statement in predicate"),
        };
        rule.with_context(|| format!("line {line}"))
    }

    // what returning `e` produces
    fn value(&self, e: &Expr) -> anyhow::Result<Rule> {
        match e {
            Expr::Bool(b) => return Ok(Rule::Return(Outcome::from(*b))),
            Expr::Nil => return Ok(Rule::Return(Outcome::Nil)),
            _ => {}
        }
        if let Ok(Term::Const(n)) = self.arith(e) {
            return Ok(Rule::Return(Outcome::Sentinel(n)));
        }
        Ok(match self.condition(e)? {
            Condition::Const(b) => Rule::Return(Outcome::from(b)),
            when => Rule::test(when, Rule::Return(Outcome::True), Rule::Return(Outcome::False)),
        })
    }

    fn condition(&self, e: &Expr) -> anyhow::Result<Condition> {
        Ok(match e {
            Expr::Bool(b) => Condition::Const(*b),
            Expr::Nil => Condition::Const(false),
            // everything else that isn't false or nil is truthy
            Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Symbol(_) => Condition::Const(true),
            Expr::Var(v) if Some(v.as_str()) == self.param => Condition::Const(true),
            Expr::Var(v) => bail!("unknown variable `{v}`"),
            Expr::Unary { op: "!", expr } => negate(self.condition(expr)?),
            Expr::Binary { op: "||", lhs, rhs } => any(self.condition(lhs)?, self.condition(rhs)?),
            Expr::Binary { op: "&&", lhs, rhs } => all(self.condition(lhs)?, self.condition(rhs)?),
            Expr::Binary { op: op @ ("==" | "!="), lhs, rhs } => {
                let eq = self.equality(lhs, rhs)?;
                if *op == "!=" { negate(eq) } else { eq }
            }
            Expr::Binary { op: op @ ("<" | "<=" | ">" | ">="), lhs, rhs } => self.ordering(op, lhs, rhs)?,
            Expr::Method { recv, name, args } if args.is_empty() => self.method(recv, name)?,
            // numbers are truthy, an integer division by zero has no value
            Expr::Binary { .. } | Expr::Unary { .. } => match self.step_expr(e)? {
                StepExpr::Const(_) => Condition::Const(true),
                expr if expr.uses_step() => Condition::Const(true),
                _ => Condition::Const(false),
            },
            _ => bail!("unsupported condition {e:?}"),
        })
    }

    fn equality(&self, lhs: &Expr, rhs: &Expr) -> anyhow::Result<Condition> {
        if let (Ok(l), Ok(r)) = (self.arith(lhs), self.arith(rhs)) {
            if let Some(eq) = term_equality(l, r) {
                return Ok(eq);
            }
        }
        // `(x % 2 == 0) == false`
        if is_boolean(lhs) || is_boolean(rhs) {
            let (l, r) = (self.condition(lhs)?, self.condition(rhs)?);
            return Ok(if is_boolean(lhs) && is_boolean(rhs) {
                iff(l, r)
            } else {
                // true and false only equal themselves
                Condition::Const(false)
            });
        }
        match (self.step_expr(lhs), self.step_expr(rhs)) {
            (Ok(l), Ok(r)) => Ok(compare(CmpOp::Eq, l, r)),
            _ if is_literal(lhs) && is_literal(rhs) => Ok(Condition::Const(lhs == rhs)),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    fn ordering(&self, op: &str, lhs: &Expr, rhs: &Expr) -> anyhow::Result<Condition> {
        if let (Ok(l), Ok(r)) = (self.arith(lhs), self.arith(rhs)) {
            if let Some(ord) = term_ordering(op, l, r) {
                return Ok(ord);
            }
        }
        let cmp = CmpOp::from_symbol(op).ok_or_else(|| anyhow!("unsupported ordering with `{op}`"))?;
        Ok(compare(cmp, self.step_expr(lhs)?, self.step_expr(rhs)?))
    }

    fn method(&self, recv: &Expr, name: &str) -> anyhow::Result<Condition> {
        let fast = match (self.arith(recv), name) {
            (Ok(Term::Step(c)), "even?") => Some(Condition::congruent(c, 2)),
            (Ok(Term::Step(c)), "odd?") => Some(Condition::congruent(c + 1, 2)),
            (Ok(Term::Step(c)), "zero?") => Some(Condition::Equals(-c)),
            (Ok(Term::Step(c)), "positive?") => Some(Condition::Above(-c)),
            (Ok(Term::Step(c)), "negative?") => Some(Condition::Below(-c)),
            _ => None,
        };
        if let Some(cond) = fast {
            return Ok(cond);
        }
        let e = self.step_expr(recv)?;
        let int = |n| StepExpr::Const(Num::Int(n));
        let (op, lhs, rhs) = match name {
            "even?" => (CmpOp::Eq, StepExpr::binary(ArithOp::Rem, e, int(2)), int(0)),
            "odd?" => (CmpOp::Eq, StepExpr::binary(ArithOp::Rem, e, int(2)), int(1)),
            "zero?" => (CmpOp::Eq, e, int(0)),
            "positive?" => (CmpOp::Gt, e, int(0)),
            "negative?" => (CmpOp::Lt, e, int(0)),
            _ => bail!("unsupported method `{name}`"),
        };
        Ok(compare(op, lhs, rhs))
    }

    // any arithmetic on the step, constants folded
    fn step_expr(&self, e: &Expr) -> anyhow::Result<StepExpr> {
        let expr = match e {
            Expr::Int(n) => StepExpr::Const(Num::Int(*n)),
            Expr::Float(f) => StepExpr::Const(Num::Float(*f)),
            Expr::Var(v) if Some(v.as_str()) == self.param => StepExpr::Step,
            Expr::Unary { op: "-", expr } => StepExpr::Neg(Box::new(self.step_expr(expr)?)),
            Expr::Binary { op, lhs, rhs } => {
                let op = ArithOp::from_symbol(op).ok_or_else(|| anyhow!("`{op}` is not arithmetic"))?;
                StepExpr::binary(op, self.step_expr(lhs)?, self.step_expr(rhs)?)
            }
            _ => bail!("not a numeric expression: {e:?}"),
        };
        Ok(match expr.eval(0) {
            Some(n) if !expr.uses_step() => StepExpr::Const(n),
            _ => expr,
        })
    }

    fn arith(&self, e: &Expr) -> anyhow::Result<Term> {
        let overflow = || anyhow!("integer overflow in {e:?}");
        Ok(match e {
            Expr::Int(n) => Term::Const(*n),
            Expr::Var(v) if Some(v.as_str()) == self.param => Term::Step(0),
            Expr::Unary { op: "-", expr } => match self.arith(expr)? {
                Term::Const(n) => Term::Const(n.checked_neg().ok_or_else(overflow)?),
                _ => bail!("cannot negate the step"),
            },
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.arith(lhs)?, self.arith(rhs)?);
                match (*op, l, r) {
                    ("+", Term::Const(a), Term::Const(b)) => Term::Const(a.checked_add(b).ok_or_else(overflow)?),
                    ("+", Term::Step(c), Term::Const(k)) | ("+", Term::Const(k), Term::Step(c)) => {
                        Term::Step(c.checked_add(k).ok_or_else(overflow)?)
                    }
                    ("-", Term::Const(a), Term::Const(b)) => Term::Const(a.checked_sub(b).ok_or_else(overflow)?),
                    ("-", Term::Step(c), Term::Const(k)) => Term::Step(c.checked_sub(k).ok_or_else(overflow)?),
                    ("*", Term::Const(a), Term::Const(b)) => Term::Const(a.checked_mul(b).ok_or_else(overflow)?),
                    ("/", Term::Const(a), Term::Const(b)) if b != 0 => {
                        Term::Const(step_expr::floor_div(a, b).ok_or_else(overflow)?)
                    }
                    ("%", Term::Const(a), Term::Const(b)) if b != 0 => {
                        let q = step_expr::floor_div(a, b).ok_or_else(overflow)?;
                        Term::Const(a - b * q)
                    }
                    ("%", Term::Step(c), Term::Const(m)) if m > 0 => Term::Residue { offset: c, modulus: m },
                    ("**", Term::Const(a), Term::Const(b)) if b >= 0 => {
                        let exp = u32::try_from(b).map_err(|_| overflow())?;
                        Term::Const(a.checked_pow(exp).ok_or_else(overflow)?)
                    }
                    _ => bail!("`{op}` does not reduce to a shifted step"),
                }
            }
            _ => bail!("not an integer expression: {e:?}"),
        })
    }
}

fn term_equality(l: Term, r: Term) -> Option<Condition> {
    // keep constants on the right
    let (l, r) = match (l, r) {
        (Term::Const(_), other) if !matches!(other, Term::Const(_)) => (other, l),
        pair => pair,
    };
    Some(match (l, r) {
        (Term::Const(a), Term::Const(b)) => Condition::Const(a == b),
        (Term::Step(c), Term::Const(k)) => Condition::Equals(k.checked_sub(c)?),
        (Term::Step(a), Term::Step(b)) => Condition::Const(a == b),
        // the floored residue lives in 0..modulus
        (Term::Residue { offset, modulus }, Term::Const(r)) => {
            if (0..modulus).contains(&r) {
                Condition::congruent(offset.checked_sub(r)?, modulus)
            } else {
                Condition::Const(false)
            }
        }
        _ => return None,
    })
}

fn term_ordering(op: &str, l: Term, r: Term) -> Option<Condition> {
    let cmp = |a: i64, b: i64| match op {
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        _ => a >= b,
    };
    Some(match (l, r) {
        (Term::Const(a), Term::Const(b)) => Condition::Const(cmp(a, b)),
        (Term::Step(a), Term::Step(b)) => Condition::Const(cmp(a, b)),
        // x + c OP k  =>  x OP k - c
        (Term::Step(c), Term::Const(k)) => {
            let n = k.checked_sub(c)?;
            match op {
                "<" => Condition::Below(n),
                "<=" => Condition::AtMost(n),
                ">" => Condition::Above(n),
                _ => Condition::AtLeast(n),
            }
        }
        // k OP x + c  =>  x (flipped OP) k - c
        (Term::Const(k), Term::Step(c)) => {
            let n = k.checked_sub(c)?;
            match op {
                "<" => Condition::Above(n),
                "<=" => Condition::AtLeast(n),
                ">" => Condition::Below(n),
                _ => Condition::AtMost(n),
            }
        }
        _ => return None,
    })
}

fn compare(op: CmpOp, lhs: StepExpr, rhs: StepExpr) -> Condition {
    if lhs.uses_step() || rhs.uses_step() {
        return Condition::Compare { op, lhs, rhs };
    }
    match (lhs.eval(0), rhs.eval(0)) {
        (Some(a), Some(b)) => Condition::Const(op.holds(a, b)),
        _ => Condition::Const(false),
    }
}

fn chain<'a>(first: &'a [Stmt], rest: &[&'a Stmt]) -> Vec<&'a Stmt> {
    first.iter().chain(rest.iter().copied()).collect()
}

fn is_literal(e: &Expr) -> bool {
    matches!(e, Expr::Bool(_) | Expr::Nil | Expr::Str(_) | Expr::Symbol(_) | Expr::Int(_) | Expr::Float(_))
}

// expressions that can only produce true or false
fn is_boolean(e: &Expr) -> bool {
    match e {
        Expr::Bool(_) => true,
        Expr::Unary { op: "!", .. } => true,
        Expr::Binary { op, .. } => matches!(*op, "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||"),
        Expr::Method { name, .. } => name.ends_with('?'),
        _ => false,
    }
}

fn negate(c: Condition) -> Condition {
    match c {
        Condition::Const(b) => Condition::Const(!b),
        Condition::Not(inner) => *inner,
        other => Condition::Not(Box::new(other)),
    }
}

fn iff(a: Condition, b: Condition) -> Condition {
    match (a, b) {
        (Condition::Const(p), Condition::Const(q)) => Condition::Const(p == q),
        (Condition::Const(true), c) | (c, Condition::Const(true)) => c,
        (Condition::Const(false), c) | (c, Condition::Const(false)) => negate(c),
        (a, b) => any(all(a.clone(), b.clone()), all(negate(a), negate(b))),
    }
}

fn any(a: Condition, b: Condition) -> Condition {
    let mut terms = Vec::new();
    for c in [a, b] {
        match c {
            Condition::Const(true) => return Condition::Const(true),
            Condition::Const(false) => {}
            Condition::Any(inner) => terms.extend(inner),
            other => terms.push(other),
        }
    }
    match terms.len() {
        0 => Condition::Const(false),
        1 => terms.remove(0),
        _ => Condition::Any(terms),
    }
}

fn all(a: Condition, b: Condition) -> Condition {
    let mut terms = Vec::new();
    for c in [a, b] {
        match c {
            Condition::Const(false) => return Condition::Const(false),
            Condition::Const(true) => {}
            Condition::All(inner) => terms.extend(inner),
            other => terms.push(other),
        }
    }
    match terms.len() {
        0 => Condition::Const(true),
        1 => terms.remove(0),
        _ => Condition::All(terms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse;

    const TRACK: &str = r#"samps = 'C:\Users\me\bad_parenting_funk\samples'
use_bpm 59
downbeat_count = range(0, 51, 1)
set :downbeat_time, 1.7
define :sleep_sample_0 do |x|
	if x < 27
		if ((x + 1) % 8 == 0 || (x + 10) % 17 == 0)
			return true
		else 
			if true
				return false
			else 
				return 0
			end
		end
	else 
		x = (x - 51)
		return false
	end
end
define :sleep_sample_6 do |x|
	if x < 27
		if ((x + 2) % 4 == 0 || (x + 1) % 4 == 0)
			return false
		else 
			return 1
		end
	else 
		x = (x - 51)
		if ((x + 4) % 7 == 0)
			return true
		else 
			return false
		end
	end
end
live_loop :extracted_samples do
	idx = downbeat_count.tick()
	sample samps, 0, start: 0.0, attack: 0.0, attack_level: 0.537, decay: 0.628 if sleep_sample_0(idx)
	sample samps, 6, attack_level: 0.426, sustain: 1.741 if sleep_sample_6(idx)
	sample samps, 8, attack_level: 0.39 if sleep_sample_8(idx)
	sleep get[:downbeat_time]
end
live_loop :sonic_pi_samples do
	idx = downbeat_count.tick()
	sleep get[:downbeat_time]
end
"#;

    fn track() -> Track {
        lower(&parse(TRACK).unwrap(), "funk").unwrap()
    }

    fn fired(def: &SlotDef, steps: std::ops::Range<i64>) -> Vec<i64> {
        steps.filter(|&s| def.predicate.evaluate(s)).collect()
    }

    #[test]
    fn header_settings() {
        let t = track();
        assert_eq!(t.name, "funk");
        assert_eq!(t.samples_dir, PathBuf::from(r"C:\Users\me\bad_parenting_funk\samples"));
        assert_eq!(t.bpm, 59.0);
        assert_eq!(t.downbeat_count, 51);
        assert_eq!(t.downbeat_time, 1.7);
        assert_eq!(t.slots.len(), 3);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn congruences_before_the_threshold() {
        let t = track();
        assert_eq!(fired(&t.slots[0], 0..27), vec![7, 15, 23, 24]);
        assert!(fired(&t.slots[0], 27..51).is_empty());
    }

    #[test]
    fn folded_branch_drops_the_sentinel() {
        let t = track();
        assert!(t.slots[0].predicate.sentinels().is_empty());
    }

    #[test]
    fn sentinel_slot_fires_on_misses() {
        let t = track();
        let six = &t.slots[1];
        assert_eq!(six.label, "sleep_sample_6");
        assert_eq!(six.predicate.sentinels(), vec![1]);
        assert_eq!(fired(six, 0..8), vec![0, 1, 4, 5]);
    }

    #[test]
    fn rebased_steps_use_floored_modulo() {
        // 33 - 51 = -18 and (-18 + 4) % 7 == 0
        let t = track();
        assert_eq!(fired(&t.slots[1], 27..51), vec![33, 40, 47]);
    }

    #[test]
    fn undefined_guard_never_fires() {
        let t = track();
        assert_eq!(t.slots[2].slot, SlotId(8));
        assert!(fired(&t.slots[2], 0..51).is_empty());
    }

    #[test]
    fn sample_options_fill_the_preset() {
        let t = track();
        assert_eq!(t.slots[0].preset.attack_level, 0.537);
        assert_eq!(t.slots[0].preset.decay, 0.628);
        assert_eq!(t.slots[1].preset.sustain, 1.741);
        // untouched keys keep their defaults
        assert_eq!(t.slots[2].preset.sustain, SamplePreset::default().sustain);
    }

    fn predicate(body: &str) -> Predicate {
        let src = format!(
            "define :p do |x|\n{body}\nend\nn = range(0, 8, 1)\nlive_loop :l do\n\ti = n.tick()\n\tsample 'kit', 0 if p(i)\n\tsleep 1\nend\n"
        );
        lower(&parse(&src).unwrap(), "t").unwrap().slots.remove(0).predicate
    }

    #[test]
    fn equality_and_ordering_terms() {
        let p = predicate("return x == 3 || 5 < x");
        assert_eq!((0..8).filter(|&s| p.evaluate(s)).collect::<Vec<_>>(), vec![3, 6, 7]);

        let p = predicate("return (x + 1) % 4 == 2");
        assert_eq!((0..8).filter(|&s| p.evaluate(s)).collect::<Vec<_>>(), vec![1, 5]);

        // a residue can never reach the modulus
        let p = predicate("return x % 4 == 4");
        assert!((0..8).all(|s| !p.evaluate(s)));
    }

    #[test]
    fn elsif_chain_and_fall_through() {
        let p = predicate("\tif x == 0\n\t\treturn true\n\telsif x.odd?\n\t\treturn false\n\tend\n\tx > 4");
        assert_eq!((0..8).filter(|&s| p.evaluate(s)).collect::<Vec<_>>(), vec![0, 6]);
    }

    #[test]
    fn empty_branch_returns_nil() {
        let p = predicate("\tif 4 % 4 == 0\n\tend");
        assert_eq!(p.rule(), &Rule::Return(Outcome::Nil));
        assert!((0..8).all(|s| !p.evaluate(s)));
    }

    #[test]
    fn constant_conditions_fold() {
        let p = predicate("\tif (true || false) && !false\n\t\treturn x % 2 == 0\n\telse\n\t\treturn 7\n\tend");
        assert!(p.sentinels().is_empty());
        assert_eq!((0..4).filter(|&s| p.evaluate(s)).collect::<Vec<_>>(), vec![0, 2]);
    }

    fn hits(p: &Predicate) -> Vec<i64> {
        (0..8).filter(|&s| p.evaluate(s)).collect()
    }

    #[test]
    fn general_step_arithmetic() {
        assert_eq!(hits(&predicate("return (x * 2) % 4 == 0")), vec![0, 2, 4, 6]);
        assert_eq!(hits(&predicate("return (x * -1) % 3 == 0")), vec![0, 3, 6]);
        assert_eq!(hits(&predicate("return ((x - (x % 4)) / 4) == 1")), vec![4, 5, 6, 7]);
        assert_eq!(hits(&predicate("return x * (2 ** 3) > 20")), vec![3, 4, 5, 6, 7]);
        // 260, 130, 65, 32.5, ...
        assert_eq!(hits(&predicate("return (260 * (0.5 ** x)) % 2 == 1")), vec![2]);
        assert_eq!(hits(&predicate("return (x * 3).odd?")), vec![1, 3, 5, 7]);
    }

    #[test]
    fn division_by_zero_never_holds() {
        assert!(hits(&predicate("return x / 0 == 0")).is_empty());
        assert!(hits(&predicate("return x % 0 == 0")).is_empty());
        assert!(hits(&predicate("return (1 / 0) < 2")).is_empty());
    }

    #[test]
    fn conditions_compared_with_booleans() {
        assert_eq!(hits(&predicate("return (x % 2 == 0) == false")), vec![1, 3, 5, 7]);
        assert_eq!(hits(&predicate("return x.even? != true")), vec![1, 3, 5, 7]);
        assert_eq!(hits(&predicate("return (x < 3) == (x > 1)")), vec![2]);
        // a boolean never equals a number
        assert!(hits(&predicate("return (x == 1) == 1")).is_empty());
    }

    const TWO_LOOPS: &str = r#"samps = 'kit'
n = range(0, 8, 1)
define :sleep_bd_haus do |x|
	return x % 4 == 0
end
live_loop :extracted_samples do
	idx = n.tick()
	sample samps, 2, sustain_level: 0.3, decay_level: 0.9
	sleep 0.5
end
live_loop :sonic_pi_samples do
	idx = n.tick()
	sample bd_haus, start: 0.0, attack: 0.0, sustain_level: 0.3 if sleep_bd_haus(idx)
	sample :drum_snare_hard
	sleep 0.5
end
"#;

    #[test]
    fn every_playing_loop_is_lowered() {
        let t = lower(&parse(TWO_LOOPS).unwrap(), "").unwrap();
        assert_eq!(t.name, "extracted_samples");
        assert_eq!(t.samples_dir, PathBuf::from("kit"));
        assert_eq!((t.downbeat_count, t.downbeat_time), (8, 0.5));
        let ids: Vec<_> = t.slots.iter().map(|d| (d.slot, d.label.as_str())).collect();
        assert_eq!(
            ids,
            vec![
                (SlotId(2), "sleep_sample_2"),
                (SlotId(3), "sleep_bd_haus"),
                (SlotId(4), "sleep_drum_snare_hard"),
            ]
        );
        assert_eq!(t.slots[1].source, SampleSource::Builtin("bd_haus".into()));
        assert_eq!(hits(&t.slots[1].predicate), vec![0, 4]);
        assert_eq!(hits(&t.slots[2].predicate).len(), 8);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn decay_level_defaults_to_sustain_level() {
        let t = lower(&parse(TWO_LOOPS).unwrap(), "").unwrap();
        assert_eq!(t.slots[0].preset.decay_level, 0.9);
        assert_eq!(t.slots[1].preset.decay_level, 0.3);
        assert_eq!(t.slots[2].preset.decay_level, SamplePreset::default().sustain_level);
    }

    #[test]
    fn bundled_samples_alone() {
        let src = "n = range(0, 4, 1)\nlive_loop :extracted_samples do\n\tidx = n.tick()\n\tsleep 1\nend\nlive_loop :sonic_pi_samples do\n\tidx = n.tick()\n\tsample bd_haus if idx.even?\n\tsleep 1\nend\n";
        let t = lower(&parse(src).unwrap(), "").unwrap();
        assert_eq!(t.name, "sonic_pi_samples");
        assert_eq!(t.samples_dir, PathBuf::new());
        assert_eq!(t.slots.len(), 1);
        assert_eq!(t.slots[0].slot, SlotId(0));
        assert_eq!(t.slots[0].builtin_name(), Some("bd_haus"));
        assert_eq!(t.slots[0].label, "sleep_bd_haus");
        assert_eq!((0..4).filter(|&s| t.slots[0].predicate.evaluate(s)).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn unsupported_scripts_are_rejected() {
        let no_loop = "define :p do |x|\n\treturn true\nend\n";
        assert!(lower(&parse(no_loop).unwrap(), "t").is_err());

        let bad_sample = "n = range(0, 8, 1)\nlive_loop :l do\n\ti = n.tick()\n\tsample 'kit'\n\tsleep 1\nend\n";
        let err = lower(&parse(bad_sample).unwrap(), "t").unwrap_err();
        assert!(format!("{err:#}").contains("sample <name>"), "{err:#}");

        let stepped = "n = range(0, 8, 2)\nlive_loop :l do\n\ti = n.tick()\n\tsample 'kit', 0\n\tsleep 1\nend\n";
        assert!(lower(&parse(stepped).unwrap(), "t").is_err());

        let local = "define :p do |x|\n\ty = 3\n\treturn y\nend\nn = range(0, 8, 1)\nlive_loop :l do\n\ti = n.tick()\n\tsample 'kit', 0 if p(i)\n\tsleep 1\nend\n";
        let err = lower(&parse(local).unwrap(), "t").unwrap_err();
        assert!(format!("{err:#}").contains("in :p"));
    }
}
