// Writes a track back out in the layout the generator uses, so it can be
// played by the host directly or read back in.

use std::collections::HashSet;
use std::fmt::Write;

use crate::pattern::predicate::{Condition, Outcome, Rule};
use crate::pattern::preset::SamplePreset;
use crate::pattern::step_expr::{ArithOp, Num, StepExpr};
use crate::pattern::track::{SampleSource, SlotDef, Track, builtin_label, default_label};

const LOOP_NAME: &str = "extracted_samples";
const BUILTIN_LOOP_NAME: &str = "sonic_pi_samples";

pub fn render(track: &Track) -> String {
    let mut out = String::new();
    let dir = track.samples_dir.to_string_lossy();
    line(&mut out, 0, &format!("samps = '{}'", quote(&dir)));
    line(&mut out, 0, &format!("use_bpm {}", track.bpm));
    line(&mut out, 0, &format!("downbeat_count = range(0, {}, 1)", track.downbeat_count));
    line(&mut out, 0, &format!("set :downbeat_time, {}", track.downbeat_time));

    let labels = labels(track);
    for (def, label) in track.slots.iter().zip(&labels) {
        line(&mut out, 0, &format!("define :{label} do |x|"));
        rule(&mut out, 1, def.predicate.rule());
        line(&mut out, 0, "end");
    }

    // folder samples in one loop, bundled ones in the other
    for (loop_name, bundled) in [(LOOP_NAME, false), (BUILTIN_LOOP_NAME, true)] {
        line(&mut out, 0, &format!("live_loop :{loop_name} do"));
        line(&mut out, 1, "idx = downbeat_count.tick()");
        for (def, label) in track.slots.iter().zip(&labels) {
            let text = match &def.source {
                SampleSource::Folder if !bundled => format!("sample samps, {}", def.slot),
                SampleSource::Builtin(name) if bundled => format!("sample :{name}"),
                _ => continue,
            };
            line(&mut out, 1, &format!("{text}, {} if {label}(idx)", options(&def.preset)));
        }
        line(&mut out, 1, "sleep get[:downbeat_time]");
        line(&mut out, 0, "end");
    }
    out
}

// function names must be unique identifiers; fall back to the generated name
fn labels(track: &Track) -> Vec<String> {
    let mut used = HashSet::new();
    track
        .slots
        .iter()
        .enumerate()
        .map(|(i, def)| {
            let fallback = generated_label(def);
            let mut label = if is_ident(&def.label) { def.label.clone() } else { fallback.clone() };
            if used.contains(&label) {
                label = format!("{fallback}_{i}");
            }
            used.insert(label.clone());
            label
        })
        .collect()
}

fn generated_label(def: &SlotDef) -> String {
    match def.builtin_name() {
        Some(name) if is_ident(name) => builtin_label(name),
        _ => default_label(def.slot),
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn options(preset: &SamplePreset) -> String {
    SamplePreset::KEYS
        .iter()
        .filter_map(|key| preset.get(key).map(|v| format!("{key}: {v}")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(text);
    out.push('\n');
}

fn rule(out: &mut String, depth: usize, r: &Rule) {
    match r {
        Rule::Return(outcome) => line(out, depth, &format!("return {}", outcome_text(*outcome))),
        Rule::Test { when, then, otherwise } => {
            line(out, depth, &format!("if {}", condition(when)));
            rule(out, depth + 1, then);
            line(out, depth, "else");
            rule(out, depth + 1, otherwise);
            line(out, depth, "end");
        }
        // every branch ends in a return, so reassigning x can't leak
        Rule::Rebase { shift, rule: inner } => {
            line(out, depth, &format!("x = {}", shifted(-shift)));
            rule(out, depth, inner);
        }
    }
}

fn outcome_text(o: Outcome) -> String {
    match o {
        Outcome::True => "true".into(),
        Outcome::False => "false".into(),
        Outcome::Nil => "nil".into(),
        Outcome::Sentinel(n) => n.to_string(),
    }
}

// `(x + n)` / `(x - n)` / `x`
fn shifted(offset: i64) -> String {
    match offset {
        0 => "x".into(),
        n if n > 0 => format!("(x + {n})"),
        n => format!("(x - {})", n.unsigned_abs()),
    }
}

fn condition(c: &Condition) -> String {
    match c {
        Condition::Const(b) => b.to_string(),
        Condition::Congruent { offset, modulus } => format!("{} % {modulus} == 0", shifted(*offset)),
        Condition::Equals(n) => format!("x == {n}"),
        Condition::Below(n) => format!("x < {n}"),
        Condition::AtMost(n) => format!("x <= {n}"),
        Condition::Above(n) => format!("x > {n}"),
        Condition::AtLeast(n) => format!("x >= {n}"),
        Condition::Compare { op, lhs, rhs } => format!("{} {} {}", step_expr(lhs), op.symbol(), step_expr(rhs)),
        Condition::Any(terms) => join(terms, " || ", "false"),
        Condition::All(terms) => join(terms, " && ", "true"),
        Condition::Not(inner) => format!("!({})", condition(inner)),
    }
}

fn step_expr(e: &StepExpr) -> String {
    match e {
        StepExpr::Step => "x".into(),
        StepExpr::Const(n) => number(*n),
        StepExpr::Neg(inner) => format!("(-{})", step_expr(inner)),
        StepExpr::Binary { op, lhs, rhs } => {
            let base = step_expr(lhs);
            // `-2 ** x` would read back as -(2 ** x)
            let base = match **lhs {
                StepExpr::Const(n) if *op == ArithOp::Pow && n.as_f64() < 0.0 => format!("({base})"),
                _ => base,
            };
            format!("({base} {} {})", op.symbol(), step_expr(rhs))
        }
    }
}

// floats keep their decimal point so they read back as floats
fn number(n: Num) -> String {
    match n {
        Num::Int(i) => i.to_string(),
        Num::Float(f) if f.is_nan() => "(0.0 / 0.0)".into(),
        Num::Float(f) if f.is_infinite() => format!("({}1.0 / 0.0)", if f < 0.0 { "-" } else { "" }),
        Num::Float(f) => {
            let text = f.to_string();
            if text.contains('.') { text } else { format!("{text}.0") }
        }
    }
}

fn join(terms: &[Condition], sep: &str, empty: &str) -> String {
    if terms.is_empty() {
        return empty.into();
    }
    let mut s = String::from("(");
    for (i, t) in terms.iter().enumerate() {
        if i > 0 {
            s.push_str(sep);
        }
        let _ = write!(s, "{}", condition(t));
    }
    s.push(')');
    s
}
