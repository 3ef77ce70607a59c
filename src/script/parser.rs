// Recursive descent parser for the subset of the live-coding language the
// generator emits: top-level assignments and commands, `define` blocks,
// `live_loop` blocks, if/elsif/else, returns and integer expressions.

use anyhow::bail;

use super::lexer::{Tok, Token, tokenize};

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Str(String),
    Symbol(String),
    Var(String),
    Unary { op: &'static str, expr: Box<Expr> },
    Binary { op: &'static str, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Method { recv: Box<Expr>, name: String, args: Vec<Expr> },
    Index { recv: Box<Expr>, key: Box<Expr> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Assign { name: String, value: Expr },
    // paren-less call: `sample samps, 0, attack: 0.1`, `use_bpm 60`, `sleep 1`
    Command { name: String, args: Vec<Expr>, opts: Vec<(String, Expr)> },
    Define { name: String, param: Option<String>, body: Vec<Stmt> },
    LiveLoop { name: String, body: Vec<Stmt> },
    // an empty `otherwise` is the same as no else branch
    If { arms: Vec<(Expr, Vec<Stmt>)>, otherwise: Vec<Stmt> },
    Return(Option<Expr>),
    Expr(Expr),
}

const KEYWORDS: [&str; 11] = [
    "if", "elsif", "else", "end", "do", "define", "live_loop", "return", "true", "false", "nil",
];

pub fn parse(src: &str) -> anyhow::Result<Vec<Stmt>> {
    let mut parser = Parser { tokens: tokenize(src)?, pos: 0 };
    let (stmts, stop) = parser.block()?;
    if let Some(word) = stop {
        bail!("line {}: unexpected `{word}`", parser.line());
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(0, |t| t.line)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        self.pos += 1;
        tok
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if w == word)
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Some(Tok::Op(o)) if *o == op)
    }

    fn expect(&mut self, want: Tok, what: &str) -> anyhow::Result<()> {
        match self.peek() {
            Some(t) if *t == want => {
                self.pos += 1;
                Ok(())
            }
            other => bail!("line {}: expected {what}, found {other:?}", self.line()),
        }
    }

    fn expect_word(&mut self, word: &str) -> anyhow::Result<()> {
        if self.at_word(word) {
            self.pos += 1;
            Ok(())
        } else {
            bail!("line {}: expected `{word}`, found {:?}", self.line(), self.peek())
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Tok::Newline) {
            self.pos += 1;
        }
    }

    // statements up to `end`/`elsif`/`else` (returned, not consumed) or eof
    fn block(&mut self) -> anyhow::Result<(Vec<Stmt>, Option<String>)> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => return Ok((stmts, None)),
                Some(Tok::Ident(w)) if matches!(w.as_str(), "end" | "elsif" | "else") => {
                    return Ok((stmts, Some(w.clone())));
                }
                _ => {}
            }
            let stmt = self.statement()?;
            stmts.push(stmt);
            match self.peek() {
                None | Some(Tok::Newline) => {}
                Some(Tok::Ident(w)) if matches!(w.as_str(), "end" | "elsif" | "else") => {}
                other => bail!("line {}: unexpected {other:?} after statement", self.line()),
            }
        }
    }

    fn statement(&mut self) -> anyhow::Result<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Tok::Ident(w)) if w == "if" => return self.if_statement(),
            Some(Tok::Ident(w)) if w == "define" => self.define()?,
            Some(Tok::Ident(w)) if w == "live_loop" => self.live_loop()?,
            Some(Tok::Ident(w)) if w == "return" => {
                self.pos += 1;
                if matches!(self.peek(), None | Some(Tok::Newline)) || self.at_word("if") {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expr()?))
                }
            }
            Some(Tok::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                match self.peek_at(1) {
                    Some(Tok::Op("=")) => {
                        self.pos += 2;
                        StmtKind::Assign { name, value: self.expr()? }
                    }
                    Some(next) if starts_argument(next) => {
                        self.pos += 1;
                        self.command(name)?
                    }
                    _ => StmtKind::Expr(self.expr()?),
                }
            }
            _ => StmtKind::Expr(self.expr()?),
        };
        let stmt = Stmt { kind, line };

        // trailing `if cond` wraps the statement
        if self.at_word("if") {
            self.pos += 1;
            let cond = self.expr()?;
            return Ok(Stmt {
                kind: StmtKind::If { arms: vec![(cond, vec![stmt])], otherwise: Vec::new() },
                line,
            });
        }
        Ok(stmt)
    }

    fn command(&mut self, name: String) -> anyhow::Result<StmtKind> {
        let mut args = Vec::new();
        let mut opts = Vec::new();
        loop {
            if let Some(Tok::Label(key)) = self.peek() {
                let key = key.clone();
                self.pos += 1;
                opts.push((key, self.expr()?));
            } else if !opts.is_empty() {
                bail!("line {}: positional argument after options", self.line());
            } else {
                args.push(self.expr()?);
            }
            if self.peek() == Some(&Tok::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(StmtKind::Command { name, args, opts })
    }

    fn if_statement(&mut self) -> anyhow::Result<Stmt> {
        let line = self.line();
        self.expect_word("if")?;
        let mut arms = Vec::new();
        let mut otherwise = Vec::new();

        let cond = self.expr()?;
        let (body, mut stop) = self.block()?;
        arms.push((cond, body));
        loop {
            match stop.as_deref() {
                Some("elsif") => {
                    self.pos += 1;
                    let cond = self.expr()?;
                    let (body, next) = self.block()?;
                    arms.push((cond, body));
                    stop = next;
                }
                Some("else") => {
                    self.pos += 1;
                    let (body, next) = self.block()?;
                    if next.as_deref() != Some("end") {
                        bail!("line {}: `else` without `end`", self.line());
                    }
                    otherwise = body;
                    stop = next;
                }
                Some("end") => {
                    self.pos += 1;
                    break;
                }
                _ => bail!("line {line}: `if` without `end`"),
            }
        }
        Ok(Stmt { kind: StmtKind::If { arms, otherwise }, line })
    }

    fn define(&mut self) -> anyhow::Result<StmtKind> {
        self.expect_word("define")?;
        let name = self.symbol()?;
        self.expect_word("do")?;
        let param = if self.peek() == Some(&Tok::Pipe) {
            self.pos += 1;
            let param = match self.bump() {
                Some(Tok::Ident(p)) => p,
                other => bail!("line {}: expected parameter name, found {other:?}", self.line()),
            };
            self.expect(Tok::Pipe, "`|`")?;
            Some(param)
        } else {
            None
        };
        let body = self.body_until_end("define")?;
        Ok(StmtKind::Define { name, param, body })
    }

    fn live_loop(&mut self) -> anyhow::Result<StmtKind> {
        self.expect_word("live_loop")?;
        let name = self.symbol()?;
        self.expect_word("do")?;
        let body = self.body_until_end("live_loop")?;
        Ok(StmtKind::LiveLoop { name, body })
    }

    fn body_until_end(&mut self, what: &str) -> anyhow::Result<Vec<Stmt>> {
        let line = self.line();
        let (body, stop) = self.block()?;
        match stop.as_deref() {
            Some("end") => {
                self.pos += 1;
                Ok(body)
            }
            Some(word) => bail!("line {}: unexpected `{word}` in {what}", self.line()),
            None => bail!("line {line}: {what} without `end`"),
        }
    }

    fn symbol(&mut self) -> anyhow::Result<String> {
        match self.bump() {
            Some(Tok::Symbol(s)) => Ok(s),
            other => bail!("line {}: expected a :name, found {other:?}", self.line()),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────

    fn expr(&mut self) -> anyhow::Result<Expr> {
        self.binary(0)
    }

    fn binary(&mut self, level: usize) -> anyhow::Result<Expr> {
        const LEVELS: [&[&str]; 6] = [
            &["||"],
            &["&&"],
            &["==", "!="],
            &["<", "<=", ">", ">="],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary(level + 1)?;
        while let Some(Tok::Op(op)) = self.peek() {
            let op = *op;
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> anyhow::Result<Expr> {
        if self.at_op("-") || self.at_op("!") || self.at_word("not") {
            let op = if self.at_op("-") { "-" } else { "!" };
            self.pos += 1;
            let expr = self.unary()?;
            return Ok(Expr::Unary { op, expr: Box::new(expr) });
        }
        let base = self.postfix()?;
        if self.at_op("**") {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary { op: "**", lhs: Box::new(base), rhs: Box::new(exponent) });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> anyhow::Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let name = match self.bump() {
                        Some(Tok::Ident(n)) => n,
                        other => bail!("line {}: expected method name, found {other:?}", self.line()),
                    };
                    let args = if self.peek() == Some(&Tok::LParen) { self.call_args()? } else { Vec::new() };
                    expr = Expr::Method { recv: Box::new(expr), name, args };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(Tok::RBracket, "`]`")?;
                    expr = Expr::Index { recv: Box::new(expr), key: Box::new(key) };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> anyhow::Result<Vec<Expr>> {
        self.expect(Tok::LParen, "`(`")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.bump() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => return Ok(args),
                other => bail!("line {}: expected `,` or `)`, found {other:?}", self.line()),
            }
        }
    }

    fn primary(&mut self) -> anyhow::Result<Expr> {
        let line = self.line();
        let expr = match self.peek().cloned() {
            Some(Tok::Int(v)) => Expr::Int(v),
            Some(Tok::Float(v)) => Expr::Float(v),
            Some(Tok::Str(s)) => Expr::Str(s),
            Some(Tok::Symbol(s)) => Expr::Symbol(s),
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen, "`)`")?;
                return Ok(inner);
            }
            Some(Tok::Ident(w)) => match w.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "nil" => Expr::Nil,
                w if KEYWORDS.contains(&w) => bail!("line {line}: unexpected `{w}`"),
                _ => {
                    self.pos += 1;
                    if self.peek() == Some(&Tok::LParen) {
                        let args = self.call_args()?;
                        return Ok(Expr::Call { name: w, args });
                    }
                    return Ok(Expr::Var(w));
                }
            },
            other => bail!("line {line}: expected an expression, found {other:?}"),
        };
        self.pos += 1;
        Ok(expr)
    }
}

// can this token start the first argument of a paren-less command?
fn starts_argument(tok: &Tok) -> bool {
    match tok {
        Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::Symbol(_) | Tok::Label(_) => true,
        Tok::Ident(w) => !matches!(w.as_str(), "if" | "do" | "end" | "else" | "elsif"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.into()))
    }

    fn int(v: i64) -> Box<Expr> {
        Box::new(Expr::Int(v))
    }

    #[test]
    fn precedence() {
        let stmts = parse("a = (x + 1) % 8 == 0 || x < 3 && !y").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else { panic!("not an assignment") };
        let Expr::Binary { op: "||", lhs, rhs } = value else { panic!("top is not ||: {value:?}") };
        assert_eq!(
            **lhs,
            Expr::Binary {
                op: "==",
                lhs: Box::new(Expr::Binary {
                    op: "%",
                    lhs: Box::new(Expr::Binary { op: "+", lhs: var("x"), rhs: int(1) }),
                    rhs: int(8),
                }),
                rhs: int(0),
            }
        );
        assert!(matches!(**rhs, Expr::Binary { op: "&&", .. }));
    }

    #[test]
    fn commands_and_options() {
        let stmts = parse("use_bpm 59\nset :downbeat_time, 1.7\nsample samps, 2, start: 0, attack: 0.047").unwrap();
        assert_eq!(
            stmts[0].kind,
            StmtKind::Command { name: "use_bpm".into(), args: vec![Expr::Int(59)], opts: vec![] }
        );
        let StmtKind::Command { name, args, opts } = &stmts[2].kind else { panic!() };
        assert_eq!(name, "sample");
        assert_eq!(args, &vec![Expr::Var("samps".into()), Expr::Int(2)]);
        assert_eq!(opts[1], ("attack".to_string(), Expr::Float(0.047)));
        assert_eq!(stmts[2].line, 3);
    }

    #[test]
    fn modifier_if_wraps_statement() {
        let stmts = parse("sample samps, 0 if sleep_sample_0(idx)").unwrap();
        let StmtKind::If { arms, otherwise } = &stmts[0].kind else { panic!() };
        assert!(otherwise.is_empty());
        assert_eq!(arms[0].0, Expr::Call { name: "sleep_sample_0".into(), args: vec![Expr::Var("idx".into())] });
        assert!(matches!(arms[0].1[0].kind, StmtKind::Command { .. }));
    }

    #[test]
    fn define_with_nested_ifs() {
        let src = "define :f do |x|\n\tif x < 27\n\t\treturn false\n\telsif x < 40\n\t\treturn 1\n\telse \n\t\tx = (x - 51)\n\t\tif true\n\t\tend\n\tend\nend\n";
        let stmts = parse(src).unwrap();
        let StmtKind::Define { name, param, body } = &stmts[0].kind else { panic!() };
        assert_eq!(name, "f");
        assert_eq!(param.as_deref(), Some("x"));
        let StmtKind::If { arms, otherwise } = &body[0].kind else { panic!() };
        assert_eq!(arms.len(), 2);
        assert_eq!(otherwise.len(), 2);
        assert!(matches!(&otherwise[0].kind, StmtKind::Assign { name, .. } if name == "x"));
    }

    #[test]
    fn live_loop_with_tick_and_get() {
        let src = "live_loop :l do\n\tidx = downbeat_count.tick()\n\tsleep get[:downbeat_time]\nend";
        let stmts = parse(src).unwrap();
        let StmtKind::LiveLoop { name, body } = &stmts[0].kind else { panic!() };
        assert_eq!(name, "l");
        assert_eq!(
            body[0].kind,
            StmtKind::Assign {
                name: "idx".into(),
                value: Expr::Method { recv: var("downbeat_count"), name: "tick".into(), args: vec![] },
            }
        );
        let StmtKind::Command { args, .. } = &body[1].kind else { panic!() };
        assert_eq!(
            args[0],
            Expr::Index { recv: var("get"), key: Box::new(Expr::Symbol("downbeat_time".into())) }
        );
    }

    #[test]
    fn not_call_and_power() {
        let stmts = parse("a = not(x == 1)\nb = 2 ** 3 * 2").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else { panic!() };
        assert!(matches!(value, Expr::Unary { op: "!", .. }));
        let StmtKind::Assign { value, .. } = &stmts[1].kind else { panic!() };
        assert!(matches!(value, Expr::Binary { op: "*", .. }));
    }

    #[test]
    fn errors_carry_lines() {
        let err = parse("define :f do |x|\n\treturn (x + \nend").unwrap_err();
        assert!(err.to_string().starts_with("line 2"), "{err}");
        assert!(parse("if x\n\treturn 1\n").is_err());
        assert!(parse("end").is_err());
    }
}
