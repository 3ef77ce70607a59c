// Tokenizer for the generated loop scripts. Newlines are significant, they
// end statements.

use std::num::{ParseFloatError, ParseIntError};

use anyhow::bail;
use logos::Logos;

#[derive(Default, Debug, Clone, PartialEq)]
pub enum LexError {
    BadNumber(String),
    #[default]
    InvalidToken,
}

impl From<ParseIntError> for LexError {
    fn from(value: ParseIntError) -> Self {
        Self::BadNumber(value.to_string())
    }
}

impl From<ParseFloatError> for LexError {
    fn from(value: ParseFloatError) -> Self {
        Self::BadNumber(value.to_string())
    }
}

// alias keeps logos-derive from rewriting `'static` to the source lifetime
type OpStr = &'static str;

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\f]+", skip r"#[^\n]*", error = LexError)]
pub enum Tok {
    // trailing `?` for ruby predicate methods like `even?`
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*\??", |lex| lex.slice().to_string())]
    Ident(String),
    // `attack:` inside an option list
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*:", |lex| lex.slice().trim_end_matches(':').to_string())]
    Label(String),
    // `:downbeat_time`
    #[regex(r":[A-Za-z_][A-Za-z0-9_]*\??", |lex| lex.slice()[1..].to_string())]
    Symbol(String),
    #[regex(r"[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse::<i64>())]
    Int(i64),
    #[regex(r"[0-9][0-9_]*\.[0-9]+", |lex| lex.slice().replace('_', "").parse::<f64>())]
    Float(f64),
    #[regex(r"'([^'\\]|\\(.|\n))*'", |lex| unescape(lex.slice(), '\''))]
    #[regex(r#""([^"\\]|\\(.|\n))*""#, |lex| unescape(lex.slice(), '"'))]
    Str(String),

    #[token("**", |_| "**")]
    #[token("==", |_| "==")]
    #[token("!=", |_| "!=")]
    #[token("<=", |_| "<=")]
    #[token(">=", |_| ">=")]
    #[token("&&", |_| "&&")]
    #[token("||", |_| "||")]
    #[token("+", |_| "+")]
    #[token("-", |_| "-")]
    #[token("*", |_| "*")]
    #[token("/", |_| "/")]
    #[token("%", |_| "%")]
    #[token("<", |_| "<")]
    #[token(">", |_| ">")]
    #[token("=", |_| "=")]
    #[token("!", |_| "!")]
    Op(OpStr),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token("\n")]
    #[token(";")]
    Newline,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

pub fn tokenize(src: &str) -> anyhow::Result<Vec<Token>> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(src.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    // a token belongs to the line it starts on
    let line_of = |offset: usize| line_starts.partition_point(|&start| start <= offset);

    let mut out = Vec::new();
    for (tok, span) in Tok::lexer(src).spanned() {
        let line = line_of(span.start);
        match tok {
            Ok(tok) => push(&mut out, tok, line),
            Err(LexError::BadNumber(why)) => bail!("line {line}: bad number {}: {why}", &src[span]),
            Err(LexError::InvalidToken) => bail!("line {line}: unexpected {:?}", &src[span]),
        }
    }
    push(&mut out, Tok::Newline, line_starts.len());
    Ok(out)
}

fn push(out: &mut Vec<Token>, tok: Tok, line: usize) {
    // collapse blank lines
    if tok == Tok::Newline && matches!(out.last(), None | Some(Token { tok: Tok::Newline, .. })) {
        return;
    }
    out.push(Token { tok, line });
}

// single quotes only unescape \' and \\, which is what keeps windows paths intact
fn unescape(quoted: &str, quote: char) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut s = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            s.push(c);
            continue;
        }
        let escaped = match (quote, chars.peek().copied()) {
            (_, Some('\\')) => Some('\\'),
            (q, Some(n)) if q == n => Some(n),
            ('"', Some('n')) => Some('\n'),
            ('"', Some('t')) => Some('\t'),
            _ => None,
        };
        match escaped {
            Some(e) => {
                s.push(e);
                chars.next();
            }
            None => s.push(c),
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn sample_line() {
        let got = toks("sample samps, 3, attack_level: 0.5 if sleep_sample_3(idx)");
        assert_eq!(
            got,
            vec![
                Tok::Ident("sample".into()),
                Tok::Ident("samps".into()),
                Tok::Comma,
                Tok::Int(3),
                Tok::Comma,
                Tok::Label("attack_level".into()),
                Tok::Float(0.5),
                Tok::Ident("if".into()),
                Tok::Ident("sleep_sample_3".into()),
                Tok::LParen,
                Tok::Ident("idx".into()),
                Tok::RParen,
                Tok::Newline,
            ]
        );
    }

    #[test]
    fn windows_path_keeps_backslashes() {
        let got = toks(r"samps = 'C:\Users\me\samples'");
        assert_eq!(got[2], Tok::Str(r"C:\Users\me\samples".into()));
        let got = toks(r#"s = 'it\'s' + "a\tb\\""#);
        assert_eq!(got[2], Tok::Str("it's".into()));
        assert_eq!(got[4], Tok::Str("a\tb\\".into()));
    }

    #[test]
    fn operators_and_symbols() {
        let got = toks("if (x + 1) % 8 == 0 || x != 2 && !y\nset :downbeat_time, get[:t]\nz = 0.5 ** x");
        assert!(got.contains(&Tok::Op("==")));
        assert!(got.contains(&Tok::Op("||")));
        assert!(got.contains(&Tok::Op("!=")));
        assert!(got.contains(&Tok::Op("&&")));
        assert!(got.contains(&Tok::Op("!")));
        assert!(got.contains(&Tok::Op("**")));
        assert!(got.contains(&Tok::Symbol("downbeat_time".into())));
        assert!(got.contains(&Tok::LBracket));
    }

    #[test]
    fn blank_lines_and_comments_collapse() {
        let got = toks("use_bpm 60 # tempo\n\n\n\tsleep 1\n");
        assert_eq!(
            got,
            vec![
                Tok::Ident("use_bpm".into()),
                Tok::Int(60),
                Tok::Newline,
                Tok::Ident("sleep".into()),
                Tok::Int(1),
                Tok::Newline,
            ]
        );
    }

    #[test]
    fn block_params_and_method_calls() {
        let got = toks("define :f do |x|\nidx = count.tick()\ny = x.even?");
        assert!(got.contains(&Tok::Pipe));
        assert!(got.contains(&Tok::Dot));
        assert!(got.contains(&Tok::Ident("even?".into())));
    }

    #[test]
    fn line_numbers_follow_newlines() {
        let tokens = tokenize("a\nb\n\nc").unwrap();
        let lines: Vec<usize> = tokens
            .iter()
            .filter(|t| matches!(t.tok, Tok::Ident(_)))
            .map(|t| t.line)
            .collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn multiline_string_keeps_its_first_line() {
        let tokens = tokenize("a = 'one\ntwo'\nb").unwrap();
        let s = tokens.iter().find(|t| matches!(t.tok, Tok::Str(_))).unwrap();
        assert_eq!(s.tok, Tok::Str("one\ntwo".into()));
        assert_eq!(s.line, 1);
        assert_eq!(tokens.iter().find(|t| t.tok == Tok::Ident("b".into())).unwrap().line, 3);
    }

    #[test]
    fn bad_input() {
        assert!(tokenize("x = 'open").is_err());
        let err = tokenize("x = 1\ny = @y").unwrap_err();
        assert!(err.to_string().starts_with("line 2"), "{err}");
        let err = tokenize("x = 99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("bad number"), "{err}");
    }
}
