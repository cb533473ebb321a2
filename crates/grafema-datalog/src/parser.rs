//! Hand-rolled parser for the rule syntax:
//!
//! ```text
//! violation(X) :- node(X, "CALL"), attr(X, "name", "eval").
//! reach(X, Y) :- edge(X, Y, "CALLS").
//! reach(X, Z) :- reach(X, Y), edge(Y, Z, "CALLS").
//! safe(X) :- node(X, "FUNCTION"), not flagged(X).
//! ```
//!
//! Variables start uppercase or `_`; strings take single or double quotes;
//! `%` starts a line comment. Built-ins beyond the three extensional
//! predicates and stratified `not` are rejected here rather than
//! half-supported downstream.

use crate::ast::{Atom, Literal, Program, Rule, Term, Value};
use crate::DatalogError;

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Variable(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    Comma,
    Dot,
    Implies,
    Not,
    Eof,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.input.len() && self.input[self.pos] == b'%' {
                while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Token, DatalogError> {
        self.skip_trivia();
        if self.pos >= self.input.len() {
            return Ok(Token::Eof);
        }
        let start = self.pos;
        let c = self.input[self.pos];
        match c {
            b'(' => {
                self.pos += 1;
                Ok(Token::LParen)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::RParen)
            }
            b',' => {
                self.pos += 1;
                Ok(Token::Comma)
            }
            b'.' => {
                self.pos += 1;
                Ok(Token::Dot)
            }
            b':' => {
                if self.input.get(self.pos + 1) == Some(&b'-') {
                    self.pos += 2;
                    Ok(Token::Implies)
                } else {
                    Err(self.error("expected ':-'", start))
                }
            }
            b'"' | b'\'' => {
                let quote = c;
                self.pos += 1;
                let content_start = self.pos;
                while self.pos < self.input.len() && self.input[self.pos] != quote {
                    self.pos += 1;
                }
                if self.pos >= self.input.len() {
                    return Err(self.error("unterminated string", start));
                }
                let content =
                    String::from_utf8_lossy(&self.input[content_start..self.pos]).into_owned();
                self.pos += 1;
                Ok(Token::Str(content))
            }
            b'-' | b'0'..=b'9' => {
                self.pos += 1;
                while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|_| self.error("invalid number", start))?;
                text.parse::<i64>()
                    .map(Token::Int)
                    .map_err(|_| self.error("invalid number", start))
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while self.pos < self.input.len()
                    && (self.input[self.pos].is_ascii_alphanumeric()
                        || self.input[self.pos] == b'_')
                {
                    self.pos += 1;
                }
                let word =
                    String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                if word == "not" {
                    Ok(Token::Not)
                } else if word.starts_with(|ch: char| ch.is_ascii_uppercase()) || word.starts_with('_')
                {
                    Ok(Token::Variable(word))
                } else {
                    Ok(Token::Ident(word))
                }
            }
            _ => Err(self.error("unexpected character", start)),
        }
    }

    fn error(&self, message: &str, at: usize) -> DatalogError {
        DatalogError::Parse(format!("{message} at byte {at}"))
    }
}

pub struct RuleParser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    wildcards: usize,
}

impl<'a> RuleParser<'a> {
    pub fn new(input: &'a str) -> Result<Self, DatalogError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(RuleParser {
            lexer,
            current,
            wildcards: 0,
        })
    }

    fn advance(&mut self) -> Result<Token, DatalogError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, token: Token) -> Result<(), DatalogError> {
        if self.current == token {
            self.advance()?;
            Ok(())
        } else {
            Err(DatalogError::Parse(format!(
                "expected {token:?}, found {:?}",
                self.current
            )))
        }
    }

    pub fn parse_program(mut self) -> Result<Program, DatalogError> {
        let mut rules = Vec::new();
        while self.current != Token::Eof {
            rules.push(self.parse_rule()?);
        }
        let program = Program { rules };
        validate(&program)?;
        Ok(program)
    }

    fn parse_rule(&mut self) -> Result<Rule, DatalogError> {
        let head = self.parse_atom()?;
        let body = if self.current == Token::Implies {
            self.advance()?;
            let mut body = vec![self.parse_literal()?];
            while self.current == Token::Comma {
                self.advance()?;
                body.push(self.parse_literal()?);
            }
            body
        } else {
            Vec::new()
        };
        self.expect(Token::Dot)?;
        Ok(Rule { head, body })
    }

    fn parse_literal(&mut self) -> Result<Literal, DatalogError> {
        let negated = if self.current == Token::Not {
            self.advance()?;
            true
        } else {
            false
        };
        let atom = self.parse_atom()?;
        Ok(Literal { atom, negated })
    }

    fn parse_atom(&mut self) -> Result<Atom, DatalogError> {
        let predicate = match self.advance()? {
            Token::Ident(name) => name,
            other => {
                return Err(DatalogError::Parse(format!(
                    "expected predicate name, found {other:?}"
                )))
            }
        };
        self.expect(Token::LParen)?;
        let mut terms = Vec::new();
        loop {
            let term = match self.advance()? {
                // Each `_` is its own variable; two wildcards never unify.
                Token::Variable(v) if v == "_" => {
                    self.wildcards += 1;
                    Term::Var(format!("_{}", self.wildcards))
                }
                Token::Variable(v) => Term::Var(v),
                Token::Str(s) => Term::Value(Value::Str(s)),
                Token::Int(i) => Term::Value(Value::Int(i)),
                Token::Ident(name) => {
                    // Bare lowercase atoms are string constants.
                    Term::Value(Value::Str(name))
                }
                other => {
                    return Err(DatalogError::Parse(format!(
                        "expected term, found {other:?}"
                    )))
                }
            };
            terms.push(term);
            match self.advance()? {
                Token::Comma => continue,
                Token::RParen => break,
                other => {
                    return Err(DatalogError::Parse(format!(
                        "expected ',' or ')', found {other:?}"
                    )))
                }
            }
        }
        Ok(Atom { predicate, terms })
    }
}

/// Static checks: extensional heads, arity consistency, and rule safety
/// (every head variable and every negated-literal variable must occur in a
/// positive body literal).
fn validate(program: &Program) -> Result<(), DatalogError> {
    use std::collections::{HashMap, HashSet};
    let mut arities: HashMap<String, usize> = crate::ast::EXTENSIONAL
        .iter()
        .map(|(name, arity)| (name.to_string(), *arity))
        .collect();

    for rule in &program.rules {
        if crate::ast::is_extensional(&rule.head.predicate) {
            return Err(DatalogError::UnsafeRule(format!(
                "cannot redefine extensional predicate '{}'",
                rule.head.predicate
            )));
        }
        for atom in std::iter::once(&rule.head).chain(rule.body.iter().map(|l| &l.atom)) {
            match arities.get(atom.predicate.as_str()) {
                Some(expected) if *expected != atom.arity() => {
                    return Err(DatalogError::UnsafeRule(format!(
                        "predicate '{}' used with arity {} and {}",
                        atom.predicate,
                        expected,
                        atom.arity()
                    )));
                }
                Some(_) => {}
                None => {
                    arities.insert(atom.predicate.clone(), atom.arity());
                }
            }
        }

        let positive_vars: HashSet<&str> = rule
            .body
            .iter()
            .filter(|l| !l.negated)
            .flat_map(|l| l.atom.variables())
            .collect();
        for var in rule.head.variables() {
            if !positive_vars.contains(var) {
                return Err(DatalogError::UnsafeRule(format!(
                    "head variable '{var}' of '{}' is not bound by a positive literal",
                    rule.head.predicate
                )));
            }
        }
        for literal in rule.body.iter().filter(|l| l.negated) {
            for var in literal.atom.variables() {
                if !positive_vars.contains(var) {
                    return Err(DatalogError::UnsafeRule(format!(
                        "variable '{var}' appears only under negation in '{}'",
                        rule.head.predicate
                    )));
                }
            }
        }
    }
    Ok(())
}

pub fn parse(input: &str) -> Result<Program, DatalogError> {
    RuleParser::new(input)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_and_facts() {
        let program = parse(
            r#"
% flag direct eval calls
violation(X) :- node(X, "CALL"), attr(X, "name", "eval").
seed("x").
"#,
        )
        .unwrap();
        assert_eq!(program.rules.len(), 2);
        assert_eq!(program.rules[0].head.predicate, "violation");
        assert_eq!(program.rules[0].body.len(), 2);
        assert!(program.rules[1].body.is_empty());
    }

    #[test]
    fn parses_negation() {
        let program = parse(
            r#"uncalled(X) :- node(X, "FUNCTION"), not called(X).
called(X) :- edge(_, X, "CALLS"), node(X, "FUNCTION")."#,
        )
        .unwrap();
        assert!(program.rules[0].body[1].negated);
    }

    #[test]
    fn rejects_unsafe_head_variable() {
        let err = parse(r#"bad(X, Y) :- node(X, "CALL")."#).unwrap_err();
        assert!(matches!(err, DatalogError::UnsafeRule(_)));
    }

    #[test]
    fn rejects_variable_only_under_negation() {
        let err = parse(r#"bad(X) :- node(X, "CALL"), not edge(X, Y, "CALLS")."#).unwrap_err();
        assert!(matches!(err, DatalogError::UnsafeRule(_)));
    }

    #[test]
    fn rejects_extensional_redefinition() {
        let err = parse(r#"node(X, "FAKE") :- attr(X, "name", "x")."#).unwrap_err();
        assert!(matches!(err, DatalogError::UnsafeRule(_)));
    }

    #[test]
    fn rejects_arity_mismatch() {
        let err = parse(r#"bad(X) :- node(X, "CALL", "extra")."#).unwrap_err();
        assert!(matches!(err, DatalogError::UnsafeRule(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("violation(X :- node(X).").is_err());
        assert!(parse("violation(X)").is_err());
    }
}
