//! Syntax support for grammar definition files.
//!
//! The surface language is line-agnostic and token-oriented:
//!
//! ```text
//! %parser calc.lex Calc
//! %namespace calc
//! %left '+' '-'
//! %left '*' '/'
//! %start expr
//!
//! expr : expr '+' expr          { $$ = $1 + $3; }
//!      | expr '*' expr          %Mul(l, r)
//!      | NUM
//!      ;
//! ```

pub mod ast;
pub mod lexer;
pub mod tokens;

use self::lexer::Token;
use crate::{
    diag::{self, Abort, Pos, Reporter},
    grammar::Assoc,
};
use logos::Logos;

/// The pluggable table mapping precedence-association directives to their
/// direction.
pub type AssocTable = &'static [(&'static str, Assoc)];

pub const DEFAULT_ASSOC_TABLE: AssocTable = &[
    ("left", Assoc::Left),
    ("right", Assoc::Right),
    ("nonassoc", Assoc::Nonassoc),
    ("binary", Assoc::Nonassoc),
];

pub fn parse(source: &str, reporter: &mut Reporter) -> Result<ast::Grammar, Abort> {
    parse_with(source, DEFAULT_ASSOC_TABLE, reporter)
}

pub fn parse_with(
    source: &str,
    assoc_table: AssocTable,
    reporter: &mut Reporter,
) -> Result<ast::Grammar, Abort> {
    let span = tracing::trace_span!("parse");
    let _entered = span.enter();

    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span.start)),
            Err(()) => {
                return Err(reporter.fatal(
                    diag::E_SYNTAX,
                    Some(pos_at(source, span.start)),
                    format!("unrecognized input `{}'", &source[span.start..span.end]),
                ))
            }
        }
    }

    Parser {
        source,
        tokens,
        cursor: 0,
        assoc_table,
        reporter,
    }
    .grammar()
}

/// Line/column of a byte offset, 1-based.
fn pos_at(source: &str, offset: usize) -> Pos {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Pos { line, column }
}

struct Parser<'input, 'r> {
    source: &'input str,
    tokens: Vec<(Token<'input>, usize)>,
    cursor: usize,
    assoc_table: AssocTable,
    reporter: &'r mut Reporter,
}

impl<'input> Parser<'input, '_> {
    fn peek(&self) -> Option<Token<'input>> {
        self.tokens.get(self.cursor).map(|(t, _)| t.clone())
    }

    fn peek2(&self) -> Option<Token<'input>> {
        self.tokens.get(self.cursor + 1).map(|(t, _)| t.clone())
    }

    fn bump(&mut self) -> Option<Token<'input>> {
        let token = self.peek();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn pos(&self) -> Pos {
        let offset = self
            .tokens
            .get(self.cursor)
            .map(|&(_, offset)| offset)
            .unwrap_or(self.source.len());
        pos_at(self.source, offset)
    }

    fn syntax_error(&mut self, message: impl Into<String>) -> Abort {
        let pos = self.pos();
        self.reporter.fatal(diag::E_SYNTAX, Some(pos), message)
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, Abort> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.bump();
                Ok(name.to_owned())
            }
            _ => Err(self.syntax_error(format!("expecting {}", what))),
        }
    }

    fn grammar(mut self) -> Result<ast::Grammar, Abort> {
        let mut stmts = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Directive(_) => stmts.push(self.directive()?),
                Token::Ident(_) => stmts.push(self.rule()?),
                _ => return Err(self.syntax_error("expecting a directive or a rule")),
            }
        }
        tracing::trace!(stmts = stmts.len(), "grammar file parsed");
        Ok(ast::Grammar { stmts })
    }

    fn directive(&mut self) -> Result<ast::Stmt, Abort> {
        let pos = self.pos();
        let Some(Token::Directive(name)) = self.bump() else {
            unreachable!()
        };

        if let Some(&(_, assoc)) = self.assoc_table.iter().find(|(n, _)| *n == name) {
            return self.prec_directive(assoc, pos);
        }

        match name {
            "parser" => {
                let token_script = match self.peek() {
                    Some(Token::Path(path)) => {
                        self.bump();
                        path.to_owned()
                    }
                    Some(Token::Ident(path)) if !matches!(self.peek2(), Some(Token::Colon)) => {
                        self.bump();
                        path.to_owned()
                    }
                    _ => return Err(self.syntax_error("expecting a token script path")),
                };
                // An identifier that begins the next rule is not the
                // optional class name.
                let class_name = match (self.peek(), self.peek2()) {
                    (Some(Token::Ident(_)), Some(Token::Colon)) => None,
                    (Some(Token::Ident(name)), _) => {
                        self.bump();
                        Some(name.to_owned())
                    }
                    _ => None,
                };
                Ok(ast::Stmt::Parser(ast::ParserDecl {
                    token_script,
                    class_name,
                    pos,
                }))
            }

            "namespace" => {
                let name = self.expect_ident("a namespace name")?;
                Ok(ast::Stmt::Namespace(ast::NamespaceDecl { name, pos }))
            }

            "start" => {
                let name = self.expect_ident("the start symbol")?;
                Ok(ast::Stmt::Start(ast::StartDecl { name, pos }))
            }

            _ => Err(self.syntax_error(format!("unknown directive `%{}'", name))),
        }
    }

    fn prec_directive(&mut self, assoc: Assoc, pos: Pos) -> Result<ast::Stmt, Abort> {
        let strength = match self.peek() {
            Some(Token::Number(n)) => {
                self.bump();
                Some(n)
            }
            _ => None,
        };

        let mut names = Vec::new();
        loop {
            match (self.peek(), self.peek2()) {
                // An identifier followed by `:` opens the next rule.
                (Some(Token::Ident(_)), Some(Token::Colon)) => break,
                (Some(Token::Ident(name)), _) | (Some(Token::Literal(name)), _) => {
                    self.bump();
                    names.push(name.to_owned());
                }
                _ => break,
            }
        }
        if let Some(Token::Semicolon) = self.peek() {
            self.bump();
        }

        if names.is_empty() {
            return Err(self.syntax_error("expecting symbols after the precedence directive"));
        }
        Ok(ast::Stmt::Prec(ast::PrecDecl {
            assoc,
            strength,
            names,
            pos,
        }))
    }

    fn rule(&mut self) -> Result<ast::Stmt, Abort> {
        let pos = self.pos();
        let left = self.expect_ident("a rule name")?;
        match self.peek() {
            Some(Token::Colon) => {
                self.bump();
            }
            _ => return Err(self.syntax_error("expecting `:' after the rule name")),
        }

        let mut productions = vec![self.production()?];
        loop {
            match self.peek() {
                Some(Token::VertBar) => {
                    self.bump();
                    productions.push(self.production()?);
                }
                Some(Token::Semicolon) => {
                    self.bump();
                    break;
                }
                _ => return Err(self.syntax_error("expecting `|' or `;'")),
            }
        }

        Ok(ast::Stmt::Rule(ast::RuleDecl {
            left,
            productions,
            pos,
        }))
    }

    fn production(&mut self) -> Result<ast::Production, Abort> {
        let pos = self.pos();
        let mut elems = Vec::new();
        loop {
            let elem_pos = self.pos();
            match self.peek() {
                Some(Token::Ident(name)) | Some(Token::Literal(name)) => {
                    self.bump();
                    elems.push(ast::Elem::Symbol {
                        name: name.to_owned(),
                        pos: elem_pos,
                    });
                }

                Some(Token::Action(body)) => {
                    self.bump();
                    elems.push(ast::Elem::Action {
                        body: body.to_owned(),
                        pos: elem_pos,
                    });
                }

                Some(Token::Directive("prec")) => {
                    self.bump();
                    let name = match self.peek() {
                        Some(Token::Ident(name)) | Some(Token::Literal(name)) => {
                            self.bump();
                            name.to_owned()
                        }
                        _ => return Err(self.syntax_error("expecting a symbol after %prec")),
                    };
                    elems.push(ast::Elem::Prec {
                        name,
                        pos: elem_pos,
                    });
                }

                Some(Token::Directive(name)) => {
                    self.bump();
                    elems.push(self.simple_action(name.to_owned(), elem_pos)?);
                }

                _ => break,
            }
        }
        Ok(ast::Production { elems, pos })
    }

    /// `%Name(arg, arg){init}` — the argument list and the init body are
    /// both optional.
    fn simple_action(&mut self, name: String, pos: Pos) -> Result<ast::Elem, Abort> {
        let mut args = Vec::new();
        if let Some(Token::LParen) = self.peek() {
            self.bump();
            loop {
                match self.bump() {
                    Some(Token::RParen) => break,
                    Some(Token::Ident(arg)) => {
                        args.push(arg.to_owned());
                        match self.bump() {
                            Some(Token::Comma) => continue,
                            Some(Token::RParen) => break,
                            _ => {
                                return Err(
                                    self.syntax_error("expecting `,' or `)' in the argument list")
                                )
                            }
                        }
                    }
                    _ => return Err(self.syntax_error("expecting an argument name")),
                }
            }
        }

        let init = match self.peek() {
            Some(Token::Action(body)) => {
                self.bump();
                Some(body.to_owned())
            }
            _ => None,
        };

        Ok(ast::Elem::Node {
            name,
            args,
            init,
            pos,
        })
    }
}
