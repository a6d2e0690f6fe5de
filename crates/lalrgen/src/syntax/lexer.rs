//! Lexer for the grammar definition language.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
pub enum Token<'input> {
    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token("|")]
    VertBar,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident(&'input str),

    /// `'+'`, `'<='` — a terminal standing for itself, quotes included.
    #[regex(r"'[^'\n]+'")]
    Literal(&'input str),

    /// `%ident` — a directive or a simple-action name; the parser decides
    /// which through the token-association table.
    #[regex(r"%[A-Za-z_][A-Za-z0-9_]*", |lex| &lex.slice()[1..])]
    Directive(&'input str),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u16>().ok())]
    Number(u16),

    /// A file operand such as `tokens.lex`, distinguished from identifiers
    /// by the mandatory dot.
    #[regex(r"[A-Za-z0-9_\-./]*\.[A-Za-z0-9_\-./]+")]
    Path(&'input str),

    /// `{ ... }` with balanced braces. The body excludes the outer pair.
    #[token("{", lex_action)]
    Action(&'input str),
}

/// Consume up to the matching close brace. Brace counting is textual; a
/// brace inside a string literal of the action body counts too, which is
/// the traditional behavior of this kind of tool.
fn lex_action<'input>(
    lex: &mut logos::Lexer<'input, Token<'input>>,
) -> Option<&'input str> {
    let mut depth = 1usize;
    let rem = lex.remainder();
    for (i, c) in rem.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    lex.bump(i + 1);
                    return Some(&rem[..i]);
                }
            }
            _ => {}
        }
    }
    None
}
