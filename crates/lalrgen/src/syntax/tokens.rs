//! Companion token-script loader.
//!
//! The `%parser` directive names a lexer script whose token declarations
//! are carried on `//%` comment markers, so the script stays a valid source
//! file for the lexer generator that owns it. Three forms are recognized:
//!
//! ```text
//! "+"    //%PLUS           fresh ordinal
//! "if"   //%+KW_IF         fresh ordinal, explicit continuation
//! "elif" //%|KW_ELIF       alias sharing the previous ordinal
//! ```

use std::{fs, io, path::Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDecl {
    pub name: String,
    pub ordinal: u16,
}

pub fn load(path: &Path) -> io::Result<Vec<TokenDecl>> {
    let source = fs::read_to_string(path)?;
    Ok(scan(&source))
}

pub fn scan(source: &str) -> Vec<TokenDecl> {
    let mut decls: Vec<TokenDecl> = Vec::new();
    let mut next_ordinal = 0u16;
    for line in source.lines() {
        let Some(idx) = line.find("//%") else {
            continue;
        };
        for form in line[idx + 3..].split_whitespace() {
            let (name, ordinal) = if let Some(name) = form.strip_prefix('|') {
                let ordinal = match decls.last() {
                    Some(previous) => previous.ordinal,
                    None => continue,
                };
                (name, ordinal)
            } else {
                let name = form.strip_prefix('+').unwrap_or(form);
                let ordinal = next_ordinal;
                next_ordinal += 1;
                (name, ordinal)
            };
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                continue;
            }
            decls.push(TokenDecl {
                name: name.to_owned(),
                ordinal,
            });
        }
    }
    decls
}
