use lalrgen::{
    codegen::Codegen,
    diag::{Policy, Reporter},
    grammar::Grammar,
    lalr::{self, Mode},
};
use std::{env, path::PathBuf};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap()).join(format!("tests/{}.parser", name))
}

fn keep_going() -> Reporter {
    Reporter::new(Policy {
        keep_going: true,
        verbose: false,
    })
}

macro_rules! define_tests {
    ($($name:ident),*$(,)?) => {$(
        #[test]
        fn $name() {
            let mut reporter = keep_going();
            let grammar = Grammar::from_file(&fixture(stringify!($name)), &mut reporter).unwrap();
            let _table = lalr::compute(&grammar, Mode::Lalr, &mut reporter).unwrap();
            assert_eq!(reporter.error_count(), 0, "{:#?}", reporter.diagnostics());
        }
    )*};
}

define_tests! {
    arithmetic,
    assignments,
    nodes,
}

#[test]
fn conflict_fixture_counts_one_error() {
    let mut reporter = keep_going();
    let grammar = Grammar::from_file(&fixture("conflict"), &mut reporter).unwrap();
    let table = lalr::compute(&grammar, Mode::Lalr, &mut reporter).unwrap();

    assert_eq!(reporter.error_count(), 1);
    assert!(!table.states.is_empty(), "keep-going still emits a table");
}

#[test]
fn lr0_mode_handles_precedence_grammars() {
    let mut reporter = keep_going();
    let grammar = Grammar::from_file(&fixture("arithmetic"), &mut reporter).unwrap();
    let _table = lalr::compute(&grammar, Mode::Lr0, &mut reporter).unwrap();
    assert_eq!(reporter.error_count(), 0);
}

#[test]
fn nodes_fixture_registers_factories() {
    let mut reporter = keep_going();
    let grammar = Grammar::from_file(&fixture("nodes"), &mut reporter).unwrap();
    let table = lalr::compute(&grammar, Mode::Lalr, &mut reporter).unwrap();
    let rendered = Codegen::new(&grammar, &table).to_string();

    assert_eq!(reporter.error_count(), 0, "{:#?}", reporter.diagnostics());
    assert!(rendered.contains("registry(\"Add\", \"expr\")"));
    assert!(rendered.contains("registry(\"Neg\", \"expr\")"));
    assert!(rendered.contains("lookahead_hint()"));
    assert!(rendered.contains("pub struct Expr"));
}

#[test]
fn regeneration_is_byte_identical() {
    let render = |name: &str| {
        let mut reporter = keep_going();
        let grammar = Grammar::from_file(&fixture(name), &mut reporter).unwrap();
        let table = lalr::compute(&grammar, Mode::Lalr, &mut reporter).unwrap();
        Codegen::new(&grammar, &table).to_string()
    };
    for name in ["arithmetic", "assignments", "nodes"] {
        assert_eq!(render(name), render(name), "{} diverged", name);
    }
}
