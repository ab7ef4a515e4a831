// Snapshot tests: lock rendered diagnostics and symbol-table dumps.
//
// Uses the library API (Session::compile) and inline `insta` snapshots of the
// rendered text, so message wording and locations are reviewed on change.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use tally::arch::Architecture;
use tally::diag::Diagnostic;
use tally::plugin::PluginRegistry;
use tally::session::Session;

fn session() -> Session {
    Session::new(Architecture::default(), PluginRegistry::standard()).expect("session")
}

/// Compile `source` as unit `main` and render its diagnostics, one per line.
fn rendered(source: &str) -> String {
    let diags: Vec<Diagnostic> = match session().compile("main", source) {
        Ok(_) => Vec::new(),
        Err(diags) => diags,
    };
    diags
        .iter()
        .map(|d| d.render("main", source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn too_many_elements() {
    insta::assert_snapshot!(
        rendered("List<Int, 2>(1, 2, 3)"),
        @"main:1:1: error[E0205]: too many elements: List bounded by 2 given 3"
    );
}

#[test]
fn recursive_records() {
    insta::assert_snapshot!(rendered("record A(b: B)\nrecord B(a: A)"), @r"
    main:<generated>: error[E0300]: recursive record detected: A
    main:<generated>: error[E0300]: recursive record detected: B
    ");
}

#[test]
fn cost_over_limit() {
    let mut s = Session::new(Architecture::default().with_ceiling(2), PluginRegistry::standard())
        .expect("session");
    let source = "5 + 6";
    let diags = s.compile("main", source).unwrap_err();
    insta::assert_snapshot!(
        diags[0].render("main", source),
        @"main:<generated>: error[E0500]: cost over limit: 3 exceeds 2"
    );
}

#[test]
fn function_dump_includes_cost() {
    let mut s = session();
    let a = s
        .compile("main", "def double(x: Int): Int { x * 2 }")
        .expect("compile");
    insta::assert_snapshot!(a.symbols.to_string().trim_end(), @"function double(Int): Int cost 4");
}
