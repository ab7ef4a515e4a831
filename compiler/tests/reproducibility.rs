// Reproducibility and CLI contract tests.
//
// These tests verify that identical inputs produce byte-identical outputs
// (symbol dumps, provenance) and that the binary's exit codes distinguish
// compile, I/O and run-time failures.

use std::path::PathBuf;
use std::process::{Command, Output};

use tally::arch::Architecture;
use tally::plugin::PluginRegistry;
use tally::session::Session;

fn tally_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tally"))
}

/// Write `source` to a fresh file under the temp dir and return its path.
fn script(name: &str, source: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tally-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join(name);
    std::fs::write(&path, source).expect("write script");
    path
}

fn run_tally(args: &[&str]) -> Output {
    Command::new(tally_binary())
        .args(args)
        .output()
        .expect("failed to run tally")
}

const LIBRARY: &str = "record Point(x: Int, y: Int)\n\
                       def norm1(p: Point): Int { abs(p.x) + abs(p.y) }\n\
                       def scan<#N>(xs: List<Int, N>): Int { mutable n = 0\n for (x in xs) { n = n + x }\n n }";

// ── Library determinism ─────────────────────────────────────────────────────

#[test]
fn same_source_same_provenance() {
    let compile = || {
        let mut s = Session::new(Architecture::default(), PluginRegistry::standard()).expect("session");
        let a = s.compile("lib", LIBRARY).expect("compile");
        (a.symbols.to_string(), a.provenance.to_json())
    };
    let (dump_a, json_a) = compile();
    let (dump_b, json_b) = compile();
    assert_eq!(dump_a, dump_b, "symbol dump should be byte-identical across runs");
    assert_eq!(json_a, json_b, "provenance should be byte-identical across runs");
}

#[test]
fn edited_source_changes_fingerprint() {
    let mut s = Session::new(Architecture::default(), PluginRegistry::standard()).expect("session");
    let a = s.compile("a", LIBRARY).expect("a");
    let b = s
        .compile("b", &LIBRARY.replace("abs(p.y)", "abs(p.y) * 2"))
        .expect("b");
    assert_ne!(a.provenance.source_hash, b.provenance.source_hash);
    assert_ne!(a.provenance.symbol_fingerprint, b.provenance.symbol_fingerprint);
}

// ── CLI ─────────────────────────────────────────────────────────────────────

#[test]
fn emit_types_is_stable() {
    let path = script("stable.tl", LIBRARY);
    let path = path.to_str().expect("utf-8 path");
    let first = run_tally(&["--emit", "types", path]);
    let second = run_tally(&["--emit", "types", path]);
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    assert_eq!(first.stdout, second.stdout);
    assert!(String::from_utf8_lossy(&first.stdout).contains("function scan<#N>"));
}

#[test]
fn evaluates_with_imports() {
    let lib = script("geometry.tl", LIBRARY);
    let main = script("main.tl", "import geometry\nnorm1(Point(3, -4)) + scan(List(1, 2))");
    let out = run_tally(&[
        "--import",
        lib.to_str().expect("utf-8 path"),
        main.to_str().expect("utf-8 path"),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "10");
}

#[test]
fn exit_codes() {
    let bad = script("bad.tl", "val x: Int = true");
    let out = run_tally(&[bad.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("bad:1:"));

    let out = run_tally(&["/nonexistent/tally/script.tl"]);
    assert_eq!(out.status.code(), Some(2));

    let overflow = script("overflow.tl", "mutable s = MutableSet<Int, 1>(1)\ns.add(2)");
    let out = run_tally(&[overflow.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Fin violation"));

    let tight = script("tight.tl", "5 + 6");
    let out = run_tally(&["--ceiling", "2", tight.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("E0500"));
}
