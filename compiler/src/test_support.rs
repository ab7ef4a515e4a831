// test_support.rs — Shared helpers for unit tests

use std::rc::Rc;

use crate::arch::Architecture;
use crate::builtins::Platform;
use crate::diag::Diagnostic;
use crate::id::UnitId;
use crate::parser::{parse, syntax_diagnostics};
use crate::pass::PassId;
use crate::pipeline::{run_pipeline, CompilationState, UnitEnv};
use crate::plugin::PluginRegistry;

fn state(source: &str, arch: Architecture) -> Result<CompilationState, Vec<Diagnostic>> {
    let unit = UnitId(1);
    let parsed = parse(source, unit);
    if !parsed.errors.is_empty() {
        return Err(syntax_diagnostics(&parsed.errors));
    }
    let program = parsed.program.expect("program");
    let platform = Platform::new(&PluginRegistry::standard()).expect("platform");
    let env = UnitEnv {
        platform: Rc::new(platform),
        arch,
        available: Vec::new(),
    };
    Ok(CompilationState::new("main", unit, program, env))
}

/// Run the passes up to `terminal` and return every diagnostic produced.
pub fn compile_until(source: &str, terminal: PassId) -> Vec<Diagnostic> {
    match state(source, Architecture::default()) {
        Ok(mut s) => {
            let _ = run_pipeline(&mut s, terminal, |_, _| {});
            s.diagnostics
        }
        Err(diags) => diags,
    }
}

/// Run every pass; the state on success, the diagnostics otherwise.
pub fn compile(source: &str, arch: Architecture) -> Result<CompilationState, Vec<Diagnostic>> {
    let mut s = state(source, arch)?;
    match run_pipeline(&mut s, PassId::CostLimit, |_, _| {}) {
        Ok(()) => Ok(s),
        Err(_) => Err(s.diagnostics),
    }
}
