use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

use lox::interpreter::Interpreter;

mod common;

use common::{Case, CaseClass, SharedBuffer, load_cases, normalize_output};

struct RunOutcome {
    had_error: bool,
    stdout: String,
    stderr: String,
}

fn run_case(case: &Case) -> Result<RunOutcome> {
    let source = fs::read_to_string(&case.program_path)
        .with_context(|| format!("Reading {}", case.name))?;

    let errors = SharedBuffer::default();
    let mut output: Vec<u8> = Vec::new();
    let mut interp = Interpreter::with_diagnostic_sink(&mut output, Box::new(errors.clone()));
    let had_error = interp.run(&source);
    drop(interp);

    Ok(RunOutcome {
        had_error,
        stdout: String::from_utf8(output).context("program output is UTF-8")?,
        stderr: errors.contents(),
    })
}

fn expected_error(case: &Case) -> Result<String> {
    let expected_file = case
        .spec
        .expected
        .stderr_contains_file
        .as_deref()
        .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
    Ok(case.read_text(expected_file)?.trim().to_string())
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        let outcome = run_case(&case)?;
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                ensure!(
                    !outcome.had_error,
                    "Case {} reported errors: {}",
                    case.name,
                    outcome.stderr
                );
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;
                assert_eq!(
                    normalize_output(&outcome.stdout),
                    normalize_output(&expected),
                    "Output mismatch for {}",
                    case.name
                );
            }
            CaseClass::FrontendError => {
                ensure!(
                    outcome.had_error,
                    "Expected frontend error in {}, but the run succeeded",
                    case.name
                );
                ensure!(
                    outcome.stdout.is_empty(),
                    "Case {} must not execute, but printed: {}",
                    case.name,
                    outcome.stdout
                );
                let expected = expected_error(&case)?;
                ensure!(
                    outcome.stderr.contains(&expected),
                    "Expected frontend error containing '{expected}' in {}, got '{}'",
                    case.name,
                    outcome.stderr
                );
            }
            CaseClass::RuntimeError => {
                ensure!(
                    outcome.had_error,
                    "Expected runtime error in {}, but the run succeeded",
                    case.name
                );
                let expected = expected_error(&case)?;
                ensure!(
                    outcome.stderr.contains(&expected),
                    "Expected runtime error containing '{expected}' in {}, got '{}'",
                    case.name,
                    outcome.stderr
                );
                if let Some(stdout_file) = case.spec.expected.stdout_file.as_deref() {
                    let expected_stdout = case.read_text(stdout_file)?;
                    assert_eq!(
                        normalize_output(&outcome.stdout),
                        normalize_output(&expected_stdout),
                        "Partial output mismatch for {}",
                        case.name
                    );
                }
            }
        }
    }

    Ok(())
}
