mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lox::diagnostics::Diagnostics;
use lox::interpreter::Interpreter;
use lox::{lexer, parser};

fn bench_pipeline(c: &mut Criterion) {
    for (label, source) in common::workloads() {
        c.bench_function(&format!("lex_only_{label}"), |b| {
            b.iter(|| {
                let mut diags = Diagnostics::new();
                let tokens = lexer::scan(black_box(source), &mut diags);
                assert!(!diags.had_error());
                black_box(tokens);
            })
        });

        c.bench_function(&format!("lex_plus_parse_{label}"), |b| {
            b.iter(|| {
                let mut diags = Diagnostics::new();
                let tokens = lexer::scan(black_box(source), &mut diags);
                let mut next_id = 0;
                let program = parser::parse(tokens, &mut diags, &mut next_id);
                assert!(!diags.had_error());
                black_box(program);
            })
        });

        c.bench_function(&format!("full_pipeline_{label}"), |b| {
            b.iter(|| {
                let mut output: Vec<u8> = Vec::new();
                let mut interp =
                    Interpreter::with_diagnostic_sink(&mut output, Box::new(std::io::sink()));
                let had_error = interp.run(black_box(source));
                assert!(!had_error);
                drop(interp);
                black_box(output);
            })
        });
    }
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
