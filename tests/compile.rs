use indoc::indoc;
use schemec::{
    CompileError, compile_source,
    frontend::{SourceFile, intern::InternedSymbol},
    middle::{
        codegen::{CodegenError, CodegenOptions, CompilationOutput, ErrorPolicy},
        ir::{self, Terminator},
    },
};

fn compile_with(source: &str, options: &CodegenOptions) -> Result<CompilationOutput, CompileError> {
    compile_source(&SourceFile::from_memory(source), options)
}

fn compile(source: &str) -> String {
    let output = compile_with(source, &CodegenOptions::default()).unwrap();
    assert!(output.diagnostics.is_empty());

    ir::render(&output.module)
}

fn codegen_error(source: &str) -> CodegenError {
    match compile_with(source, &CodegenOptions::default()) {
        Err(CompileError::Codegen(diagnostic)) => diagnostic.error,
        other => panic!("expected a code generation error, got {other:?}"),
    }
}

#[test]
fn conditional_joins_arms_with_a_phi() {
    assert_eq!(
        compile("(if (< 1 2) 10 20)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = icmp slt i64 1, 2
              %r2 = zext i1 %r1 to i64
              %r3 = icmp ne i64 %r2, 0
              br i1 %r3, label %if.then, label %if.else
            if.then:
              br label %if.merge
            if.else:
              br label %if.merge
            if.merge:
              %r4 = phi i64 [ 10, %if.then ], [ 20, %if.else ]
              ret i64 %r4
            }
        "}
    );
}

#[test]
fn lambda_is_lifted_and_called_directly() {
    assert_eq!(
        compile("((lambda (x) x) 5)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = call i64 @lambda(i64 5)
              ret i64 %r1
            }

            define i64 @lambda(i64 %arg.x) {
            entry:
              ret i64 %arg.x
            }
        "}
    );
}

#[test]
fn recursive_function() {
    assert_eq!(
        compile(indoc! {"
            (define (fact n)
              (if (= n 0)
                  1
                  (* n (fact (- n 1)))))
            (fact 5)
        "}),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = call i64 @fact(i64 5)
              ret i64 %r1
            }

            define i64 @fact(i64 %arg.n) {
            entry:
              %r1 = icmp eq i64 %arg.n, 0
              %r2 = zext i1 %r1 to i64
              %r3 = icmp ne i64 %r2, 0
              br i1 %r3, label %if.then, label %if.else
            if.then:
              br label %if.merge
            if.else:
              %r4 = sub i64 %arg.n, 1
              %r5 = call i64 @fact(i64 %r4)
              %r6 = mul i64 %arg.n, %r5
              br label %if.merge
            if.merge:
              %r7 = phi i64 [ 1, %if.then ], [ %r6, %if.else ]
              ret i64 %r7
            }
        "}
    );
}

#[test]
fn global_assignment_stores() {
    assert_eq!(
        compile("(define counter 0) (set! counter (+ counter 1)) counter"),
        indoc! {"
            ; ModuleID = 'module'

            @counter = global i64 0

            define i64 @main() {
            entry:
              store i64 0, ptr @counter
              %r1 = load i64, ptr @counter
              %r2 = add i64 %r1, 1
              store i64 %r2, ptr @counter
              %r3 = load i64, ptr @counter
              ret i64 %r3
            }
        "}
    );
}

#[test]
fn string_literals_become_private_constants() {
    assert_eq!(
        compile(r#"(display "hi")"#),
        indoc! {r#"
            ; ModuleID = 'module'

            @.str = private unnamed_addr constant [3 x i8] c"hi\00"

            declare i64 @scm_display(i64)

            define i64 @main() {
            entry:
              %r1 = getelementptr [3 x i8], ptr @.str, i64 0, i64 0
              %r2 = ptrtoint ptr %r1 to i64
              %r3 = call i64 @scm_display(i64 %r2)
              ret i64 %r3
            }
        "#}
    );
}

#[test]
fn array_literal_and_vector_ref() {
    assert_eq!(
        compile("(vector-ref #(1 2) 1)"),
        indoc! {"
            ; ModuleID = 'module'

            %array.2 = type [2 x i64]

            define i64 @main() {
            entry:
              %r1 = alloca %array.2
              %r2 = getelementptr %array.2, ptr %r1, i64 0, i64 0
              store i64 1, ptr %r2
              %r3 = getelementptr %array.2, ptr %r1, i64 0, i64 1
              store i64 2, ptr %r3
              %r4 = ptrtoint ptr %r1 to i64
              %r5 = inttoptr i64 %r4 to ptr
              %r6 = getelementptr [0 x i64], ptr %r5, i64 0, i64 1
              %r7 = load i64, ptr %r6
              ret i64 %r7
            }
        "}
    );
}

#[test]
fn and_chains_nested_branches() {
    assert_eq!(
        compile("(and 1 2 3)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = icmp ne i64 1, 0
              br i1 %r1, label %and.then, label %and.else
            and.then:
              %r2 = icmp ne i64 2, 0
              br i1 %r2, label %and.then1, label %and.else1
            and.else:
              br label %and.merge
            and.merge:
              %r4 = phi i64 [ %r3, %and.merge1 ], [ 0, %and.else ]
              ret i64 %r4
            and.then1:
              br label %and.merge1
            and.else1:
              br label %and.merge1
            and.merge1:
              %r3 = phi i64 [ 3, %and.then1 ], [ 0, %and.else1 ]
              br label %and.merge
            }
        "}
    );
}

#[test]
fn or_yields_the_first_true_value() {
    assert_eq!(
        compile("(define (f x) (or x 5))"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              ret i64 0
            }

            define i64 @f(i64 %arg.x) {
            entry:
              %r1 = icmp ne i64 %arg.x, 0
              br i1 %r1, label %or.then, label %or.else
            or.then:
              br label %or.merge
            or.else:
              br label %or.merge
            or.merge:
              %r2 = phi i64 [ %arg.x, %or.then ], [ 5, %or.else ]
              ret i64 %r2
            }
        "}
    );
}

#[test]
fn single_operand_or_is_the_operand() {
    assert_eq!(
        compile("(or 7)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              ret i64 7
            }
        "}
    );
}

#[test]
fn not_inverts_truthiness() {
    assert_eq!(
        compile("(not #f)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = icmp ne i64 0, 0
              br i1 %r1, label %not.then, label %not.else
            not.then:
              br label %not.merge
            not.else:
              br label %not.merge
            not.merge:
              %r2 = phi i64 [ 0, %not.then ], [ 1, %not.else ]
              ret i64 %r2
            }
        "}
    );
}

#[test]
fn shifts_and_bitwise_or() {
    assert_eq!(
        compile("(bitor (shl 1 4) (shr 256 2))"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = shl i64 1, 4
              %r2 = lshr i64 256, 2
              %r3 = or i64 %r1, %r2
              ret i64 %r3
            }
        "}
    );
}

#[test]
fn float_comparison_is_widened_to_a_word() {
    assert_eq!(
        compile("(fl< 1.5 2.0)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = bitcast double 0x3FF8000000000000 to i64
              %r2 = bitcast double 0x4000000000000000 to i64
              %r3 = bitcast i64 %r1 to double
              %r4 = bitcast i64 %r2 to double
              %r5 = fcmp olt double %r3, %r4
              %r6 = zext i1 %r5 to i64
              ret i64 %r6
            }
        "}
    );
}

#[test]
fn exact_to_inexact_converts_inline() {
    assert_eq!(
        compile("(exact->inexact 3)"),
        indoc! {"
            ; ModuleID = 'module'

            define i64 @main() {
            entry:
              %r1 = sitofp i64 3 to double
              %r2 = bitcast double %r1 to i64
              ret i64 %r2
            }
        "}
    );
}

#[test]
fn runtime_functions_are_declared_once() {
    let text = compile("(car (cons 1 2)) (cdr (cons 3 4)) (cons 5 6)");

    assert_eq!(text.matches("declare i64 @scm_cons(i64, i64)").count(), 1);
    assert_eq!(text.matches("declare i64 @scm_car(i64)").count(), 1);
    assert_eq!(text.matches("declare i64 @scm_cdr(i64)").count(), 1);
    assert_eq!(text.matches("call i64 @scm_cons(").count(), 3);
}

#[test]
fn let_calls_a_lifted_lambda() {
    let text = compile("(let ((x 1) (y 2)) (+ x y))");

    assert!(text.contains("%r1 = call i64 @lambda(i64 1, i64 2)"));
    assert!(text.contains("define i64 @lambda(i64 %arg.x, i64 %arg.y) {"));
    assert!(text.contains("%r1 = add i64 %arg.x, %arg.y"));
}

#[test]
fn float_arithmetic_goes_through_doubles() {
    let text = compile("(fl+ 1.5 2.0)");

    assert!(text.contains("%r1 = bitcast double 0x3FF8000000000000 to i64"));
    assert!(text.contains("%r5 = fadd double %r3, %r4"));
    assert!(text.contains("%r6 = bitcast double %r5 to i64"));
}

#[test]
fn cond_folds_into_nested_branches() {
    let output = compile_with("(cond (#f 1) (else 2))", &CodegenOptions::default()).unwrap();
    let main = output.module.function("main").unwrap();

    let labels = main
        .blocks
        .iter()
        .map(|b| b.label.value())
        .collect::<Vec<_>>();

    assert_eq!(
        labels,
        vec![
            "entry",
            "cond.then",
            "cond.else",
            "cond.merge",
            "cond.then1",
            "cond.else1",
            "cond.merge1",
        ]
    );
}

#[test]
fn code_after_return_is_not_emitted() {
    let text = compile("(define (f) (return 1) (display 2)) (f)");

    assert!(!text.contains("scm_display"));
    assert!(text.contains("define i64 @f() {\nentry:\n  ret i64 1\n}"));
}

#[test]
fn merge_after_two_returns_is_unreachable() {
    let output = compile_with(
        "(define (f) (if #t (return 1) (return 2)))",
        &CodegenOptions::default(),
    )
    .unwrap();
    let f = output.module.function("f").unwrap();

    assert_eq!(f.blocks.len(), 4);
    assert_eq!(f.block("if.merge").unwrap().terminator, Terminator::Unreachable);
}

#[test]
fn lambdas_cannot_capture_locals() {
    assert_eq!(
        codegen_error("(define (f x) (lambda () x))"),
        CodegenError::UnresolvedSymbol(InternedSymbol::new("x"))
    );
}

#[test]
fn definitions_in_an_arm_stay_in_the_arm() {
    assert_eq!(
        codegen_error("(define (f c) (if c (define x (car c)) 0) x)"),
        CodegenError::UnresolvedSymbol(InternedSymbol::new("x"))
    );
}

#[test]
fn direct_calls_check_arity() {
    assert_eq!(
        codegen_error("(define (f x) x) (f 1 2)"),
        CodegenError::WrongArgumentCount {
            callee: "f".to_string(),
            expected: 1,
            actual: 2,
        }
    );
}

#[test]
fn functions_are_not_assignable() {
    assert_eq!(
        codegen_error("(define (f) 1) (set! f 2)"),
        CodegenError::NotAssignable(InternedSymbol::new("f"))
    );
}

#[test]
fn keep_going_compiles_the_rest() {
    let options = CodegenOptions {
        error_policy: ErrorPolicy::KeepGoing,
        ..Default::default()
    };
    let output = compile_with(
        "(define (broken) missing) (define (fine) 1) (fine)",
        &options,
    )
    .unwrap();

    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].function, InternedSymbol::new("broken"));

    let text = ir::render(&output.module);
    assert!(text.contains("declare i64 @broken()"));
    assert!(text.contains("define i64 @fine() {"));
}

#[test]
fn read_errors_are_reported() {
    assert!(matches!(
        compile_with("(car 1", &CodegenOptions::default()),
        Err(CompileError::Read(_))
    ));
}
