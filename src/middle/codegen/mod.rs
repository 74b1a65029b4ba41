//! Lowers a read program into an IR [`Module`]. Top level definitions are
//! collected first so every function can refer to every global; the entry
//! function is then compiled from the remaining top level forms and lambda
//! bodies are drained from a FIFO worklist, each becoming its own function.

use std::{collections::VecDeque, rc::Rc};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use self::{
    builder::{FinalizedFunction, PendingLambda, word_parameters},
    lowering::CompilationUnit,
    scope::{GlobalEnvironment, GlobalKind},
};
use crate::{
    frontend::{
        ast::{Expression, Program},
        intern::InternedSymbol,
    },
    middle::{
        ir::{Module, Type},
        runtime,
    },
};

pub mod builder;
pub mod instructions;
pub mod lowering;
pub mod names;
pub mod scope;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("block `{0}` has no terminator")]
    TerminatorMissing(InternedSymbol),
    #[error("block `{0}` already has a terminator")]
    DoubleTerminator(InternedSymbol),
    #[error("cannot find `{0}` in this scope")]
    UnresolvedSymbol(InternedSymbol),
    #[error("no function named `{0}` in the module")]
    UnknownFunction(InternedSymbol),
    #[error("block `{0}` cannot be reached from the entry block")]
    UnreachableBlock(InternedSymbol),
    #[error("`{0}` names a function and cannot be assigned")]
    NotAssignable(InternedSymbol),
    #[error("no block with id {0} exists in this function")]
    InvalidBlock(usize),
    #[error("`{callee}` takes {expected} argument(s) but {actual} were supplied")]
    WrongArgumentCount {
        callee: String,
        expected: usize,
        actual: usize,
    },
    #[error("`{0}` is reserved and cannot be defined")]
    ReservedName(InternedSymbol),
}

/// An error attributed to the function whose compilation it aborted
#[derive(Debug, Clone, PartialEq, Error)]
#[error("in function `{function}`: {error}")]
pub struct Diagnostic {
    pub function: InternedSymbol,
    #[source]
    pub error: CodegenError,
}

/// What to do when compiling a function fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first failing function
    #[default]
    Abort,
    /// Record a diagnostic, leave the function's placeholder declaration in
    /// the module and continue with the next function
    KeepGoing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    pub module_name: String,
    /// Name of the function holding the top level forms
    pub entry_name: String,
    pub error_policy: ErrorPolicy,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            module_name: "module".to_string(),
            entry_name: "main".to_string(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationOutput {
    pub module: Module,
    /// Failures skipped under [`ErrorPolicy::KeepGoing`], in the order they
    /// happened
    pub diagnostics: Vec<Diagnostic>,
}

/// Top level functions found before any body is compiled
struct TopLevel {
    globals: Rc<GlobalEnvironment>,
    functions: Vec<PendingLambda>,
    /// Indices of the forms that produced `functions`
    function_forms: Vec<usize>,
}

/// Registers every top level definition: lambdas become function
/// placeholders, anything else a zero initialized global. Only the first
/// definition of a name decides its kind; later ones are assignments.
fn collect_top_level(
    program: &Program,
    unit: &mut CompilationUnit,
) -> Result<TopLevel, CodegenError> {
    let mut globals = GlobalEnvironment::new();
    let mut functions = Vec::new();
    let mut function_forms = Vec::new();

    for (index, form) in program.forms.iter().enumerate() {
        let Expression::Define { name, value } = form else {
            continue;
        };

        // `.` prefixed names belong to generated constants such as `.str`
        if *name == unit.entry_name()
            || runtime::is_runtime_symbol(*name)
            || name.value().starts_with('.')
        {
            return Err(CodegenError::ReservedName(*name));
        }

        if globals.contains_key(name) {
            continue;
        }

        match &**value {
            Expression::Lambda(lambda) => {
                globals.insert(
                    *name,
                    GlobalKind::Function {
                        arity: lambda.parameters.len(),
                    },
                );
                unit.module_mut().define_function(
                    *name,
                    Type::WORD,
                    word_parameters(&lambda.parameters),
                    Vec::new(),
                );

                functions.push((*name, lambda.clone()));
                function_forms.push(index);
            }
            _ => {
                globals.insert(*name, GlobalKind::Variable);
                unit.module_mut().define_global_variable(*name);
            }
        }
    }

    let globals = Rc::new(globals);
    let functions = functions
        .into_iter()
        .map(|(name, lambda)| PendingLambda {
            name,
            lambda,
            globals: globals.clone(),
        })
        .collect();

    Ok(TopLevel {
        globals,
        functions,
        function_forms,
    })
}

/// Swaps the function's placeholder for its finished body and hands back the
/// lambdas found inside it
fn install(unit: &mut CompilationUnit, finalized: FinalizedFunction) -> VecDeque<PendingLambda> {
    let FinalizedFunction {
        definition,
        pending_lambdas,
    } = finalized;

    if let Err(error) = unit.module_mut().remove_function(definition.name) {
        debug!(%error, "no placeholder to replace");
    }

    debug!(
        function = %definition.name,
        blocks = definition.blocks.len(),
        "function finalized"
    );

    unit.module_mut().define_function(
        definition.name,
        definition.return_type,
        definition.parameters,
        definition.blocks,
    );

    pending_lambdas
}

fn report(
    unit: &mut CompilationUnit,
    policy: ErrorPolicy,
    function: InternedSymbol,
    error: CodegenError,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), Diagnostic> {
    let diagnostic = Diagnostic { function, error };

    match policy {
        ErrorPolicy::Abort => Err(diagnostic),
        ErrorPolicy::KeepGoing => {
            let discarded = unit.discard_lifted();
            warn!(%diagnostic, ?discarded, "skipping function");
            diagnostics.push(diagnostic);
            Ok(())
        }
    }
}

#[instrument(skip_all, fields(module = %options.module_name))]
pub fn compile_program(
    program: &Program,
    options: &CodegenOptions,
) -> Result<CompilationOutput, Diagnostic> {
    let entry_name = InternedSymbol::new(&options.entry_name);
    let mut unit = CompilationUnit::new(&options.module_name, entry_name);
    let mut diagnostics = Vec::new();

    unit.module_mut()
        .define_function(entry_name, Type::WORD, Vec::new(), Vec::new());

    let top_level = collect_top_level(program, &mut unit).map_err(|error| Diagnostic {
        function: entry_name,
        error,
    })?;

    let mut worklist = VecDeque::from(top_level.functions);

    match lowering::lower_entry(
        &mut unit,
        &program.forms,
        &top_level.function_forms,
        top_level.globals,
    ) {
        Ok(finalized) => worklist.extend(install(&mut unit, finalized)),
        Err(error) => report(
            &mut unit,
            options.error_policy,
            entry_name,
            error,
            &mut diagnostics,
        )?,
    }

    while let Some(pending) = worklist.pop_front() {
        debug!(function = %pending.name, remaining = worklist.len(), "compiling lambda");

        match lowering::lower_lambda(&mut unit, &pending) {
            Ok(finalized) => worklist.extend(install(&mut unit, finalized)),
            Err(error) => report(
                &mut unit,
                options.error_policy,
                pending.name,
                error,
                &mut diagnostics,
            )?,
        }
    }

    let module = unit.finish();
    info!(
        definitions = module.definitions.len(),
        skipped = diagnostics.len(),
        "module complete"
    );

    Ok(CompilationOutput {
        module,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{SourceFile, reader::Reader},
        middle::ir::Definition,
    };

    fn compile(source: &str, options: &CodegenOptions) -> Result<CompilationOutput, Diagnostic> {
        let program = Reader::read_program(&SourceFile::from_memory(source)).unwrap();
        compile_program(&program, options)
    }

    #[test]
    fn top_level_definitions_are_registered_in_order() {
        let output = compile(
            "(define counter 0) (define (inc x) (+ x 1)) (inc counter)",
            &CodegenOptions::default(),
        )
        .unwrap();

        let names = output
            .module
            .definitions
            .iter()
            .map(|d| d.name().value())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["counter", "main", "inc"]);
        assert!(matches!(
            output.module.definitions[0],
            Definition::GlobalVariable { .. }
        ));
        assert!(output.module.functions().all(|f| !f.is_placeholder()));
    }

    #[test]
    fn entry_name_is_reserved() {
        let error = compile("(define (main) 1)", &CodegenOptions::default()).unwrap_err();

        assert_eq!(
            error.error,
            CodegenError::ReservedName(InternedSymbol::new("main"))
        );
    }

    #[test]
    fn generated_constant_names_are_reserved() {
        let error = compile("(define .str 1) \"hi\"", &CodegenOptions::default()).unwrap_err();

        assert_eq!(
            error.error,
            CodegenError::ReservedName(InternedSymbol::new(".str"))
        );
    }

    #[test]
    fn abort_stops_at_the_first_failure() {
        let error = compile(
            "(define (f) undefined-name) (f)",
            &CodegenOptions::default(),
        )
        .unwrap_err();

        assert_eq!(error.function, InternedSymbol::new("f"));
        assert_eq!(
            error.error,
            CodegenError::UnresolvedSymbol(InternedSymbol::new("undefined-name"))
        );
    }

    #[test]
    fn keep_going_leaves_a_placeholder() {
        let options = CodegenOptions {
            error_policy: ErrorPolicy::KeepGoing,
            ..Default::default()
        };
        let output = compile("(define (f) nope) (define (g) 2) (g)", &options).unwrap();

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].function, InternedSymbol::new("f"));

        assert!(output.module.function("f").unwrap().is_placeholder());
        assert!(!output.module.function("g").unwrap().is_placeholder());
        assert!(!output.module.function("main").unwrap().is_placeholder());
    }

    #[test]
    fn keep_going_drops_lambdas_of_failed_functions() {
        let options = CodegenOptions {
            error_policy: ErrorPolicy::KeepGoing,
            ..Default::default()
        };
        let output = compile("(define (broken) (lambda () 1) missing) 0", &options).unwrap();

        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.module.function("lambda").is_none());
        assert!(output.module.function("broken").unwrap().is_placeholder());
    }

    #[test]
    fn diagnostics_name_the_function() {
        let diagnostic = Diagnostic {
            function: InternedSymbol::new("f"),
            error: CodegenError::NotAssignable(InternedSymbol::new("g")),
        };

        assert_eq!(
            diagnostic.to_string(),
            "in function `f`: `g` names a function and cannot be assigned"
        );
    }
}
