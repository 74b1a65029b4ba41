use std::fmt::{self, Display, Formatter};

use colored::Colorize;
use itertools::Itertools;

use super::{
    BasicBlock, Constant, Definition, FunctionDefinition, Instruction, IntegerWidth, Module,
    Operand, Parameter, RegisterId, Statement, Terminator, Type,
};
use crate::frontend::intern::InternedSymbol;

/// Renders the module as plain textual IR for the downstream toolchain
pub fn render(module: &Module) -> String {
    strip_ansi_escapes::strip_str(module.to_string())
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '-' | '$' | '.' | '_'))
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '$' | '.' | '_'))
}

fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            b'"' | b'\\' => format!("\\{b:02X}"),
            0x20..=0x7e => (*b as char).to_string(),
            _ => format!("\\{b:02X}"),
        })
        .collect()
}

/// `@name` or `@"quoted name"` for identifiers the assembler would reject
fn identifier(sigil: char, name: &str) -> String {
    if is_plain_identifier(name) {
        format!("{sigil}{name}")
    } else {
        format!("{sigil}\"{}\"", escape_bytes(name.as_bytes()))
    }
}

fn global_name(name: InternedSymbol) -> String {
    identifier('@', name.value())
}

fn local_name(name: &str) -> String {
    identifier('%', name)
}

fn parameter_name(name: InternedSymbol) -> String {
    local_name(&format!("arg.{}", name.value()))
}

fn label_reference(label: InternedSymbol) -> String {
    format!("{} {}", "label".cyan(), local_name(label.value()).bright_red())
}

impl Display for RegisterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("%r{}", self.number()).yellow())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer(width) => write!(
                f,
                "{}",
                match width {
                    IntegerWidth::I1 => "i1",
                    IntegerWidth::I8 => "i8",
                    IntegerWidth::I64 => "i64",
                }
            ),
            Type::Double => write!(f, "double"),
            Type::Pointer => write!(f, "ptr"),
            Type::Array(element, length) => write!(f, "[{length} x {element}]"),
            Type::Named(name) => write!(f, "{}", local_name(name.value())),
            Type::Function {
                return_type,
                parameters,
            } => write!(f, "{return_type} ({})", parameters.iter().join(", ")),
            Type::Void => write!(f, "void"),
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Constant::Integer {
                width: IntegerWidth::I1,
                value,
            } => (*value != 0).to_string(),
            Constant::Integer { value, .. } => value.to_string(),
            // hexadecimal is the only exact spelling for every double
            Constant::Double(value) => format!("0x{:016X}", value.to_bits()),
        };

        write!(f, "{}", text.purple())
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(id, _) => write!(f, "{id}"),
            Operand::Constant(constant) => write!(f, "{constant}"),
            Operand::Global(name, _) => write!(f, "{}", global_name(*name).blue()),
            Operand::Parameter(name, _) => write!(f, "{}", parameter_name(*name).yellow()),
        }
    }
}

/// Formats an operand prefixed with its type, `i64 %r1`
struct Typed<'a>(&'a Operand);

impl Display for Typed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0.ty(), self.0)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary { opcode, lhs, rhs } => write!(
                f,
                "{} {}, {rhs}",
                opcode.to_string().cyan(),
                Typed(lhs)
            ),
            Instruction::ICmp {
                predicate,
                lhs,
                rhs,
            } => write!(f, "{} {predicate} {}, {rhs}", "icmp".cyan(), Typed(lhs)),
            Instruction::FCmp {
                predicate,
                lhs,
                rhs,
            } => write!(f, "{} {predicate} {}, {rhs}", "fcmp".cyan(), Typed(lhs)),
            Instruction::Alloca { ty } => write!(f, "{} {ty}", "alloca".cyan()),
            Instruction::Load { ty, pointer } => {
                write!(f, "{} {ty}, {}", "load".cyan(), Typed(pointer))
            }
            Instruction::Store { value, pointer } => write!(
                f,
                "{} {}, {}",
                "store".cyan(),
                Typed(value),
                Typed(pointer)
            ),
            Instruction::GetElementPtr { ty, base, index } => write!(
                f,
                "{} {ty}, {}, {} {}, {}",
                "getelementptr".cyan(),
                Typed(base),
                Type::WORD,
                Constant::word(0),
                Typed(index)
            ),
            Instruction::Cast {
                opcode,
                operand,
                to,
            } => write!(
                f,
                "{} {} {} {to}",
                opcode.to_string().cyan(),
                Typed(operand),
                "to".cyan()
            ),
            Instruction::Call {
                return_type,
                callee,
                arguments,
            } => write!(
                f,
                "{} {return_type} {callee}({})",
                "call".cyan(),
                arguments.iter().map(Typed).join(", ")
            ),
            Instruction::Phi { ty, incoming } => write!(
                f,
                "{} {ty} {}",
                "phi".bright_green(),
                incoming
                    .iter()
                    .map(|(value, label)| format!(
                        "[ {value}, {} ]",
                        local_name(label.value()).bright_red()
                    ))
                    .join(", ")
            ),
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(destination) = self.destination {
            write!(f, "{destination} = ")?;
        }

        write!(f, "{}", self.instruction)
    }
}

impl Display for Terminator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Branch(target) => write!(f, "{} {}", "br".cyan(), label_reference(*target)),
            Terminator::ConditionalBranch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {}, {}, {}",
                "br".cyan(),
                Typed(condition),
                label_reference(*positive),
                label_reference(*negative)
            ),
            Terminator::Return(value) => write!(f, "{} {}", "ret".cyan(), Typed(value)),
            Terminator::Unreachable => write!(f, "{}", "unreachable".cyan()),
        }
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = local_name(self.label.value());
        writeln!(f, "{}", format!("{}:", &label[1..]).bright_red())?;

        for statement in &self.statements {
            writeln!(f, "  {statement}")?;
        }

        writeln!(f, "  {}", self.terminator)
    }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, parameter_name(self.name).yellow())
    }
}

impl Display for FunctionDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            return writeln!(
                f,
                "{} {} {}({})",
                "declare".magenta(),
                self.return_type,
                global_name(self.name).blue(),
                self.parameters.iter().map(|p| &p.ty).join(", ")
            );
        }

        writeln!(
            f,
            "{} {} {}({}) {{",
            "define".magenta(),
            self.return_type,
            global_name(self.name).blue(),
            self.parameters.iter().join(", ")
        )?;

        for block in &self.blocks {
            write!(f, "{block}")?;
        }

        writeln!(f, "}}")
    }
}

impl Display for Definition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Definition::GlobalVariable {
                name,
                ty,
                zero_initialized,
            } => {
                let initializer = match (zero_initialized, ty) {
                    (true, Type::Integer(_)) => "0",
                    (true, _) => "zeroinitializer",
                    (false, _) => "undef",
                };

                writeln!(
                    f,
                    "{} = {} {ty} {}",
                    global_name(*name).blue(),
                    "global".magenta(),
                    initializer.purple()
                )
            }
            Definition::Function(function) => write!(f, "{function}"),
            Definition::ExternalDeclaration {
                name,
                return_type,
                parameter_types,
            } => writeln!(
                f,
                "{} {return_type} {}({})",
                "declare".magenta(),
                global_name(*name).blue(),
                parameter_types.iter().join(", ")
            ),
            Definition::TypeAlias { name, ty } => {
                writeln!(f, "{} = {} {ty}", local_name(name.value()), "type".magenta())
            }
            Definition::StringConstant { name, bytes } => writeln!(
                f,
                "{} = {} {} c\"{}\"",
                global_name(*name).blue(),
                "private unnamed_addr constant".magenta(),
                Type::Array(Type::Integer(IntegerWidth::I8).into(), bytes.len() as u64),
                escape_bytes(bytes).purple()
            ),
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", format!("; ModuleID = '{}'", self.name).white())?;

        for definition in &self.definitions {
            writeln!(f)?;
            write!(f, "{definition}")?;
        }

        Ok(())
    }
}
