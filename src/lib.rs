mod builtins;
mod code;
mod compiler;
mod error;
mod lexer;
mod parser;
mod symbol_table;
mod value;
mod vm;

pub use self::{
    builtins::*, code::*, compiler::*, error::*, lexer::*, parser::*, symbol_table::*, value::*,
    vm::*,
};

use std::fmt::Display;

pub(crate) fn flatten<T: Display>(items: &[T], separator: &str) -> String {
    let strings = items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    strings.join(separator)
}

/// Lexes, parses and compiles a whole source file.
pub fn compile(source: &str, file: &str) -> Result<Bytecode> {
    let mut compiler = Compiler::new(file);
    compile_with(&mut compiler, source)
}

/// Compiles `source` on top of whatever `compiler` has already seen. Parse
/// diagnostics come first, followed by those from compilation.
pub fn compile_with(compiler: &mut Compiler, source: &str) -> Result<Bytecode> {
    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(&tokens);
    let program = parser.parse();
    let mut diagnostics = parser.into_errors();

    match compiler.compile(&program) {
        Ok(()) => {}
        Err(Error::Compile {
            diagnostics: compile_diagnostics,
            ..
        }) => diagnostics.extend(compile_diagnostics),
        Err(error) => return Err(error),
    }

    if !diagnostics.is_empty() {
        return Err(Error::Compile {
            file: compiler.file().to_string(),
            diagnostics,
        });
    }

    Ok(compiler.bytecode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};

    #[test]
    fn test_parse_and_compile_diagnostics_are_combined() -> Result<()> {
        let tests = [
            (
                "x = ;\ny",
                "test.sl:1:5: no prefix parse function for ; found\ntest.sl:2:1: undefined identifier 'y'",
            ),
            ("1 = 2", "test.sl:1:3: cannot assign to 1"),
            (
                "a = @\nb",
                "test.sl:1:5: unexpected character '@'\ntest.sl:2:1: undefined identifier 'b'",
            ),
        ];

        for (input, expected) in tests {
            match compile(input, "test.sl") {
                Ok(_) => bail!("Expected compile errors for input: {}", input),
                Err(error) => assert_eq!(error.to_string(), expected, "Failed for input: {}", input),
            }
        }
        Ok(())
    }

    #[test]
    fn test_long_expressions_are_rejected_not_fatal() -> Result<()> {
        let too_long = vec!["1"; 100_000].join(" + ");
        match compile(&too_long, "test.sl") {
            Ok(_) => bail!("Expected a nesting error"),
            Err(error) => assert_eq!(error.kind(), Some(&ErrorKind::NestingTooDeep(MAX_NESTING))),
        }

        let bytecode = compile(&vec!["1"; 100].join(" + "), "test.sl")?;
        let mut vm = VirtualMachine::new("test.sl", bytecode);
        vm.run()?;
        assert_eq!(vm.last_popped(), Value::Integer(100));
        Ok(())
    }

    #[test]
    fn test_compile_with_keeps_definitions() -> Result<()> {
        let mut compiler = Compiler::new("repl");
        compile_with(&mut compiler, "a = 1")?;
        let bytecode = compile_with(&mut compiler, "a + 1")?;
        assert_eq!(bytecode.constants, vec![Value::Integer(1), Value::Integer(1)]);
        Ok(())
    }

    #[test]
    fn test_flatten() {
        assert_eq!(flatten(&[1, 2, 3], ", "), "1, 2, 3");
        assert_eq!(flatten::<i64>(&[], " "), "");
    }
}
