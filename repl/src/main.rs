use anyhow::Result;
use rustyline::{error::ReadlineError, Editor};
use sleet::{compile_with, Compiler, SymbolTable, Value, VirtualMachine, GLOBALS_SIZE};

const FILE: &str = "repl";

/// Everything a line can change, kept so a failing line can be undone.
#[derive(Clone)]
struct Session {
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
}

impl Session {
    fn new() -> Self {
        Self {
            symbol_table: Compiler::new(FILE).into_symbol_table(),
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
        }
    }

    /// Runs one line. On error the session is left as it was.
    fn evaluate(&mut self, line: &str) -> sleet::Result<Value> {
        let mut compiler =
            Compiler::new_with_state(FILE, self.symbol_table.clone(), self.constants.clone());
        let bytecode = compile_with(&mut compiler, line)?;
        let constants = bytecode.constants.clone();

        let mut vm = VirtualMachine::new_with_globals(FILE, bytecode, self.globals.clone());
        vm.run()?;
        let result = vm.last_popped();

        self.symbol_table = compiler.into_symbol_table();
        self.constants = constants;
        self.globals = vm.into_globals();
        Ok(result)
    }
}

fn main() -> Result<()> {
    println!(
        r"
Welcome to the Sleet programming language REPL!
You may type Sleet code below for evaluation.
Enter 'exit' or press 'CTRL+C' to exit the REPL.
    "
    );

    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        println!("No previous history.");
    }

    let mut session = Session::new();

    loop {
        let readline = rl.readline("> ");
        match readline {
            Ok(line) => match line.as_ref() {
                "exit" => break,
                line => {
                    rl.add_history_entry(line);
                    match session.evaluate(line) {
                        Ok(Value::Null) => {}
                        Ok(value) => println!("{}", value),
                        Err(error) => eprintln!("{}", error),
                    }
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("history.txt")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keeps_definitions() -> Result<()> {
        let mut session = Session::new();
        let tests = [
            ("a = 5", Value::Integer(5)),
            ("double = fn(x) { x * 2 }; 0", Value::Integer(0)),
            ("double(a)", Value::Integer(10)),
            ("a = a + 1; double(a)", Value::Integer(12)),
        ];

        for (input, expected) in tests {
            let result = session.evaluate(input)?;
            assert_eq!(result, expected, "Failed for input: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_failed_line_is_undone() -> Result<()> {
        let mut session = Session::new();
        session.evaluate("a = 1")?;
        assert!(session.evaluate("b = 2; a + \"x\"").is_err());
        assert!(session.evaluate("b").is_err());
        assert!(session.evaluate("c = undefined").is_err());
        assert_eq!(session.evaluate("a")?, Value::Integer(1));
        Ok(())
    }
}
