use anyhow::Result;
use rime::{
    Compiler, Lexer, Parser, SymbolTable, Value, VirtualMachine, BUILTINS,
    GLOBALS_SIZE,
};
use rustyline::{error::ReadlineError, Editor};

fn main() -> Result<()> {
    println!(
        r"
Welcome to the Rime programming language REPL!
You may type Rime code below for evaluation.
Enter 'exit' or press 'CTRL+C' to exit the REPL.
    "
    );

    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        println!("No previous history.");
    }

    // Definitions, interned constants, and global bindings survive from one
    // line to the next.
    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBALS_SIZE];

    loop {
        let readline = rl.readline(">> ");
        match readline {
            Ok(line) => match line.as_ref() {
                "exit" => break,
                line => {
                    rl.add_history_entry(line);

                    let mut lexer = Lexer::new(line);
                    let tokens = match lexer.tokenize() {
                        Ok(tokens) => tokens,
                        Err(error) => {
                            eprintln!("Error lexing: {}", error);
                            continue;
                        }
                    };

                    let mut parser = Parser::new(&tokens);
                    let program = match parser.parse() {
                        Ok(program) => program,
                        Err(error) => {
                            eprintln!("Error parsing: {}", error);
                            continue;
                        }
                    };

                    let mut compiler = Compiler::new_with_state(
                        symbol_table.clone(),
                        constants.clone(),
                    );
                    let bytecode = match compiler.compile(&program) {
                        Ok(bytecode) => bytecode,
                        Err(error) => {
                            eprintln!("Error compiling: {}", error);
                            continue;
                        }
                    };
                    symbol_table = compiler.symbol_table;
                    constants = bytecode.constants.clone();

                    let mut vm = VirtualMachine::new_with_globals_store(
                        bytecode,
                        std::mem::take(&mut globals),
                    );
                    if let Err(error) = vm.run() {
                        eprintln!("Error running: {}", error);
                        globals = vm.globals;
                        continue;
                    }

                    let result = vm.last_popped().clone();
                    globals = vm.globals;

                    if result != Value::Null {
                        println!("{}", result);
                    }
                }
            },
            Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("history.txt")?;
    Ok(())
}
