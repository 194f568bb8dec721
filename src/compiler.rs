use crate::{
    code::{lookup, make, Instructions, Opcode},
    parser::{Expression, Identifier, Operator, Statement},
    value::{CompiledFunction, Value},
    BUILTINS,
};
use anyhow::{bail, Result};
use std::{collections::HashMap, rc::Rc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    pub store: HashMap<String, Symbol>,
    pub num_definitions: usize,
    pub outer: Option<Box<SymbolTable>>,
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Default::default()
        }
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() {
            SymbolScope::Local
        } else {
            SymbolScope::Global
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        if let Some(ref mut outer) = self.outer {
            if let Some(symbol) = outer.resolve(name) {
                if symbol.scope == SymbolScope::Global
                    || symbol.scope == SymbolScope::Builtin
                {
                    return Some(symbol);
                }
                return Some(self.define_free(symbol));
            }
        }
        None
    }

    // The promoted symbol keeps its original scope in free_symbols so the
    // enclosing scope emits the right load when the closure is built.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

#[derive(Debug)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

pub struct Compiler {
    pub constants: Vec<Value>,
    pub symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self::new_with_state(symbol_table, Vec::new())
    }

    pub fn new_with_state(
        symbol_table: SymbolTable,
        constants: Vec<Value>,
    ) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, program: &[Statement]) -> Result<Bytecode> {
        for statement in program {
            self.compile_statement(statement)?;
        }
        Ok(self.bytecode())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Let(name, value) => {
                let symbol = self.symbol_table.define(name);
                if let Expression::Function(parameters, body) = value {
                    self.compile_function(Some(name.as_str()), parameters, body)?;
                } else {
                    self.compile_expression(value)?;
                }
                match symbol.scope {
                    SymbolScope::Global => {
                        self.emit(Opcode::SetGlobal, &[symbol.index])
                    }
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
        }
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<()> {
        match expression {
            Expression::Identifier(name) => {
                let symbol = match self.symbol_table.resolve(name) {
                    Some(symbol) => symbol,
                    None => bail!("undefined variable {}", name),
                };
                self.load_symbol(&symbol);
            }
            Expression::Integer(value) => {
                let constant = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[constant]);
            }
            Expression::String(value) => {
                let constant = self
                    .add_constant(Value::String(Rc::new(value.to_string())));
                self.emit(Opcode::Constant, &[constant]);
            }
            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expression::Prefix(operator, right) => {
                self.compile_expression(right)?;
                match operator {
                    Operator::Negate => self.emit(Opcode::Minus, &[]),
                    Operator::Not => self.emit(Opcode::Bang, &[]),
                    operator => bail!("unknown operator {}", operator),
                };
            }
            Expression::Infix(left, operator, right) => {
                // There is no less-than opcode: swap the operands and
                // compare greater-than instead.
                if *operator == Operator::LessThan {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator {
                    Operator::Add => self.emit(Opcode::Add, &[]),
                    Operator::Subtract => self.emit(Opcode::Sub, &[]),
                    Operator::Multiply => self.emit(Opcode::Mul, &[]),
                    Operator::Divide => self.emit(Opcode::Div, &[]),
                    Operator::GreaterThan => {
                        self.emit(Opcode::GreaterThan, &[])
                    }
                    Operator::Equal => self.emit(Opcode::Equal, &[]),
                    Operator::NotEqual => self.emit(Opcode::NotEqual, &[]),
                    operator => bail!("unknown operator {}", operator),
                };
            }
            Expression::If(condition, consequence, alternative) => {
                self.compile_expression(condition)?;
                let jump_not_truthy =
                    self.emit(Opcode::JumpNotTruthy, &[9999]);
                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
                let jump = self.emit(Opcode::Jump, &[9999]);
                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy, after_consequence)?;
                match alternative {
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                }
                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump, after_alternative)?;
            }
            Expression::Function(parameters, body) => {
                self.compile_function(None, parameters, body)?;
            }
            Expression::Call(function, arguments) => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            Expression::Hash(pairs) => {
                // Key order in source is irrelevant at runtime; sort by the
                // key's rendering so emission is deterministic.
                let mut sorted: Vec<&(Expression, Expression)> =
                    pairs.iter().collect();
                sorted.sort_by_key(|pair| pair.0.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            Expression::Index(left, index) => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &[Statement]) -> Result<()> {
        for statement in block {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_function(
        &mut self,
        name: Option<&str>,
        parameters: &[Identifier],
        body: &[Statement],
    ) -> Result<()> {
        self.enter_scope();
        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for parameter in parameters {
            self.symbol_table.define(parameter);
        }
        self.compile_block(body)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols.clone();
        let num_locals = self.symbol_table.num_definitions;
        let instructions = self.leave_scope();

        // Load each captured value in the enclosing scope so OpClosure can
        // pop them into the closure's free-variable vector.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: parameters.len(),
        };
        let constant = self.add_constant(Value::Function(Rc::new(function)));
        self.emit(Opcode::Closure, &[constant, free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(Opcode::GetGlobal, &[symbol.index])
            }
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => {
                self.emit(Opcode::GetBuiltin, &[symbol.index])
            }
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> usize {
        let instruction = make(opcode, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(opcode, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let instructions = &mut self.current_scope_mut().instructions;
        let position = instructions.len();
        instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        self.current_scope()
            .last_instruction
            .map(|instruction| instruction.opcode == opcode)
            .unwrap_or(false)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current_scope().last_instruction {
            let new_instruction = make(Opcode::ReturnValue, &[]);
            self.replace_instruction(last.position, &new_instruction);
            self.current_scope_mut().last_instruction =
                Some(EmittedInstruction {
                    opcode: Opcode::ReturnValue,
                    position: last.position,
                });
        }
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    // Back-patches a previously emitted jump with its final target. The
    // replacement must not change the instruction's width.
    fn change_operand(&mut self, position: usize, operand: usize) -> Result<()> {
        let opcode = lookup(self.current_scope().instructions[position])?;
        let new_instruction = make(opcode, &[operand]);
        self.replace_instruction(position, &new_instruction);
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap();
        if let Some(outer) = self.symbol_table.outer.take() {
            self.symbol_table = *outer;
        }
        scope.instructions
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().unwrap()
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().unwrap()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
