use crate::{
    code::{lookup, read_u16, Instructions, Opcode},
    compiler::Bytecode,
    value::{Closure, CompiledFunction, HashPair, Value},
    BUILTINS,
};
use anyhow::{bail, Result};
use std::{collections::HashMap, rc::Rc};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}

pub struct VirtualMachine {
    pub constants: Vec<Value>,
    pub globals: Vec<Value>,
    stack: Vec<Value>,
    stack_pointer: usize,
    frames: Vec<Frame>,
    frame_index: usize,
}

impl VirtualMachine {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(
            bytecode,
            vec![Value::Null; GLOBALS_SIZE],
        )
    }

    pub fn new_with_globals_store(
        bytecode: Bytecode,
        globals: Vec<Value>,
    ) -> Self {
        let main_function = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main_closure = Closure {
            function: Rc::new(main_function),
            free: Vec::new(),
        };
        let main_frame = Frame::new(Rc::new(main_closure), 0);
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(main_frame);
        Self {
            constants: bytecode.constants,
            globals,
            stack: vec![Value::Null; STACK_SIZE],
            stack_pointer: 0,
            frames,
            frame_index: 1,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            let byte = {
                let frame = self.current_frame();
                let instructions = frame.instructions();
                if frame.ip >= instructions.len() {
                    break;
                }
                instructions[frame.ip]
            };
            self.current_frame_mut().ip += 1;

            let opcode = lookup(byte)?;
            match opcode {
                Opcode::Constant => {
                    let constant_index = self.read_u16_operand() as usize;
                    let constant = self.constants[constant_index].clone();
                    self.push(constant)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div => {
                    self.execute_binary_operation(opcode)?;
                }
                Opcode::True => {
                    self.push(Value::Boolean(true))?;
                }
                Opcode::False => {
                    self.push(Value::Boolean(false))?;
                }
                Opcode::Null => {
                    self.push(Value::Null)?;
                }
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(opcode)?;
                }
                Opcode::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }
                Opcode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(value) => {
                            self.push(Value::Integer(value.wrapping_neg()))?
                        }
                        value => bail!(
                            "unsupported type for negation: {}",
                            value.kind()
                        ),
                    };
                }
                Opcode::Jump => {
                    let target = self.read_u16_operand() as usize;
                    self.current_frame_mut().ip = target;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand() as usize;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }
                Opcode::SetGlobal => {
                    let global_index = self.read_u16_operand() as usize;
                    let value = self.pop()?;
                    self.globals[global_index] = value;
                }
                Opcode::GetGlobal => {
                    let global_index = self.read_u16_operand() as usize;
                    let value = self.globals[global_index].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let local_index = self.read_u8_operand() as usize;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base_pointer + local_index] = value;
                }
                Opcode::GetLocal => {
                    let local_index = self.read_u8_operand() as usize;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + local_index].clone();
                    self.push(value)?;
                }
                Opcode::GetBuiltin => {
                    let builtin_index = self.read_u8_operand() as usize;
                    self.push(Value::Builtin(BUILTINS[builtin_index]))?;
                }
                Opcode::GetFree => {
                    let free_index = self.read_u8_operand() as usize;
                    let value =
                        self.current_frame().closure.free[free_index].clone();
                    self.push(value)?;
                }
                Opcode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
                Opcode::Array => {
                    let num_elements = self.read_u16_operand() as usize;
                    let elements = self.stack
                        [self.stack_pointer - num_elements..self.stack_pointer]
                        .to_vec();
                    self.stack_pointer -= num_elements;
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                Opcode::Hash => {
                    let num_elements = self.read_u16_operand() as usize;
                    let hash = self.build_hash(
                        self.stack_pointer - num_elements,
                        self.stack_pointer,
                    )?;
                    self.stack_pointer -= num_elements;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }
                Opcode::Call => {
                    let num_args = self.read_u8_operand() as usize;
                    self.execute_call(num_args)?;
                }
                Opcode::ReturnValue => {
                    let return_value = self.pop()?;
                    let frame = self.pop_frame();
                    if self.frame_index == 0 {
                        // A return in the top-level program halts the
                        // machine with the value on the stack.
                        self.stack_pointer = frame.base_pointer;
                        self.push(return_value)?;
                        return Ok(());
                    }
                    self.stack_pointer = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Opcode::Return => {
                    let frame = self.pop_frame();
                    if self.frame_index == 0 {
                        self.stack_pointer = frame.base_pointer;
                        self.push(Value::Null)?;
                        return Ok(());
                    }
                    self.stack_pointer = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
                Opcode::Closure => {
                    let constant_index = self.read_u16_operand() as usize;
                    let num_free = self.read_u8_operand() as usize;
                    let function = match &self.constants[constant_index] {
                        Value::Function(function) => function.clone(),
                        value => bail!("not a function: {}", value.kind()),
                    };
                    let free = self.stack
                        [self.stack_pointer - num_free..self.stack_pointer]
                        .to_vec();
                    self.stack_pointer -= num_free;
                    self.push(Value::Closure(Rc::new(Closure {
                        function,
                        free,
                    })))?;
                }
            }
        }
        Ok(())
    }

    pub fn stack_top(&self) -> Option<&Value> {
        if self.stack_pointer == 0 {
            return None;
        }
        Some(&self.stack[self.stack_pointer - 1])
    }

    // The slot just above the stack pointer still holds the value the last
    // OpPop discarded; it is the observation point for expression results.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.stack_pointer]
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frame_index - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.frame_index - 1]
    }

    fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.frame_index >= MAX_FRAMES {
            bail!("frame overflow");
        }
        self.frames.push(frame);
        self.frame_index += 1;
        Ok(())
    }

    fn pop_frame(&mut self) -> Frame {
        self.frame_index -= 1;
        self.frames.pop().unwrap()
    }

    fn read_u8_operand(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let operand = frame.closure.function.instructions[frame.ip];
        frame.ip += 1;
        operand
    }

    fn read_u16_operand(&mut self) -> u16 {
        let frame = self.current_frame_mut();
        let operand = read_u16(&frame.closure.function.instructions[frame.ip..]);
        frame.ip += 2;
        operand
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack_pointer >= STACK_SIZE {
            bail!("stack overflow");
        }
        self.stack[self.stack_pointer] = value;
        self.stack_pointer += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        if self.stack_pointer == 0 {
            bail!("stack underflow");
        }
        self.stack_pointer -= 1;
        Ok(self.stack[self.stack_pointer].clone())
    }

    fn execute_binary_operation(&mut self, opcode: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_binary_integer_operation(opcode, *left, *right)
            }
            (Value::String(left), Value::String(right)) => {
                if opcode != Opcode::Add {
                    bail!("unknown string operator: {:?}", opcode);
                }
                let combined = format!("{}{}", left, right);
                self.push(Value::String(Rc::new(combined)))
            }
            (left, right) => bail!(
                "unsupported types for binary operation: {} {}",
                left.kind(),
                right.kind()
            ),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        opcode: Opcode,
        left: i64,
        right: i64,
    ) -> Result<()> {
        let result = match opcode {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Sub => left.wrapping_sub(right),
            Opcode::Mul => left.wrapping_mul(right),
            Opcode::Div => {
                if right == 0 {
                    bail!("division by zero");
                }
                left.wrapping_div(right)
            }
            opcode => bail!("unknown integer operator: {:?}", opcode),
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, opcode: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        if let (Value::Integer(left), Value::Integer(right)) = (&left, &right)
        {
            let result = match opcode {
                Opcode::Equal => left == right,
                Opcode::NotEqual => left != right,
                Opcode::GreaterThan => left > right,
                opcode => {
                    bail!("unknown integer comparison operator: {:?}", opcode)
                }
            };
            return self.push(Value::Boolean(result));
        }
        let result = match opcode {
            Opcode::Equal => left.identity_eq(&right),
            Opcode::NotEqual => !left.identity_eq(&right),
            opcode => bail!(
                "unknown operator {:?} for types {} {}",
                opcode,
                left.kind(),
                right.kind()
            ),
        };
        self.push(Value::Boolean(result))
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value> {
        let mut pairs = HashMap::new();
        for index in (start..end).step_by(2) {
            let key = self.stack[index].clone();
            let value = self.stack[index + 1].clone();
            let hash_key = key.hash_key()?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(
        &mut self,
        left: Value,
        index: Value,
    ) -> Result<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(index)) => {
                if *index < 0 || *index as usize >= elements.len() {
                    return self.push(Value::Null);
                }
                let element = elements[*index as usize].clone();
                self.push(element)
            }
            (Value::Hash(pairs), index) => {
                let hash_key = index.hash_key()?;
                match pairs.get(&hash_key) {
                    Some(pair) => {
                        let value = pair.value.clone();
                        self.push(value)
                    }
                    None => self.push(Value::Null),
                }
            }
            (left, _) => {
                bail!("index operator not supported: {}", left.kind())
            }
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<()> {
        let callee = self.stack[self.stack_pointer - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => {
                let num_parameters = closure.function.num_parameters;
                if num_args != num_parameters {
                    bail!(
                        "wrong number of arguments: want={}, got={}",
                        num_parameters,
                        num_args
                    );
                }
                let num_locals = closure.function.num_locals;
                let base_pointer = self.stack_pointer - num_args;
                if base_pointer + num_locals > STACK_SIZE {
                    bail!("stack overflow");
                }
                self.push_frame(Frame::new(closure, base_pointer))?;
                self.stack_pointer = base_pointer + num_locals;
                Ok(())
            }
            Value::Builtin(builtin) => {
                let args = self.stack
                    [self.stack_pointer - num_args..self.stack_pointer]
                    .to_vec();
                let result = (builtin.function)(&args)?;
                self.stack_pointer -= num_args + 1;
                self.push(result)
            }
            value => bail!(
                "calling non-closure and non-builtin: {}",
                value.kind()
            ),
        }
    }
}
