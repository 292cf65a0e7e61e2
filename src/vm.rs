use crate::{
    code::{read_u16, read_u8, Opcode},
    lookup_builtin, resolve_bookmark, Builtin, Bytecode, Closure, CompiledFunction, Error,
    ErrorKind, Result, Value,
};
use std::rc::Rc;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

type Step<T = ()> = std::result::Result<T, ErrorKind>;

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

    fn instructions(&self) -> &[u8] {
        self.closure.function.instructions.as_bytes()
    }
}

pub struct VirtualMachine {
    file: String,
    constants: Vec<Value>,
    globals: Vec<Value>,
    stack: Vec<Value>,
    stack_pointer: usize,
    frames: Vec<Frame>,
}

impl VirtualMachine {
    pub fn new(file: &str, bytecode: Bytecode) -> Self {
        Self::new_with_globals(file, bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Runs against globals left behind by an earlier machine.
    pub fn new_with_globals(file: &str, bytecode: Bytecode, mut globals: Vec<Value>) -> Self {
        globals.resize(GLOBALS_SIZE, Value::Null);

        let main_function = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
            bookmarks: bytecode.bookmarks,
            name: None,
        };
        let main_closure = Rc::new(Closure {
            function: Rc::new(main_function),
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            file: file.to_string(),
            constants: bytecode.constants,
            globals,
            stack: vec![Value::Null; STACK_SIZE],
            stack_pointer: 0,
            frames,
        }
    }

    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped off the stack by the program.
    pub fn last_popped(&self) -> Value {
        self.stack
            .get(self.stack_pointer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn run(&mut self) -> Result<()> {
        while let Some(frame) = self.frames.last() {
            if frame.ip >= frame.instructions().len() {
                if self.frames.len() == 1 {
                    break;
                }
                return Err(self.runtime_error(ErrorKind::Internal(
                    "function ended without returning".to_string(),
                )));
            }
            if let Err(kind) = self.execute_instruction() {
                return Err(self.runtime_error(kind));
            }
        }
        Ok(())
    }

    fn runtime_error(&self, kind: ErrorKind) -> Error {
        let position = self
            .frames
            .last()
            .and_then(|frame| resolve_bookmark(&frame.closure.function.bookmarks, frame.ip))
            .map(|bookmark| bookmark.position)
            .unwrap_or_default();
        Error::Runtime {
            file: self.file.clone(),
            position,
            kind,
        }
    }

    fn current_frame(&self) -> Step<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| ErrorKind::Internal("no active frame".to_string()))
    }

    fn current_frame_mut(&mut self) -> Step<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| ErrorKind::Internal("no active frame".to_string()))
    }

    fn read_opcode(&mut self) -> Step<Opcode> {
        let frame = self.current_frame_mut()?;
        let byte = *frame
            .instructions()
            .get(frame.ip)
            .ok_or_else(|| ErrorKind::Internal("instruction pointer out of range".to_string()))?;
        frame.ip += 1;
        Opcode::try_from(byte)
    }

    fn read_u16_operand(&mut self) -> Step<usize> {
        let frame = self.current_frame_mut()?;
        let operand = frame
            .instructions()
            .get(frame.ip..)
            .and_then(read_u16)
            .ok_or_else(|| ErrorKind::Internal("truncated operand".to_string()))?;
        frame.ip += 2;
        Ok(operand as usize)
    }

    fn read_u8_operand(&mut self) -> Step<usize> {
        let frame = self.current_frame_mut()?;
        let operand = frame
            .instructions()
            .get(frame.ip..)
            .and_then(read_u8)
            .ok_or_else(|| ErrorKind::Internal("truncated operand".to_string()))?;
        frame.ip += 1;
        Ok(operand as usize)
    }

    fn push(&mut self, value: Value) -> Step {
        if self.stack_pointer >= STACK_SIZE {
            return Err(ErrorKind::StackOverflow);
        }
        self.stack[self.stack_pointer] = value;
        self.stack_pointer += 1;
        Ok(())
    }

    /// Moves the stack pointer down. The value stays in its slot so that
    /// `last_popped` can still see it.
    fn pop(&mut self) -> Step<Value> {
        if self.stack_pointer == 0 {
            return Err(ErrorKind::Internal("stack underflow".to_string()));
        }
        self.stack_pointer -= 1;
        Ok(self.stack[self.stack_pointer].clone())
    }

    fn peek(&self) -> Step<Value> {
        self.stack_pointer
            .checked_sub(1)
            .map(|index| self.stack[index].clone())
            .ok_or_else(|| ErrorKind::Internal("stack underflow".to_string()))
    }

    /// Index of the first of the topmost `count` stack values.
    fn stack_start(&self, count: usize) -> Step<usize> {
        self.stack_pointer
            .checked_sub(count)
            .ok_or_else(|| ErrorKind::Internal("stack underflow".to_string()))
    }

    fn execute_instruction(&mut self) -> Step {
        let opcode = self.read_opcode()?;
        match opcode {
            Opcode::Constant => {
                let index = self.read_u16_operand()?;
                let constant = self.constants.get(index).cloned().ok_or_else(|| {
                    ErrorKind::Internal(format!("constant {} does not exist", index))
                })?;
                self.push(constant)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                self.execute_binary_operation(opcode)?;
            }
            Opcode::True => self.push(Value::Bool(true))?,
            Opcode::False => self.push(Value::Bool(false))?,
            Opcode::Null => self.push(Value::Null)?,
            Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan | Opcode::GreaterThanEqual => {
                self.execute_comparison(opcode)?;
            }
            Opcode::And | Opcode::Or => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = match opcode {
                    Opcode::And => left.is_truthy() && right.is_truthy(),
                    _ => left.is_truthy() || right.is_truthy(),
                };
                self.push(Value::Bool(result))?;
            }
            Opcode::Minus => match self.pop()? {
                Value::Integer(value) => self.push(Value::Integer(value.wrapping_neg()))?,
                other => {
                    return Err(ErrorKind::UnsupportedPrefixOperator {
                        operator: "-",
                        operand: other.type_of(),
                    })
                }
            },
            Opcode::Bang => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Opcode::JumpNotTruthy => {
                let target = self.read_u16_operand()?;
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.current_frame_mut()?.ip = target;
                }
            }
            Opcode::Jump => {
                let target = self.read_u16_operand()?;
                self.current_frame_mut()?.ip = target;
            }
            Opcode::GetGlobal => {
                let index = self.read_u16_operand()?;
                let value = self.globals.get(index).cloned().unwrap_or_default();
                self.push(value)?;
            }
            Opcode::SetGlobal => {
                let index = self.read_u16_operand()?;
                let value = self.peek()?;
                let slot = self.globals.get_mut(index).ok_or_else(|| {
                    ErrorKind::Internal(format!("global {} does not exist", index))
                })?;
                *slot = value;
            }
            Opcode::GetLocal => {
                let index = self.read_u8_operand()?;
                let slot = self.current_frame()?.base_pointer + index;
                let value = self.stack.get(slot).cloned().ok_or_else(|| {
                    ErrorKind::Internal(format!("local slot {} does not exist", slot))
                })?;
                self.push(value)?;
            }
            Opcode::SetLocal => {
                let index = self.read_u8_operand()?;
                let slot = self.current_frame()?.base_pointer + index;
                let value = self.peek()?;
                let local = self.stack.get_mut(slot).ok_or_else(|| {
                    ErrorKind::Internal(format!("local slot {} does not exist", slot))
                })?;
                *local = value;
            }
            Opcode::GetBuiltin => {
                let index = self.read_u8_operand()?;
                let builtin = lookup_builtin(index).ok_or_else(|| {
                    ErrorKind::Internal(format!("builtin {} does not exist", index))
                })?;
                self.push(Value::Builtin(builtin))?;
            }
            Opcode::GetFree => {
                let index = self.read_u8_operand()?;
                let value = self
                    .current_frame()?
                    .closure
                    .free
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ErrorKind::Internal(format!("free variable {} does not exist", index)))?;
                self.push(value)?;
            }
            Opcode::CurrentClosure => {
                let closure = self.current_frame()?.closure.clone();
                self.push(Value::Closure(closure))?;
            }
            Opcode::List => {
                let count = self.read_u16_operand()?;
                let start = self.stack_start(count)?;
                let elements = self.stack[start..self.stack_pointer].to_vec();
                self.stack_pointer = start;
                self.push(Value::list(elements))?;
            }
            Opcode::Index => {
                let index = self.pop()?;
                let left = self.pop()?;
                self.execute_index_expression(left, index)?;
            }
            Opcode::Call => {
                let num_args = self.read_u8_operand()?;
                self.execute_call(num_args)?;
            }
            Opcode::ReturnValue => {
                let value = self.pop()?;
                self.return_from_function(value)?;
            }
            Opcode::Return => self.return_from_function(Value::Null)?,
            Opcode::Closure => {
                let index = self.read_u16_operand()?;
                let num_free = self.read_u8_operand()?;
                self.push_closure(index, num_free)?;
            }
        }
        Ok(())
    }

    fn execute_binary_operation(&mut self, opcode: Opcode) -> Step {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                Value::Integer(integer_operation(opcode, *l, *r)?)
            }
            (Value::String(l), Value::String(r)) if opcode == Opcode::Add => {
                let mut concatenated = String::with_capacity(l.len() + r.len());
                concatenated.push_str(l);
                concatenated.push_str(r);
                Value::from(concatenated)
            }
            _ => {
                return Err(ErrorKind::UnsupportedOperator {
                    operator: operator_symbol(opcode),
                    left: left.type_of(),
                    right: right.type_of(),
                })
            }
        };
        self.push(result)
    }

    fn execute_comparison(&mut self, opcode: Opcode) -> Step {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = match opcode {
            Opcode::Equal => values_equal(&left, &right),
            Opcode::NotEqual => !values_equal(&left, &right),
            _ => {
                let ordering = match (&left, &right) {
                    (Value::Integer(l), Value::Integer(r)) => l.cmp(r),
                    (Value::String(l), Value::String(r)) => l.cmp(r),
                    _ => {
                        return Err(ErrorKind::UnsupportedOperator {
                            operator: operator_symbol(opcode),
                            left: left.type_of(),
                            right: right.type_of(),
                        })
                    }
                };
                match opcode {
                    Opcode::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
        };
        self.push(Value::Bool(result))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Step {
        match (&left, &index) {
            (Value::List(elements), Value::Integer(i)) => {
                let element = usize::try_from(*i)
                    .ok()
                    .and_then(|i| elements.borrow().get(i).cloned())
                    .unwrap_or_default();
                self.push(element)
            }
            _ => Err(ErrorKind::UnsupportedIndex {
                left: left.type_of(),
                index: index.type_of(),
            }),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Step {
        let callee_slot = self.stack_start(num_args + 1)?;
        match self.stack[callee_slot].clone() {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            other => Err(ErrorKind::NotCallable(other.type_of())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Step {
        let function = &closure.function;
        if num_args != function.num_parameters {
            return Err(ErrorKind::WrongArgumentCount {
                expected: function.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(ErrorKind::FrameOverflow(MAX_FRAMES));
        }

        let base_pointer = self.stack_start(num_args)?;
        let stack_pointer = base_pointer + function.num_locals;
        if stack_pointer > STACK_SIZE {
            return Err(ErrorKind::StackOverflow);
        }

        let locals_start = (base_pointer + num_args).min(stack_pointer);
        for local in self.stack[locals_start..stack_pointer].iter_mut() {
            *local = Value::Null;
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.stack_pointer = stack_pointer;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, num_args: usize) -> Step {
        let start = self.stack_start(num_args)?;
        let result = (builtin.function)(&self.stack[start..self.stack_pointer])?;
        self.stack_pointer = start - 1;
        self.push(result.unwrap_or_default())
    }

    fn return_from_function(&mut self, value: Value) -> Step {
        if self.frames.len() == 1 {
            // returning from the top level ends the program
            let frame = self.current_frame_mut()?;
            frame.ip = frame.instructions().len();
            return Ok(());
        }

        let frame = self
            .frames
            .pop()
            .ok_or_else(|| ErrorKind::Internal("no active frame".to_string()))?;
        self.stack_pointer = frame
            .base_pointer
            .checked_sub(1)
            .ok_or_else(|| ErrorKind::Internal("stack underflow".to_string()))?;
        self.push(value)
    }

    fn push_closure(&mut self, index: usize, num_free: usize) -> Step {
        let function = match self.constants.get(index) {
            Some(Value::CompiledFunction(function)) => function.clone(),
            Some(other) => return Err(ErrorKind::NotAFunction(other.to_string())),
            None => {
                return Err(ErrorKind::Internal(format!(
                    "constant {} does not exist",
                    index
                )))
            }
        };

        let start = self.stack_start(num_free)?;
        let free = self.stack[start..self.stack_pointer].to_vec();
        self.stack_pointer = start;
        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }
}

fn integer_operation(opcode: Opcode, left: i64, right: i64) -> Step<i64> {
    match opcode {
        Opcode::Add => Ok(left.wrapping_add(right)),
        Opcode::Sub => Ok(left.wrapping_sub(right)),
        Opcode::Mul => Ok(left.wrapping_mul(right)),
        Opcode::Div | Opcode::Mod if right == 0 => Err(ErrorKind::DivisionByZero),
        Opcode::Div => Ok(left.wrapping_div(right)),
        Opcode::Mod => Ok(left.wrapping_rem(right)),
        _ => Err(ErrorKind::Internal(format!("{} is not arithmetic", opcode))),
    }
}

/// Equality as the language sees it: only scalars compare by content.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn operator_symbol(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::GreaterThan => ">",
        Opcode::GreaterThanEqual => ">=",
        _ => "?",
    }
}
