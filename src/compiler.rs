use crate::{
    code::{make, Instructions, Opcode},
    Assign, Block, Bookmark, CompiledFunction, Diagnostic, Error, ErrorKind, Expression, Function,
    If, InfixOperator, Literal, Position, PrefixOperator, Program, Result, Statement, Symbol,
    SymbolScope, SymbolTable, Value, BUILTINS,
};
use std::rc::Rc;

/// Operand written into jumps until their target is known.
const PLACEHOLDER: usize = 9999;

type CompileResult<T> = std::result::Result<T, Diagnostic>;

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
    pub bookmarks: Vec<Bookmark>,
}

impl Bytecode {
    /// Lists the top level instructions followed by every compiled function
    /// in the constant pool.
    pub fn disassemble(&self) -> String {
        let mut sections = vec![self.instructions.disassemble()];
        for (index, constant) in self.constants.iter().enumerate() {
            if let Value::CompiledFunction(function) = constant {
                sections.push(format!(
                    "constant {} {}:\n{}",
                    index,
                    constant,
                    function.instructions.disassemble()
                ));
            }
        }
        sections.join("\n\n")
    }
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    offset: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
    bookmarks: Vec<Bookmark>,
}

impl CompilationScope {
    fn last_is(&self, opcode: Opcode) -> bool {
        matches!(self.last_instruction, Some(last) if last.opcode == opcode)
    }

    /// Extends the bookmark of the previous emission if it came from the same
    /// position, otherwise starts a new one.
    fn bookmark(&mut self, position: Position) {
        let end = self.instructions.len();
        match self.bookmarks.last_mut() {
            Some(last) if last.position == position => last.offset = end,
            _ => self.bookmarks.push(Bookmark::new(end, position)),
        }
    }

    fn remove_last(&mut self) {
        let last = match self.last_instruction {
            Some(last) => last,
            None => return,
        };
        self.instructions.truncate(last.offset);
        self.last_instruction = self.previous_instruction.take();

        let end = self.instructions.len();
        let count = self.bookmarks.len();
        if let Some(bookmark) = self.bookmarks.last().copied() {
            if bookmark.offset > end {
                let previous = match count {
                    0 | 1 => 0,
                    _ => self.bookmarks[count - 2].offset,
                };
                if previous < end {
                    self.bookmarks[count - 1].offset = end;
                } else {
                    self.bookmarks.pop();
                }
            }
        }
    }
}

pub struct Compiler {
    file: String,
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new(file: &str) -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self::new_with_state(file, symbol_table, Vec::new())
    }

    /// Continues from the symbols and constants of an earlier compilation.
    pub fn new_with_state(file: &str, symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            file: file.to_string(),
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn into_symbol_table(self) -> SymbolTable {
        self.symbol_table
    }

    /// Compiles every top level statement. A failing statement is skipped and
    /// compilation carries on with the next one; all failures are returned
    /// together.
    pub fn compile(&mut self, program: &Program) -> Result<()> {
        let mut diagnostics = Vec::new();
        for statement in program.iter() {
            if let Err(diagnostic) = self.compile_statement(statement) {
                diagnostics.push(diagnostic);
                self.unwind();
            }
        }

        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(Error::Compile {
                file: self.file.clone(),
                diagnostics,
            })
        }
    }

    pub fn bytecode(&self) -> Bytecode {
        let scope = &self.scopes[0];
        Bytecode {
            instructions: Instructions(scope.instructions.clone()),
            constants: self.constants.clone(),
            bookmarks: scope.bookmarks.clone(),
        }
    }

    fn unwind(&mut self) {
        self.scopes.truncate(1);
        while self.symbol_table.leave_scope().is_some() {}
    }

    fn scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        let index = self.scopes.len() - 1;
        &mut self.scopes[index]
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbol_table.enter_scope();
    }

    fn leave_scope(
        &mut self,
        position: Position,
    ) -> CompileResult<(CompilationScope, usize, Vec<Symbol>)> {
        let internal = || {
            Diagnostic::new(
                position,
                ErrorKind::Internal("left the top level scope".to_string()),
            )
        };
        if self.scopes.len() < 2 {
            return Err(internal());
        }
        let scope = self.scopes.pop().ok_or_else(internal)?;
        let (num_locals, free_symbols) = self.symbol_table.leave_scope().ok_or_else(internal)?;
        Ok((scope, num_locals, free_symbols))
    }

    fn add_constant(&mut self, constant: Value) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    fn emit(&mut self, opcode: Opcode, operands: &[usize], position: Position) -> CompileResult<usize> {
        let instruction = make(opcode, operands).map_err(|kind| Diagnostic::new(position, kind))?;
        let scope = self.scope_mut();
        let offset = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);
        scope.previous_instruction = scope.last_instruction.replace(EmittedInstruction { opcode, offset });
        scope.bookmark(position);
        Ok(offset)
    }

    /// Rewrites the operand of the jump at `offset`.
    fn change_operand(&mut self, offset: usize, operand: usize, position: Position) -> CompileResult<()> {
        let scope = self.scope_mut();
        let opcode = Opcode::try_from(scope.instructions[offset])
            .map_err(|kind| Diagnostic::new(position, kind))?;
        let instruction = make(opcode, &[operand]).map_err(|kind| Diagnostic::new(position, kind))?;
        scope.instructions[offset..offset + instruction.len()].copy_from_slice(&instruction);
        Ok(())
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last_instruction.as_mut() {
            scope.instructions[last.offset] = Opcode::ReturnValue as u8;
            last.opcode = Opcode::ReturnValue;
        }
    }

    fn compile_statement(&mut self, statement: &Statement) -> CompileResult<()> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[], expression.position())?;
            }
            Statement::Return(value, position) => {
                match value {
                    Some(value) => self.compile_expression(value)?,
                    None => {
                        self.emit(Opcode::Null, &[], *position)?;
                    }
                }
                self.emit(Opcode::ReturnValue, &[], *position)?;
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        block
            .0
            .iter()
            .try_for_each(|statement| self.compile_statement(statement))
    }

    fn compile_expression(&mut self, expression: &Expression) -> CompileResult<()> {
        let position = expression.position();
        match expression {
            Expression::Identifier(identifier) => {
                let symbol = self.symbol_table.resolve(&identifier.name).ok_or_else(|| {
                    Diagnostic::new(
                        position,
                        ErrorKind::UnresolvedIdentifier(identifier.name.to_string()),
                    )
                })?;
                self.load_symbol(&symbol, position)?;
            }
            Expression::Literal(literal, _) => self.compile_literal(literal, position)?,
            Expression::Prefix(prefix) => {
                self.compile_expression(&prefix.right)?;
                let opcode = match prefix.operator {
                    PrefixOperator::Minus => Opcode::Minus,
                    PrefixOperator::Bang => Opcode::Bang,
                };
                self.emit(opcode, &[], position)?;
            }
            Expression::Infix(infix) => {
                let opcode = match infix.operator {
                    InfixOperator::LessThan | InfixOperator::LessThanEqual => {
                        self.compile_expression(&infix.right)?;
                        self.compile_expression(&infix.left)?;
                        match infix.operator {
                            InfixOperator::LessThan => Opcode::GreaterThan,
                            _ => Opcode::GreaterThanEqual,
                        }
                    }
                    operator => {
                        self.compile_expression(&infix.left)?;
                        self.compile_expression(&infix.right)?;
                        infix_opcode(operator)
                    }
                };
                self.emit(opcode, &[], position)?;
            }
            Expression::Assign(assign) => self.compile_assign(assign)?,
            Expression::If(if_expression) => self.compile_if(if_expression)?,
            Expression::Function(function) => self.compile_function(function, None)?,
            Expression::Call(call) => {
                self.compile_expression(&call.function)?;
                for argument in call.arguments.iter() {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[call.arguments.len()], position)?;
            }
            Expression::List(elements, _) => {
                for element in elements.iter() {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::List, &[elements.len()], position)?;
            }
            Expression::Index(index) => {
                self.compile_expression(&index.left)?;
                self.compile_expression(&index.index)?;
                self.emit(Opcode::Index, &[], position)?;
            }
        }
        Ok(())
    }

    fn compile_literal(&mut self, literal: &Literal, position: Position) -> CompileResult<()> {
        match literal {
            Literal::Integer(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[index], position)?;
            }
            Literal::String(value) => {
                let index = self.add_constant(Value::from(value.as_str()));
                self.emit(Opcode::Constant, &[index], position)?;
            }
            Literal::Bool(true) => {
                self.emit(Opcode::True, &[], position)?;
            }
            Literal::Bool(false) => {
                self.emit(Opcode::False, &[], position)?;
            }
            Literal::Null => {
                self.emit(Opcode::Null, &[], position)?;
            }
        }
        Ok(())
    }

    fn compile_assign(&mut self, assign: &Assign) -> CompileResult<()> {
        let name = match assign.target.as_ref() {
            Expression::Identifier(identifier) => identifier.name.as_str(),
            target => {
                return Err(Diagnostic::new(
                    assign.position,
                    ErrorKind::InvalidAssignment(target.to_string()),
                ))
            }
        };

        match assign.value.as_ref() {
            Expression::Function(function) => self.compile_function(function, Some(name))?,
            value => self.compile_expression(value)?,
        }

        let symbol = match self.symbol_table.resolve_assignable(name) {
            Some(symbol) => symbol,
            None => self.symbol_table.define(name),
        };
        let opcode = match symbol.scope {
            SymbolScope::Global => Opcode::SetGlobal,
            _ => Opcode::SetLocal,
        };
        self.emit(opcode, &[symbol.index], assign.position)?;
        Ok(())
    }

    fn compile_if(&mut self, if_expression: &If) -> CompileResult<()> {
        let position = if_expression.position;
        self.compile_expression(&if_expression.condition)?;
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER], position)?;

        self.compile_branch(&if_expression.consequence, position)?;
        let jump = self.emit(Opcode::Jump, &[PLACEHOLDER], position)?;

        let after_consequence = self.scope().instructions.len();
        self.change_operand(jump_not_truthy, after_consequence, position)?;

        match &if_expression.alternative {
            Some(alternative) => self.compile_branch(alternative, position)?,
            None => {
                self.emit(Opcode::Null, &[], position)?;
            }
        }

        let after_alternative = self.scope().instructions.len();
        self.change_operand(jump, after_alternative, position)
    }

    /// Compiles a branch so that it leaves its value on the stack.
    fn compile_branch(&mut self, block: &Block, position: Position) -> CompileResult<()> {
        if block.0.is_empty() {
            self.emit(Opcode::Null, &[], position)?;
            return Ok(());
        }
        self.compile_block(block)?;
        if self.scope().last_is(Opcode::Pop) {
            self.scope_mut().remove_last();
        }
        Ok(())
    }

    fn compile_function(&mut self, function: &Function, name: Option<&str>) -> CompileResult<()> {
        let position = function.position;
        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for parameter in function.parameters.iter() {
            self.symbol_table.define(&parameter.name);
        }

        self.compile_block(&function.body)?;

        if self.scope().last_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.scope().last_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[], position)?;
        }

        let (scope, num_locals, free_symbols) = self.leave_scope(position)?;
        for symbol in free_symbols.iter() {
            self.load_symbol(symbol, position)?;
        }

        let compiled = CompiledFunction {
            instructions: Instructions(scope.instructions),
            num_locals,
            num_parameters: function.parameters.len(),
            bookmarks: scope.bookmarks,
            name: name.map(str::to_string),
        };
        let index = self.add_constant(Value::CompiledFunction(Rc::new(compiled)));
        self.emit(Opcode::Closure, &[index, free_symbols.len()], position)?;
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol, position: Position) -> CompileResult<usize> {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index], position),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index], position),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index], position),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index], position),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[], position),
        }
    }
}

fn infix_opcode(operator: InfixOperator) -> Opcode {
    match operator {
        InfixOperator::Plus => Opcode::Add,
        InfixOperator::Minus => Opcode::Sub,
        InfixOperator::Multiply => Opcode::Mul,
        InfixOperator::Divide => Opcode::Div,
        InfixOperator::Modulo => Opcode::Mod,
        InfixOperator::Equal => Opcode::Equal,
        InfixOperator::NotEqual => Opcode::NotEqual,
        InfixOperator::GreaterThan | InfixOperator::LessThan => Opcode::GreaterThan,
        InfixOperator::GreaterThanEqual | InfixOperator::LessThanEqual => Opcode::GreaterThanEqual,
        InfixOperator::And => Opcode::And,
        InfixOperator::Or => Opcode::Or,
    }
}
