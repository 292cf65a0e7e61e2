use crate::{Bookmark, ErrorKind, Instructions};
use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

/// Nesting depth past which lists are displayed as `[...]`.
const MAX_DISPLAY_DEPTH: usize = 16;

pub type BuiltinResult = Result<Option<Value>, ErrorKind>;
pub type BuiltinFunction = fn(&[Value]) -> BuiltinResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Integer,
    String,
    Bool,
    Null,
    List,
    Function,
    Closure,
    Builtin,
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            Type::Integer => "int",
            Type::String => "string",
            Type::Bool => "bool",
            Type::Null => "null",
            Type::List => "list",
            Type::Function => "function",
            Type::Closure => "closure",
            Type::Builtin => "builtin",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub bookmarks: Vec<Bookmark>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub function: BuiltinFunction,
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    Integer(i64),
    String(Rc<str>),
    Bool(bool),
    #[default]
    Null,
    List(Rc<RefCell<Vec<Value>>>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

impl Value {
    pub fn list(elements: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(elements)))
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Integer(_) => Type::Integer,
            Value::String(_) => Type::String,
            Value::Bool(_) => Type::Bool,
            Value::Null => Type::Null,
            Value::List(_) => Type::List,
            Value::CompiledFunction(_) => Type::Function,
            Value::Closure(_) => Type::Closure,
            Value::Builtin(_) => Type::Builtin,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            Value::Null => false,
            Value::Integer(0) => false,
            _ => true,
        }
    }

    fn write_nested(&self, f: &mut Formatter, depth: usize) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(_) if depth >= MAX_DISPLAY_DEPTH => write!(f, "[...]"),
            Value::List(elements) => {
                write!(f, "[")?;
                for (index, element) in elements.borrow().iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    element.write_nested(f, depth + 1)?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other),
        }
    }
}

/// Structural equality, used by tests and constant pool comparisons. The
/// language's own `==` lives in the virtual machine.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Null, Value::Null) => true,
            (Value::List(l), Value::List(r)) => Rc::ptr_eq(l, r) || *l.borrow() == *r.borrow(),
            (Value::CompiledFunction(l), Value::CompiledFunction(r)) => l == r,
            (Value::Closure(l), Value::Closure(r)) => Rc::ptr_eq(l, r),
            (Value::Builtin(l), Value::Builtin(r)) => l == r,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
            Value::List(_) => self.write_nested(f, 0),
            Value::CompiledFunction(function) => match &function.name {
                Some(name) => write!(f, "<function {}>", name),
                None => write!(f, "<function>"),
            },
            Value::Closure(closure) => match &closure.function.name {
                Some(name) => write!(f, "<closure {}>", name),
                None => write!(f, "<closure>"),
            },
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::list(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_truthiness() {
        let tests = [
            (Value::Integer(42), true),
            (Value::Integer(0), false),
            (Value::Bool(true), true),
            (Value::Bool(false), false),
            (Value::Null, false),
            (Value::from(""), true),
            (Value::list(vec![]), true),
        ];

        for (value, expected) in tests {
            assert_eq!(value.is_truthy(), expected, "{:?}", value);
        }
    }

    #[test]
    fn test_value_types() {
        assert_eq!(Value::Integer(1).type_of(), Type::Integer);
        assert_eq!(Value::from("a").type_of(), Type::String);
        assert_eq!(Value::Null.type_of(), Type::Null);
        assert_eq!(Value::list(vec![]).type_of().to_string(), "list");
    }

    #[test]
    fn test_value_display() {
        let list = Value::list(vec![
            Value::Integer(1),
            Value::from("two"),
            Value::list(vec![Value::Bool(true), Value::Null]),
        ]);
        assert_eq!(list.to_string(), r#"[1, "two", [true, null]]"#);
        assert_eq!(Value::from("plain").to_string(), "plain");
    }

    #[test]
    fn test_self_referential_list_display() {
        let list = Value::list(vec![Value::Integer(1)]);
        if let Value::List(elements) = &list {
            elements.borrow_mut().push(list.clone());
        }
        assert!(list.to_string().ends_with("[...]]]"));
    }

    #[test]
    fn test_lists_share_storage() {
        let list = Value::list(vec![]);
        let alias = list.clone();
        if let Value::List(elements) = &alias {
            elements.borrow_mut().push(Value::Integer(7));
        }
        assert_eq!(list, Value::list(vec![Value::Integer(7)]));
    }
}
