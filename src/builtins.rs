use crate::{flatten, Builtin, BuiltinResult, ErrorKind, Value};

/// Native functions in `GetBuiltin` index order.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        function: len,
    },
    Builtin {
        name: "print",
        function: print,
    },
    Builtin {
        name: "first",
        function: first,
    },
    Builtin {
        name: "last",
        function: last,
    },
    Builtin {
        name: "rest",
        function: rest,
    },
    Builtin {
        name: "push",
        function: push,
    },
    Builtin {
        name: "type",
        function: type_name,
    },
    Builtin {
        name: "str",
        function: to_str,
    },
];

pub fn lookup_builtin(index: usize) -> Option<Builtin> {
    BUILTINS.get(index).copied()
}

fn expect_arguments(args: &[Value], expected: usize) -> Result<(), ErrorKind> {
    if args.len() != expected {
        return Err(ErrorKind::WrongArgumentCount {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn len(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Some(Value::Integer(s.chars().count() as i64))),
        Value::List(elements) => Ok(Some(Value::Integer(elements.borrow().len() as i64))),
        other => Err(ErrorKind::UnsupportedArgument {
            builtin: "len",
            got: other.type_of(),
        }),
    }
}

fn print(args: &[Value]) -> BuiltinResult {
    println!("{}", flatten(args, " "));
    Ok(None)
}

fn first(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    match &args[0] {
        Value::List(elements) => Ok(elements.borrow().first().cloned()),
        other => Err(ErrorKind::UnsupportedArgument {
            builtin: "first",
            got: other.type_of(),
        }),
    }
}

fn last(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    match &args[0] {
        Value::List(elements) => Ok(elements.borrow().last().cloned()),
        other => Err(ErrorKind::UnsupportedArgument {
            builtin: "last",
            got: other.type_of(),
        }),
    }
}

fn rest(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    match &args[0] {
        Value::List(elements) => {
            let elements = elements.borrow();
            let rest = elements.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
            Ok(Some(Value::list(rest)))
        }
        other => Err(ErrorKind::UnsupportedArgument {
            builtin: "rest",
            got: other.type_of(),
        }),
    }
}

fn push(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 2)?;
    match &args[0] {
        Value::List(elements) => {
            elements.borrow_mut().push(args[1].clone());
            Ok(Some(args[0].clone()))
        }
        other => Err(ErrorKind::UnsupportedArgument {
            builtin: "push",
            got: other.type_of(),
        }),
    }
}

fn type_name(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    Ok(Some(Value::from(args[0].type_of().to_string())))
}

fn to_str(args: &[Value]) -> BuiltinResult {
    expect_arguments(args, 1)?;
    Ok(Some(Value::from(args[0].to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    fn call(name: &str, args: &[Value]) -> BuiltinResult {
        let builtin = BUILTINS
            .iter()
            .find(|builtin| builtin.name == name)
            .unwrap_or_else(|| panic!("no builtin named {}", name));
        (builtin.function)(args)
    }

    #[test]
    fn test_builtin_order() {
        let names = BUILTINS.iter().map(|b| b.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["len", "print", "first", "last", "rest", "push", "type", "str"]
        );
        assert_eq!(lookup_builtin(5).map(|b| b.name), Some("push"));
        assert!(lookup_builtin(BUILTINS.len()).is_none());
    }

    #[test]
    fn test_builtins() -> Result<()> {
        let list = || Value::list(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        let tests = [
            ("len", vec![Value::from("héllo")], Some(Value::Integer(5))),
            ("len", vec![list()], Some(Value::Integer(3))),
            ("first", vec![list()], Some(Value::Integer(1))),
            ("first", vec![Value::list(vec![])], None),
            ("last", vec![list()], Some(Value::Integer(3))),
            ("last", vec![Value::list(vec![])], None),
            (
                "rest",
                vec![list()],
                Some(Value::list(vec![Value::Integer(2), Value::Integer(3)])),
            ),
            ("rest", vec![Value::list(vec![])], Some(Value::list(vec![]))),
            ("type", vec![Value::Null], Some(Value::from("null"))),
            ("type", vec![list()], Some(Value::from("list"))),
            ("str", vec![Value::Integer(-4)], Some(Value::from("-4"))),
            ("str", vec![list()], Some(Value::from("[1, 2, 3]"))),
        ];

        for (name, args, expected) in tests {
            let result = call(name, &args).context(format!("{}({:?})", name, args))?;
            assert_eq!(result, expected, "Failed for builtin: {}", name);
        }
        Ok(())
    }

    #[test]
    fn test_push_mutates_in_place() -> Result<()> {
        let list = Value::list(vec![]);
        let returned = call("push", &[list.clone(), Value::Integer(9)])?.context("push result")?;
        match (&list, &returned) {
            (Value::List(original), Value::List(result)) => {
                assert!(std::rc::Rc::ptr_eq(original, result));
                assert_eq!(*original.borrow(), vec![Value::Integer(9)]);
            }
            _ => panic!("push should return the list"),
        }
        Ok(())
    }

    #[test]
    fn test_builtin_errors() {
        let tests = [
            (
                "len",
                vec![],
                ErrorKind::WrongArgumentCount {
                    expected: 1,
                    got: 0,
                },
            ),
            (
                "len",
                vec![Value::Integer(1)],
                ErrorKind::UnsupportedArgument {
                    builtin: "len",
                    got: crate::Type::Integer,
                },
            ),
            (
                "push",
                vec![Value::Null, Value::Null],
                ErrorKind::UnsupportedArgument {
                    builtin: "push",
                    got: crate::Type::Null,
                },
            ),
            (
                "rest",
                vec![Value::from("abc")],
                ErrorKind::UnsupportedArgument {
                    builtin: "rest",
                    got: crate::Type::String,
                },
            ),
        ];

        for (name, args, expected) in tests {
            assert_eq!(call(name, &args), Err(expected), "Failed for builtin: {}", name);
        }
    }
}
