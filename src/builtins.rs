use crate::{Builtin, Value};
use anyhow::{bail, Result};
use std::rc::Rc;

// Index order is part of the compiled program: OpGetBuiltin operands index
// into this table, and the compiler seeds its symbol table from it.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        function: len,
    },
    Builtin {
        name: "puts",
        function: puts,
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
];

fn len(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        bail!("wrong number of arguments for len: got={}, want=1", args.len());
    }
    match &args[0] {
        Value::String(value) => Ok(Value::Integer(value.len() as i64)),
        Value::Array(elements) => Ok(Value::Integer(elements.len() as i64)),
        value => bail!("argument to len not supported, got {}", value.kind()),
    }
}

fn puts(args: &[Value]) -> Result<Value> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(Value::Null)
}

fn first(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        bail!(
            "wrong number of arguments for first: got={}, want=1",
            args.len()
        );
    }
    match &args[0] {
        Value::Array(elements) => {
            Ok(elements.first().cloned().unwrap_or(Value::Null))
        }
        value => bail!("argument to first must be an array, got {}", value.kind()),
    }
}

fn last(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        bail!(
            "wrong number of arguments for last: got={}, want=1",
            args.len()
        );
    }
    match &args[0] {
        Value::Array(elements) => {
            Ok(elements.last().cloned().unwrap_or(Value::Null))
        }
        value => bail!("argument to last must be an array, got {}", value.kind()),
    }
}

fn rest(args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        bail!(
            "wrong number of arguments for rest: got={}, want=1",
            args.len()
        );
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Ok(Value::Null);
            }
            Ok(Value::Array(Rc::new(elements[1..].to_vec())))
        }
        value => bail!("argument to rest must be an array, got {}", value.kind()),
    }
}

fn push(args: &[Value]) -> Result<Value> {
    if args.len() != 2 {
        bail!(
            "wrong number of arguments for push: got={}, want=2",
            args.len()
        );
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut extended = elements.as_ref().clone();
            extended.push(args[1].clone());
            Ok(Value::Array(Rc::new(extended)))
        }
        value => {
            bail!("first argument to push must be an array, got {}", value.kind())
        }
    }
}
