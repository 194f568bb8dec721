use crate::{code::Instructions, flatten, hash};
use anyhow::{bail, Result};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    rc::Rc,
};

pub type BuiltinFunction = fn(&[Value]) -> Result<Value>;

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

#[derive(Debug, PartialEq, Clone)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct HashKey {
    pub kind: &'static str,
    pub value: u64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    #[default]
    Null,
    String(Rc<String>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<HashMap<HashKey, HashPair>>),
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn hash_key(&self) -> Result<HashKey> {
        let value = match self {
            Value::Integer(value) => *value as u64,
            Value::Boolean(value) => *value as u64,
            Value::String(value) => hash(value.as_str()),
            value => bail!("unusable as hash key: {}", value.kind()),
        };
        Ok(HashKey {
            kind: self.kind(),
            value,
        })
    }

    // Equality as the runtime sees it: integers by value, the Boolean and
    // Null singletons by value, everything else by object identity. Two
    // string values with identical contents but separate allocations are
    // NOT identical.
    pub fn identity_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Null, Value::Null) => true,
            (Value::String(left), Value::String(right)) => {
                Rc::ptr_eq(left, right)
            }
            (Value::Array(left), Value::Array(right)) => {
                Rc::ptr_eq(left, right)
            }
            (Value::Hash(left), Value::Hash(right)) => Rc::ptr_eq(left, right),
            (Value::Function(left), Value::Function(right)) => {
                Rc::ptr_eq(left, right)
            }
            (Value::Closure(left), Value::Closure(right)) => {
                Rc::ptr_eq(left, right)
            }
            (Value::Builtin(left), Value::Builtin(right)) => left == right,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::String(value) => write!(f, "{}", value),
            Value::Array(elements) => {
                write!(f, "[{}]", flatten(elements.as_slice(), ", "))
            }
            Value::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key, pair.value))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Value::Function(_) => write!(f, "<compiled function>"),
            Value::Closure(closure) => {
                write!(f, "<closure free={}>", closure.free.len())
            }
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_keys() -> Result<()> {
        let hello1 = Value::String(Rc::new("Hello World".to_string()));
        let hello2 = Value::String(Rc::new("Hello World".to_string()));
        let diff = Value::String(Rc::new("My name is johnny".to_string()));

        assert_eq!(hello1.hash_key()?, hello2.hash_key()?);
        assert_ne!(hello1.hash_key()?, diff.hash_key()?);
        Ok(())
    }

    #[test]
    fn test_hash_keys_are_type_tagged() -> Result<()> {
        let integer = Value::Integer(1);
        let boolean = Value::Boolean(true);
        assert_ne!(integer.hash_key()?, boolean.hash_key()?);
        Ok(())
    }

    #[test]
    fn test_unhashable_values() {
        let array = Value::Array(Rc::new(vec![Value::Integer(1)]));
        assert!(array.hash_key().is_err());
        assert!(Value::Null.hash_key().is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Integer(1).is_truthy());
        assert!(Value::String(Rc::new(String::new())).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_identity_equality() {
        let shared = Rc::new("a".to_string());
        let left = Value::String(shared.clone());
        let right = Value::String(shared);
        assert!(left.identity_eq(&right));

        let separate = Value::String(Rc::new("a".to_string()));
        assert!(!left.identity_eq(&separate));

        assert!(Value::Integer(3).identity_eq(&Value::Integer(3)));
        assert!(!Value::Integer(3).identity_eq(&Value::Boolean(true)));
        assert!(Value::Null.identity_eq(&Value::Null));
    }

    #[test]
    fn test_display() {
        let array = Value::Array(Rc::new(vec![
            Value::Integer(1),
            Value::String(Rc::new("two".to_string())),
        ]));
        assert_eq!(format!("{}", array), "[1, two]");
        assert_eq!(format!("{}", Value::Null), "null");
    }
}
