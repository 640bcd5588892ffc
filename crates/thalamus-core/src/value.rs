use std::cell::RefCell;
use std::rc::Rc;

use crate::observable::{ObservableDict, ObservableList};

/// A key into an observable collection: a string for dicts, an index for
/// lists. JSON-path addresses serialize dict keys bare and list indices in
/// brackets (`foo.bar[3]`), mirroring the addressing scheme state.cpp builds
/// by walking parent links.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    String(String),
    Index(usize),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::String(s) => write!(f, "{s}"),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// What kind of mutation a `changed`/`recursive_changed` signal reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Set,
    Delete,
}

/// The dynamically-typed value stored in the observable tree. Dicts and
/// lists are reference-counted handles (`Rc<RefCell<_>>`) rather than nested
/// by value, because every collection needs a stable identity for parent
/// back-links and change-signal bookkeeping — the same reason state.cpp
/// keeps its `ObservableCollection`s behind `shared_ptr`.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Dict(Rc<RefCell<ObservableDict>>),
    List(Rc<RefCell<ObservableList>>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Dict(_) => write!(f, "Dict(..)"),
            Value::List(_) => write!(f, "List(..)"),
        }
    }
}

/// Deep equality: scalars compare by value, dicts/lists compare their
/// contents recursively rather than `Rc` identity. Backs the observable
/// tree's idempotent `set`/`erase` (a write that would produce no actual
/// change fires no signal and skips the remote-storage hook).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) => Some(*d as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Rc<RefCell<ObservableDict>>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<ObservableList>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to `serde_json::Value` by recursively copying. Used at the
    /// RPC boundary (eval results, node_request payloads) where collections
    /// cross into a non-reactor-confined representation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::json!(*d),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Dict(d) => {
                let d = d.borrow();
                let mut map = serde_json::Map::new();
                for (k, v) in d.iter() {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::List(l) => {
                let l = l.borrow();
                serde_json::Value::Array(l.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Build a `Value` tree from `serde_json::Value`, creating fresh,
    /// parentless collections. Callers attach the result into the tree with
    /// `ObservableDict::set`/`ObservableList::push`, which fixes up parent
    /// links and fires signals.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => {
                let list = ObservableList::new();
                for item in arr {
                    let v = Value::from_json(item);
                    list.borrow_mut().push_back(v);
                }
                Value::List(list)
            }
            serde_json::Value::Object(map) => {
                let dict = ObservableDict::new();
                for (k, v) in map {
                    let value = Value::from_json(v);
                    dict.borrow_mut().set(k.clone(), value);
                }
                Value::Dict(dict)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
