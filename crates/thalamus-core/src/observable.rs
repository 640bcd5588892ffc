//! The observable state tree: dicts and lists that fire change signals and
//! can mirror their mutations through a remote-storage hook before they take
//! local effect.
//!
//! Grounded in the original `ObservableCollection`/`ObservableDict`/
//! `ObservableList` trio (state.cpp). The C++ version wraps every access in
//! a `ValueWrapper` that coerces on assignment; here a plain `Value` enum
//! plus direct `&mut` access does the same job with the type system instead
//! of an indirection layer, which is the one deliberate structural
//! departure from the original.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::signal::{Connection, Signal};
use crate::value::{Action, Key, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A callback invoked once a deferred remote-storage mutation has been
/// acknowledged by the remote side; calling it applies the mutation
/// locally.
pub type RemoteAck = Box<dyn FnOnce()>;

/// Hook a dict/list calls before applying a locally-originated mutation.
/// Returns `true` if the mutation is deferred — the hook has taken
/// ownership of the `RemoteAck` and will call it once the remote side
/// confirms, and the local collection must not be mutated yet. Returns
/// `false` to apply immediately (the hook only observed the change, e.g. to
/// mirror it to a log).
pub type RemoteStorageHook = Rc<dyn Fn(Action, String, Value, RemoteAck) -> bool>;

#[derive(Clone)]
enum ParentLink {
    None,
    Dict(Weak<RefCell<ObservableDict>>),
    List(Weak<RefCell<ObservableList>>),
}

impl ParentLink {
    fn key_of(&self, id: u64) -> Option<Key> {
        match self {
            ParentLink::Dict(w) => w.upgrade().and_then(|p| p.borrow().key_of_child(id)),
            ParentLink::List(w) => w.upgrade().and_then(|p| p.borrow().key_of_child(id)),
            ParentLink::None => None,
        }
    }

    fn address_prefix(&self) -> String {
        match self {
            ParentLink::Dict(w) => w.upgrade().map(|p| p.borrow().address()).unwrap_or_default(),
            ParentLink::List(w) => w.upgrade().map(|p| p.borrow().address()).unwrap_or_default(),
            ParentLink::None => String::new(),
        }
    }

    fn bubble(&self, source_id: u64, action: Action, key: &Key, value: &Value) {
        match self {
            ParentLink::Dict(w) => {
                if let Some(p) = w.upgrade() {
                    let p = p.borrow();
                    p.recursive_changed.emit((source_id, action, key.clone(), value.clone()));
                    p.parent.bubble(source_id, action, key, value);
                }
            }
            ParentLink::List(w) => {
                if let Some(p) = w.upgrade() {
                    let p = p.borrow();
                    p.recursive_changed.emit((source_id, action, key.clone(), value.clone()));
                    p.parent.bubble(source_id, action, key, value);
                }
            }
            ParentLink::None => {}
        }
    }
}

fn join_address(prefix: &str, key: &Key) -> String {
    match key {
        Key::String(s) => {
            if prefix.is_empty() {
                s.clone()
            } else {
                format!("{prefix}.{s}")
            }
        }
        Key::Index(i) => format!("{prefix}[{i}]"),
    }
}

/// A `(action, key, value)` triple as delivered to a `changed` listener.
pub type ChangedArgs = (Action, Key, Value);
/// A `(source_collection_id, action, key, value)` quadruple delivered to a
/// `recursive_changed` listener on an ancestor.
pub type RecursiveChangedArgs = (u64, Action, Key, Value);

pub struct ObservableDict {
    id: u64,
    parent: ParentLink,
    self_weak: Weak<RefCell<ObservableDict>>,
    content: BTreeMap<String, Value>,
    remote_storage: Option<RemoteStorageHook>,
    pub changed: Signal<ChangedArgs>,
    pub recursive_changed: Signal<RecursiveChangedArgs>,
}

impl ObservableDict {
    pub fn new() -> Rc<RefCell<ObservableDict>> {
        let rc = Rc::new(RefCell::new(ObservableDict {
            id: next_id(),
            parent: ParentLink::None,
            self_weak: Weak::new(),
            content: BTreeMap::new(),
            remote_storage: None,
            changed: Signal::new(),
            recursive_changed: Signal::new(),
        }));
        rc.borrow_mut().self_weak = Rc::downgrade(&rc);
        rc
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_remote_storage(&mut self, hook: Option<RemoteStorageHook>) {
        self.remote_storage = hook;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.content.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.content.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.content.keys()
    }

    /// Locally-originated set: goes through the remote-storage hook if one
    /// is attached.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.set_inner(key.into(), value, false);
    }

    /// Set arriving from the remote side (mirror stream): applied directly,
    /// bypassing the hook, so it can't re-trigger the hook it came from.
    pub fn set_from_remote(&mut self, key: impl Into<String>, value: Value) {
        self.set_inner(key.into(), value, true);
    }

    fn set_inner(&mut self, key: String, value: Value, from_remote: bool) {
        if self.content.get(&key) == Some(&value) {
            return;
        }
        if from_remote {
            self.apply_set(key, value);
            return;
        }
        match self.remote_storage.clone() {
            None => self.apply_set(key, value),
            Some(hook) => {
                let address = self.child_address(&Key::String(key.clone()));
                let weak = self.self_weak.clone();
                let ack_key = key.clone();
                let ack_value = value.clone();
                let ack: RemoteAck = Box::new(move || {
                    if let Some(rc) = weak.upgrade() {
                        rc.borrow_mut().apply_set(ack_key, ack_value);
                    }
                });
                let deferred = hook(Action::Set, address, value.clone(), ack);
                if !deferred {
                    self.apply_set(key, value);
                }
            }
        }
    }

    fn apply_set(&mut self, key: String, value: Value) {
        match &value {
            Value::Dict(d) => d.borrow_mut().parent = ParentLink::Dict(self.self_weak.clone()),
            Value::List(l) => l.borrow_mut().parent = ParentLink::Dict(self.self_weak.clone()),
            _ => {}
        }
        self.content.insert(key.clone(), value.clone());
        self.notify(Action::Set, &Key::String(key), &value);
    }

    pub fn erase(&mut self, key: &str) -> bool {
        self.erase_inner(key, false)
    }

    pub fn erase_from_remote(&mut self, key: &str) -> bool {
        self.erase_inner(key, true)
    }

    fn erase_inner(&mut self, key: &str, from_remote: bool) -> bool {
        if !self.content.contains_key(key) {
            return false;
        }
        if from_remote {
            return self.apply_erase(key);
        }
        match self.remote_storage.clone() {
            None => self.apply_erase(key),
            Some(hook) => {
                let address = self.child_address(&Key::String(key.to_string()));
                let weak = self.self_weak.clone();
                let ack_key = key.to_string();
                let ack: RemoteAck = Box::new(move || {
                    if let Some(rc) = weak.upgrade() {
                        rc.borrow_mut().apply_erase(&ack_key);
                    }
                });
                let deferred = hook(Action::Delete, address, Value::Null, ack);
                if !deferred {
                    self.apply_erase(key)
                } else {
                    true
                }
            }
        }
    }

    fn apply_erase(&mut self, key: &str) -> bool {
        match self.content.remove(key) {
            Some(old) => {
                self.notify(Action::Delete, &Key::String(key.to_string()), &old);
                true
            }
            None => false,
        }
    }

    /// Replace the whole dict's contents at once (full resync on mirror
    /// attach), firing one `changed`/`recursive_changed` pair per key.
    pub fn recap(&mut self, entries: Vec<(String, Value)>) {
        let old_keys: Vec<String> = self.content.keys().cloned().collect();
        for k in old_keys {
            self.apply_erase(&k);
        }
        for (k, v) in entries {
            self.apply_set(k, v);
        }
    }

    pub fn connect_changed(&self, slot: impl FnMut(&ChangedArgs) + 'static) -> Connection {
        self.changed.connect(slot)
    }

    pub fn connect_recursive_changed(
        &self,
        slot: impl FnMut(&RecursiveChangedArgs) + 'static,
    ) -> Connection {
        self.recursive_changed.connect(slot)
    }

    fn notify(&self, action: Action, key: &Key, value: &Value) {
        self.changed.emit((action, key.clone(), value.clone()));
        self.parent.bubble(self.id, action, key, value);
    }

    fn key_of_child(&self, id: u64) -> Option<Key> {
        for (k, v) in &self.content {
            let matches = match v {
                Value::Dict(d) => d.borrow().id == id,
                Value::List(l) => l.borrow().id == id,
                _ => false,
            };
            if matches {
                return Some(Key::String(k.clone()));
            }
        }
        None
    }

    /// JSON-path address of this dict itself, e.g. `root.channels`.
    pub fn address(&self) -> String {
        match self.parent.key_of(self.id) {
            Some(key) => join_address(&self.parent.address_prefix(), &key),
            None => String::new(),
        }
    }

    fn child_address(&self, key: &Key) -> String {
        join_address(&self.address(), key)
    }
}

pub struct ObservableList {
    id: u64,
    parent: ParentLink,
    self_weak: Weak<RefCell<ObservableList>>,
    content: Vec<Value>,
    remote_storage: Option<RemoteStorageHook>,
    pub changed: Signal<ChangedArgs>,
    pub recursive_changed: Signal<RecursiveChangedArgs>,
}

impl ObservableList {
    pub fn new() -> Rc<RefCell<ObservableList>> {
        let rc = Rc::new(RefCell::new(ObservableList {
            id: next_id(),
            parent: ParentLink::None,
            self_weak: Weak::new(),
            content: Vec::new(),
            remote_storage: None,
            changed: Signal::new(),
            recursive_changed: Signal::new(),
        }));
        rc.borrow_mut().self_weak = Rc::downgrade(&rc);
        rc
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_remote_storage(&mut self, hook: Option<RemoteStorageHook>) {
        self.remote_storage = hook;
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.content.get(index)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.content.iter()
    }

    pub fn push_back(&mut self, value: Value) {
        let index = self.content.len();
        self.set_inner(index, value, false);
    }

    pub fn push_back_from_remote(&mut self, value: Value) {
        let index = self.content.len();
        self.set_inner(index, value, true);
    }

    pub fn pop_back(&mut self) -> Option<Value> {
        if self.content.is_empty() {
            return None;
        }
        let index = self.content.len() - 1;
        self.erase_inner(index, false);
        None
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.set_inner(index, value, false);
    }

    /// Set arriving from the remote side; bypasses the hook like
    /// [`ObservableDict::set_from_remote`].
    pub fn set_from_remote(&mut self, index: usize, value: Value) {
        self.set_inner(index, value, true);
    }

    /// Erase arriving from the remote side; bypasses the hook like
    /// [`ObservableDict::erase_from_remote`].
    pub fn erase_from_remote(&mut self, index: usize) -> bool {
        self.erase_inner(index, true)
    }

    fn set_inner(&mut self, index: usize, value: Value, from_remote: bool) {
        if self.content.get(index) == Some(&value) {
            return;
        }
        if from_remote {
            self.apply_set(index, value);
            return;
        }
        match self.remote_storage.clone() {
            None => self.apply_set(index, value),
            Some(hook) => {
                let address = self.child_address(&Key::Index(index));
                let weak = self.self_weak.clone();
                let ack_value = value.clone();
                let ack: RemoteAck = Box::new(move || {
                    if let Some(rc) = weak.upgrade() {
                        rc.borrow_mut().apply_set(index, ack_value);
                    }
                });
                let deferred = hook(Action::Set, address, value.clone(), ack);
                if !deferred {
                    self.apply_set(index, value);
                }
            }
        }
    }

    fn apply_set(&mut self, index: usize, value: Value) {
        match &value {
            Value::Dict(d) => d.borrow_mut().parent = ParentLink::List(self.self_weak.clone()),
            Value::List(l) => l.borrow_mut().parent = ParentLink::List(self.self_weak.clone()),
            _ => {}
        }
        if index == self.content.len() {
            self.content.push(value.clone());
        } else {
            self.content[index] = value.clone();
        }
        self.notify(Action::Set, &Key::Index(index), &value);
    }

    pub fn erase(&mut self, index: usize) -> bool {
        self.erase_inner(index, false)
    }

    fn erase_inner(&mut self, index: usize, from_remote: bool) -> bool {
        if index >= self.content.len() {
            return false;
        }
        if from_remote {
            return self.apply_erase(index);
        }
        match self.remote_storage.clone() {
            None => self.apply_erase(index),
            Some(hook) => {
                let address = self.child_address(&Key::Index(index));
                let weak = self.self_weak.clone();
                let ack: RemoteAck = Box::new(move || {
                    if let Some(rc) = weak.upgrade() {
                        rc.borrow_mut().apply_erase(index);
                    }
                });
                let deferred = hook(Action::Delete, address, Value::Null, ack);
                if !deferred {
                    self.apply_erase(index)
                } else {
                    true
                }
            }
        }
    }

    fn apply_erase(&mut self, index: usize) -> bool {
        if index >= self.content.len() {
            return false;
        }
        let old = self.content.remove(index);
        self.notify(Action::Delete, &Key::Index(index), &old);
        true
    }

    pub fn recap(&mut self, entries: Vec<Value>) {
        let len = self.content.len();
        for i in (0..len).rev() {
            self.apply_erase(i);
        }
        for v in entries {
            let idx = self.content.len();
            self.apply_set(idx, v);
        }
    }

    pub fn connect_changed(&self, slot: impl FnMut(&ChangedArgs) + 'static) -> Connection {
        self.changed.connect(slot)
    }

    pub fn connect_recursive_changed(
        &self,
        slot: impl FnMut(&RecursiveChangedArgs) + 'static,
    ) -> Connection {
        self.recursive_changed.connect(slot)
    }

    fn notify(&self, action: Action, key: &Key, value: &Value) {
        self.changed.emit((action, key.clone(), value.clone()));
        self.parent.bubble(self.id, action, key, value);
    }

    fn key_of_child(&self, id: u64) -> Option<Key> {
        for (i, v) in self.content.iter().enumerate() {
            let matches = match v {
                Value::Dict(d) => d.borrow().id == id,
                Value::List(l) => l.borrow().id == id,
                _ => false,
            };
            if matches {
                return Some(Key::Index(i));
            }
        }
        None
    }

    pub fn address(&self) -> String {
        match self.parent.key_of(self.id) {
            Some(key) => join_address(&self.parent.address_prefix(), &key),
            None => String::new(),
        }
    }

    fn child_address(&self, key: &Key) -> String {
        join_address(&self.address(), key)
    }
}

/// Split a JSON-path query into its dotted/bracketed tokens, e.g.
/// `"channels[3].name"` -> `["channels", "3", "name"]`. Mirrors
/// `absl::StrSplit(query, absl::ByAnyChar("[].'\""))` from state.cpp, minus
/// the quote-stripping (quoted keys aren't part of this grammar).
fn tokenize_path(path: &str) -> Vec<String> {
    path.split(|c| c == '.' || c == '[' || c == ']')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a JSON-path address against a root dict, returning a clone of
/// the value if found.
pub fn get_jsonpath(root: &Rc<RefCell<ObservableDict>>, path: &str) -> Option<Value> {
    let tokens = tokenize_path(path);
    let mut current = Value::Dict(root.clone());
    for token in tokens {
        current = match &current {
            Value::Dict(d) => d.borrow().get(&token)?.clone(),
            Value::List(l) => l.borrow().get(token.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

/// Set a value at a JSON-path address, creating intermediate dicts as
/// needed. The last token selects the leaf; everything before it must
/// already resolve to a dict or list.
pub fn set_jsonpath(root: &Rc<RefCell<ObservableDict>>, path: &str, value: Value) -> bool {
    let mut tokens = tokenize_path(path);
    let Some(leaf) = tokens.pop() else { return false };
    let mut current = Value::Dict(root.clone());
    for token in &tokens {
        let next = match &current {
            Value::Dict(d) => d.borrow().get(token).cloned(),
            Value::List(l) => token.parse::<usize>().ok().and_then(|i| l.borrow().get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v @ (Value::Dict(_) | Value::List(_))) => current = v,
            _ => return false,
        }
    }
    match &current {
        Value::Dict(d) => {
            d.borrow_mut().set(leaf, value);
            true
        }
        Value::List(l) => match leaf.parse::<usize>() {
            Ok(idx) => {
                l.borrow_mut().set(idx, value);
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

/// As [`set_jsonpath`], but applies via `set_from_remote` so the mutation
/// doesn't re-enter the remote-storage hook it arrived from.
pub fn set_jsonpath_from_remote(root: &Rc<RefCell<ObservableDict>>, path: &str, value: Value) -> bool {
    let mut tokens = tokenize_path(path);
    let Some(leaf) = tokens.pop() else { return false };
    let mut current = Value::Dict(root.clone());
    for token in &tokens {
        let next = match &current {
            Value::Dict(d) => d.borrow().get(token).cloned(),
            Value::List(l) => token.parse::<usize>().ok().and_then(|i| l.borrow().get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v @ (Value::Dict(_) | Value::List(_))) => current = v,
            _ => return false,
        }
    }
    match &current {
        Value::Dict(d) => {
            d.borrow_mut().set_from_remote(leaf, value);
            true
        }
        Value::List(l) => match leaf.parse::<usize>() {
            Ok(idx) => {
                l.borrow_mut().set_from_remote(idx, value);
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

/// As [`delete_jsonpath`], but applies directly without invoking the
/// remote-storage hook, for the same reason as [`set_jsonpath_from_remote`].
pub fn delete_jsonpath_from_remote(root: &Rc<RefCell<ObservableDict>>, path: &str) -> bool {
    let mut tokens = tokenize_path(path);
    let Some(leaf) = tokens.pop() else { return false };
    let mut current = Value::Dict(root.clone());
    for token in &tokens {
        let next = match &current {
            Value::Dict(d) => d.borrow().get(token).cloned(),
            Value::List(l) => token.parse::<usize>().ok().and_then(|i| l.borrow().get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v @ (Value::Dict(_) | Value::List(_))) => current = v,
            _ => return false,
        }
    }
    match &current {
        Value::Dict(d) => d.borrow_mut().erase_from_remote(&leaf),
        Value::List(l) => match leaf.parse::<usize>() {
            Ok(idx) => l.borrow_mut().erase_from_remote(idx),
            Err(_) => false,
        },
        _ => false,
    }
}

/// Delete the value at a JSON-path address.
pub fn delete_jsonpath(root: &Rc<RefCell<ObservableDict>>, path: &str) -> bool {
    let mut tokens = tokenize_path(path);
    let Some(leaf) = tokens.pop() else { return false };
    let mut current = Value::Dict(root.clone());
    for token in &tokens {
        let next = match &current {
            Value::Dict(d) => d.borrow().get(token).cloned(),
            Value::List(l) => token.parse::<usize>().ok().and_then(|i| l.borrow().get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v @ (Value::Dict(_) | Value::List(_))) => current = v,
            _ => return false,
        }
    }
    match &current {
        Value::Dict(d) => d.borrow_mut().erase(&leaf),
        Value::List(l) => match leaf.parse::<usize>() {
            Ok(idx) => l.borrow_mut().erase(idx),
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let dict = ObservableDict::new();
        dict.borrow_mut().set("name", Value::String("probe-1".into()));
        assert_eq!(dict.borrow().get("name").unwrap().as_str(), Some("probe-1"));
    }

    #[test]
    fn nested_address_resolves_via_parent_chain() {
        let root = ObservableDict::new();
        let child = ObservableDict::new();
        child.borrow_mut().set("gain", Value::Double(2.5));
        root.borrow_mut().set("channel", Value::Dict(child.clone()));
        assert_eq!(child.borrow().address(), "channel");
        assert_eq!(get_jsonpath(&root, "channel.gain").unwrap().as_f64(), Some(2.5));
    }

    #[test]
    fn recursive_changed_bubbles_to_root_with_original_key() {
        let root = ObservableDict::new();
        let child = ObservableDict::new();
        root.borrow_mut().set("channel", Value::Dict(child.clone()));

        let seen: Rc<RefCell<Vec<Key>>> = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let _conn = root.borrow().connect_recursive_changed(move |(_, _, key, _)| {
            seen2.borrow_mut().push(key.clone());
        });

        child.borrow_mut().set("gain", Value::Double(1.0));
        assert_eq!(seen.borrow().as_slice(), &[Key::String("gain".to_string())]);
    }

    #[test]
    fn remote_storage_hook_defers_local_mutation() {
        let dict = ObservableDict::new();
        let pending: Rc<RefCell<Option<RemoteAck>>> = Rc::new(RefCell::new(None));
        let pending2 = pending.clone();
        let hook: RemoteStorageHook = Rc::new(move |_action, _addr, _value, ack| {
            *pending2.borrow_mut() = Some(ack);
            true
        });
        dict.borrow_mut().set_remote_storage(Some(hook));
        dict.borrow_mut().set("x", Value::Int(1));
        assert!(dict.borrow().get("x").is_none(), "mutation should be deferred");

        let ack = pending.borrow_mut().take().unwrap();
        ack();
        assert_eq!(dict.borrow().get("x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn list_push_and_erase() {
        let list = ObservableList::new();
        list.borrow_mut().push_back(Value::Int(1));
        list.borrow_mut().push_back(Value::Int(2));
        assert_eq!(list.borrow().len(), 2);
        list.borrow_mut().erase(0);
        assert_eq!(list.borrow().get(0).unwrap().as_i64(), Some(2));
    }

    #[test]
    fn set_jsonpath_from_remote_applies_without_invoking_hook() {
        let root = ObservableDict::new();
        let a = ObservableDict::new();
        let b = ObservableDict::new();
        a.borrow_mut().set("b", Value::Dict(b.clone()));
        root.borrow_mut().set("a", Value::Dict(a));

        let hook_calls: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
        let hook_calls2 = hook_calls.clone();
        let hook: RemoteStorageHook = Rc::new(move |_action, _addr, _value, _ack| {
            *hook_calls2.borrow_mut() += 1;
            true
        });
        b.borrow_mut().set_remote_storage(Some(hook));

        assert!(set_jsonpath_from_remote(&root, "a.b.c", Value::Int(5)));
        assert_eq!(get_jsonpath(&root, "a.b.c").unwrap().as_i64(), Some(5));
        assert_eq!(*hook_calls.borrow(), 0, "inbound mirror mutation must not re-enter the local hook");

        assert!(delete_jsonpath_from_remote(&root, "a.b.c"));
        assert!(get_jsonpath(&root, "a.b.c").is_none());
        assert_eq!(*hook_calls.borrow(), 0);
    }

    #[test]
    fn set_is_idempotent_and_skips_the_remote_hook() {
        let dict = ObservableDict::new();
        dict.borrow_mut().set("x", Value::Int(1));

        let fired: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();
        let _conn = dict.borrow().connect_changed(move |_| *fired2.borrow_mut() += 1);

        let hook_calls: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));
        let hook_calls2 = hook_calls.clone();
        let hook: RemoteStorageHook = Rc::new(move |_action, _addr, _value, ack| {
            *hook_calls2.borrow_mut() += 1;
            ack();
            false
        });
        dict.borrow_mut().set_remote_storage(Some(hook));

        dict.borrow_mut().set("x", Value::Int(1));
        assert_eq!(*fired.borrow(), 0, "setting the same value must not emit `changed`");
        assert_eq!(*hook_calls.borrow(), 0, "setting the same value must not invoke the remote-storage hook");

        dict.borrow_mut().set("x", Value::Int(2));
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(*hook_calls.borrow(), 1);
    }

    #[test]
    fn set_jsonpath_from_remote_applies_through_list_index() {
        let root = ObservableDict::new();
        let items = ObservableList::new();
        items.borrow_mut().push_back(Value::Int(0));
        root.borrow_mut().set("items", Value::List(items));

        assert!(set_jsonpath_from_remote(&root, "items[0]", Value::Int(42)));
        assert_eq!(get_jsonpath(&root, "items[0]").unwrap().as_i64(), Some(42));
    }
}
