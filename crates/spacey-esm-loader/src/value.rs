// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script values exchanged between the loader and the host
//!
//! The loader only needs a small slice of the host's value space: plain
//! data, shared mutable objects (for `module.exports` and realm globals) and
//! namespace objects. Object equality is identity, mirroring `===`.

use crate::module_system::Namespace;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A script value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Shared mutable object
    Object(Object),
    /// Module namespace object
    Namespace(Namespace),
}

impl Value {
    /// Check if the value is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Borrow the object, if this is one
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow the string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number, if this is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a parsed JSON document into a value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => {
                let obj = Object::new();
                for (i, v) in arr.iter().enumerate() {
                    obj.set(i.to_string(), Value::from_json(v));
                }
                obj.define_hidden("length", Value::Number(arr.len() as f64));
                Value::Object(obj)
            }
            serde_json::Value::Object(map) => {
                let obj = Object::new();
                for (k, v) in map {
                    obj.set(k.clone(), Value::from_json(v));
                }
                Value::Object(obj)
            }
        }
    }
}

/// Strict equality (`===`): objects and namespaces compare by identity
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Namespace(_) => write!(f, "[object Module]"),
        }
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

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Namespace(ns)
    }
}

#[derive(Debug, Clone)]
struct Property {
    value: Value,
    enumerable: bool,
}

/// A shared, insertion-ordered property bag
#[derive(Debug, Clone, Default)]
pub struct Object {
    properties: Arc<RwLock<Vec<(String, Property)>>>,
}

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an object from enumerable entries
    pub fn from_entries<K: Into<String>, V: Into<Value>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let obj = Self::new();
        for (k, v) in entries {
            obj.set(k, v);
        }
        obj
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.properties, &other.properties)
    }

    /// Read an own property
    pub fn get(&self, key: &str) -> Option<Value> {
        self.properties
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.value.clone())
    }

    /// Check for an own property
    pub fn has(&self, key: &str) -> bool {
        self.properties.read().iter().any(|(k, _)| k == key)
    }

    /// Assign a property, keeping its position and enumerability if it exists
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.define(key.into(), value.into(), true, false);
    }

    /// Define a non-enumerable property
    pub fn define_hidden(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.define(key.into(), value.into(), false, true);
    }

    fn define(&self, key: String, value: Value, enumerable: bool, redefine: bool) {
        let mut props = self.properties.write();
        if let Some((_, prop)) = props.iter_mut().find(|(k, _)| *k == key) {
            prop.value = value;
            if redefine {
                prop.enumerable = enumerable;
            }
        } else {
            props.push((key, Property { value, enumerable }));
        }
    }

    /// Remove an own property
    pub fn delete(&self, key: &str) -> bool {
        let mut props = self.properties.write();
        let before = props.len();
        props.retain(|(k, _)| k != key);
        props.len() != before
    }

    /// Own enumerable keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.properties
            .read()
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// All own keys, enumerable or not
    pub fn own_keys(&self) -> Vec<String> {
        self.properties.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Own enumerable entries in insertion order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.properties
            .read()
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect()
    }

    /// Number of own properties
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }

    /// Whether the object has no own properties
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }
}
