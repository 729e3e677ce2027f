// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script values, export tables and the native call convention.
//!
//! Every native callable, including module initializers, uses one C ABI:
//!
//! ```text
//! unsafe extern "C" fn(ctx: *mut Context) -> c_int
//! ```
//!
//! Arguments sit on the context's value stack. The return code follows the
//! usual embedded-engine convention: [`RET_VALUE`] means the top of the stack
//! is the result, [`RET_UNDEFINED`] means no result, and a negative code
//! raises the message set with [`Context::throw`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::os::raw::c_int;
use std::sync::Arc;

/// The top of the stack is the return value
pub const RET_VALUE: c_int = 1;
/// The call returns undefined
pub const RET_UNDEFINED: c_int = 0;
/// The call failed, see [`Context::throw`]
pub const RET_ERROR: c_int = -1;
/// Pass all arguments through instead of a fixed count
pub const VARARGS: i32 = -1;

/// Raw native function pointer
pub type NativeFn = unsafe extern "C" fn(ctx: *mut Context) -> c_int;

/// Keeps the code behind a function pointer mapped while it is held
pub(crate) type Owner = Arc<dyn Any + Send + Sync>;

/// A script value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Native function
    Function(NativeFunction),
    /// Object with named properties
    Object(ExportTable),
}

impl Value {
    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Borrow the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the object payload, if any.
    pub fn as_object(&self) -> Option<&ExportTable> {
        match self {
            Value::Object(table) => Some(table),
            _ => None,
        }
    }

    /// Attach `owner` to every function that has none, recursively
    pub(crate) fn adopt(&mut self, owner: &Owner) {
        match self {
            Value::Function(func) if func.owner.is_none() => func.owner = Some(Arc::clone(owner)),
            Value::Object(table) => table.adopt(owner),
            _ => {}
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Object(_) => "object",
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
            Value::Function(func) => write!(f, "[Function (native, {} args)]", func.nargs),
            Value::Object(_) => write!(f, "[object Object]"),
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// A native function together with its declared argument count.
///
/// Functions resolved from a shared library hold a reference to the
/// library mapping, as does every function they return. The library is
/// only unloaded once the last of them is dropped.
#[derive(Clone)]
pub struct NativeFunction {
    func: NativeFn,
    nargs: i32,
    owner: Option<Owner>,
}

impl NativeFunction {
    /// Wrap a raw function pointer. `nargs` is the number of arguments the
    /// callee sees, or [`VARARGS`].
    ///
    /// `func` must stay callable for as long as the returned value lives.
    /// That holds for functions compiled into the host and for everything
    /// reached through [`crate::LibraryHandle::function`].
    pub const fn new(func: NativeFn, nargs: i32) -> Self {
        Self { func, nargs, owner: None }
    }

    pub(crate) fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Declared argument count
    pub fn nargs(&self) -> i32 {
        self.nargs
    }

    /// Whether this function keeps a loaded library mapped
    pub fn is_library_backed(&self) -> bool {
        self.owner.is_some()
    }

    /// Call the function with a fresh context holding `args`.
    ///
    /// Functions in the result inherit this function's library reference.
    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        let mut ctx = Context::with_args(args, self.nargs);
        // SAFETY: `ctx` is a live, exclusively borrowed context for the whole
        // call, and `owner` keeps the code mapped while `self` exists.
        let ret = unsafe { (self.func)(&mut ctx) };
        let mut result = ctx.finish(ret);
        if let (Ok(value), Some(owner)) = (&mut result, &self.owner) {
            value.adopt(owner);
        }
        result
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.func, other.func) && self.nargs == other.nargs
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("func", &(self.func as *const ()))
            .field("nargs", &self.nargs)
            .field("library_backed", &self.owner.is_some())
            .finish()
    }
}

/// Mapping of names to values exposed by a module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTable {
    entries: BTreeMap<String, Value>,
}

impl ExportTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert a native function
    pub fn insert_function(&mut self, key: impl Into<String>, func: NativeFn, nargs: i32) {
        self.entries
            .insert(key.into(), Value::Function(NativeFunction::new(func, nargs)));
    }

    /// Copy every entry of `other` whose key is not present yet.
    ///
    /// Returns the number of entries added.
    pub fn merge_missing(&mut self, other: ExportTable) -> usize {
        let mut added = 0;
        for (key, value) in other.entries {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entries.entry(key) {
                slot.insert(value);
                added += 1;
            }
        }
        added
    }

    pub(crate) fn adopt(&mut self, owner: &Owner) {
        for value in self.entries.values_mut() {
            value.adopt(owner);
        }
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ExportTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<ExportTable> for Value {
    fn from(table: ExportTable) -> Self {
        Value::Object(table)
    }
}

/// Value stack handed to native functions.
#[derive(Debug, Default)]
pub struct Context {
    stack: Vec<Value>,
    error: Option<String>,
}

impl Context {
    /// Create a context whose stack holds the call arguments.
    ///
    /// With a fixed `nargs` missing arguments become undefined and extra
    /// ones are dropped.
    pub fn with_args(args: &[Value], nargs: i32) -> Self {
        let mut stack: Vec<Value> = args.to_vec();
        if nargs >= 0 {
            stack.resize(nargs as usize, Value::Undefined);
        }
        Self { stack, error: None }
    }

    /// Number of values on the stack
    pub fn top(&self) -> usize {
        self.stack.len()
    }

    /// Value at `index`, counted from the bottom of the stack
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.stack.get(index)
    }

    /// Number at `index`, NaN if the slot is missing or not a number
    pub fn get_number(&self, index: usize) -> f64 {
        match self.stack.get(index) {
            Some(Value::Number(n)) => *n,
            _ => f64::NAN,
        }
    }

    /// String at `index`
    pub fn get_string(&self, index: usize) -> Option<&str> {
        self.stack.get(index).and_then(Value::as_str)
    }

    /// Push a value
    pub fn push(&mut self, value: impl Into<Value>) {
        self.stack.push(value.into());
    }

    /// Pop the top value
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Record an error message and return [`RET_ERROR`]
    pub fn throw(&mut self, message: impl Into<String>) -> c_int {
        self.error = Some(message.into());
        RET_ERROR
    }

    /// Interpret a native return code
    fn finish(mut self, ret: c_int) -> Result<Value, String> {
        match ret {
            RET_VALUE => self
                .stack
                .pop()
                .ok_or_else(|| "native function returned a value but left the stack empty".to_string()),
            RET_UNDEFINED => Ok(Value::Undefined),
            r if r < 0 => Err(self
                .error
                .take()
                .unwrap_or_else(|| format!("native function failed with code {}", r))),
            r => Err(format!("invalid native return code {}", r)),
        }
    }
}

/// Export a module initializer from a native library.
///
/// The symbol name must be the initializer name the loader derives from the
/// module identifier (`dukopen_` followed by the identifier with `.`
/// replaced by `_`).
///
/// ```rust,ignore
/// modlink_core::declare_module!(dukopen_greet, |exports| {
///     exports.insert("greeting", "hello");
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! declare_module {
    ($symbol:ident, $init:expr) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $symbol(ctx: *mut $crate::Context) -> ::std::os::raw::c_int {
            let init: fn(&mut $crate::ExportTable) -> ::std::result::Result<(), ::std::string::String> =
                $init;
            // SAFETY: the loader passes a live, exclusive context
            let ctx = unsafe { &mut *ctx };
            let mut exports = $crate::ExportTable::new();
            match init(&mut exports) {
                Ok(()) => {
                    ctx.push($crate::Value::Object(exports));
                    $crate::RET_VALUE
                }
                Err(message) => ctx.throw(message),
            }
        }
    };
}
