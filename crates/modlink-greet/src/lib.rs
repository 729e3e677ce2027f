// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Sample native module.
//!
//! Built as a `cdylib`, cargo names the library `libgreet.so`
//! (`libgreet.dylib` on macOS, `greet.dll` on Windows). The default native
//! search path has a `lib?` template for these names, so the file can be
//! dropped in the working directory as is and required as `greet`.

use modlink_core::{Context, ExportTable, RET_VALUE, declare_module};
use std::os::raw::c_int;

/// `hello([name])`: greeting string
///
/// # Safety
///
/// `ctx` must point to a live context.
pub unsafe extern "C" fn hello(ctx: *mut Context) -> c_int {
    let ctx = unsafe { &mut *ctx };
    let greeting = match ctx.get_string(0) {
        Some(name) => format!("Hello, {}!", name),
        None => "Hello from native code!".to_string(),
    };
    ctx.push(greeting);
    RET_VALUE
}

/// `addTwo(a, b)`: numeric sum
///
/// # Safety
///
/// `ctx` must point to a live context.
pub unsafe extern "C" fn add_two(ctx: *mut Context) -> c_int {
    let ctx = unsafe { &mut *ctx };
    let (a, b) = (ctx.get_number(0), ctx.get_number(1));
    if a.is_nan() || b.is_nan() {
        return ctx.throw("addTwo expects two numbers");
    }
    ctx.push(a + b);
    RET_VALUE
}

fn init(exports: &mut ExportTable) -> Result<(), String> {
    exports.insert_function("hello", hello, 1);
    exports.insert_function("addTwo", add_two, 2);
    exports.insert("version", modlink_core::VERSION);
    Ok(())
}

declare_module!(dukopen_greet, init);
