// Copyright 2025 YuRPC Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in services exposed by `yurpc serve`.

use serde_json::{json, Value};
use yurpc_common::protocol::error::{Result, YurpcError};
use yurpc_common::RpcArgs;
use yurpc_server::FnService;

/// Binary arithmetic operation of the `Calc` service.
#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn integer(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div => a.checked_div(b),
        }
    }

    fn float(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }
}

fn operands(args: &RpcArgs) -> Result<(&Value, &Value)> {
    match args.as_slice() {
        [a, b] if a.is_number() && b.is_number() => Ok((a, b)),
        _ => Err(YurpcError::InvalidRequest(format!(
            "expected two numeric arguments, got {}",
            Value::Array(args.clone())
        ))),
    }
}

fn apply(op: Op, args: RpcArgs) -> Result<Value> {
    let (a, b) = operands(&args)?;

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if matches!(op, Op::Div) && y == 0 {
            return Err(YurpcError::InvalidRequest("division by zero".to_string()));
        }
        if let Some(result) = op.integer(x, y) {
            return Ok(json!(result));
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(YurpcError::InvalidRequest("operands out of range".to_string())),
    };
    if matches!(op, Op::Div) && y == 0.0 {
        return Err(YurpcError::InvalidRequest("division by zero".to_string()));
    }
    Ok(json!(op.float(x, y)))
}

/// `Calc`: `add`, `sub`, `mul`, `div` on two numbers. Integer operands stay
/// integers unless the result overflows.
pub fn calc() -> FnService {
    FnService::new("Calc")
        .method("add", |args| apply(Op::Add, args))
        .method("sub", |args| apply(Op::Sub, args))
        .method("mul", |args| apply(Op::Mul, args))
        .method("div", |args| apply(Op::Div, args))
}

/// `Echo`: `echo` returns its single argument, or the whole argument list.
pub fn echo() -> FnService {
    FnService::new("Echo").method("echo", |mut args| {
        Ok(if args.len() == 1 { args.remove(0) } else { Value::Array(args) })
    })
}
