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

//! # YuRPC CLI
//!
//! Command-line interface for the YuRPC transport.
//!
//! - `yurpc serve`: start a server exposing the built-in demo services
//! - `yurpc call`: make one blocking RPC call (outputs raw JSON for scripting)
//!
//! The CLI uses the `argh` crate for argument parsing and dispatches to
//! `yurpc-server` and `yurpc-client`.

pub mod demo;
