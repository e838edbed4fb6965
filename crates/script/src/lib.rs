// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crashd-script: diagnostics script model, reader, and variable expansion

mod bindings;
mod command;
mod expand;
mod parser;
mod script;

pub use bindings::{Bindings, Scope, HOST_VAR, WORKDIR_VAR};
pub use command::{
    AsCommand, CaptureCommand, Command, CommandKind, CopyCommand, EnvCommand, FromCommand,
    KubeconfigCommand, OnFail, OutputCommand, RunCommand, Statement, TimeoutCommand,
    UnknownCommand, WorkdirCommand,
};
pub use expand::{expand, has_placeholders, ExpandError, Lookup};
pub use parser::{parse_script, ParseError};
pub use script::{is_valid_name, Decl, Script, ValidationError};
