// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Commands served by this binary.

pub mod echo;
pub mod todo;

pub use echo::{EchoCommand, EchoResult};
pub use todo::{TodoJob, TodoJobHandler, TodoJobResult};
