// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `wisktrack`: the supervisor half of the wisk dependency tracker.
//!
//! Creates the event FIFO, launches the target command with the
//! interposition library injected, assembles the event stream into a
//! process tree, classifies and merges it, and writes the run artifacts
//! (`.raw`, `.dep`, `.cmds`, insight).

pub mod classify;
pub mod cli;
pub mod config;
pub mod emit;
pub mod extract;
pub mod merge;
pub mod receiver;
pub mod resolve;
pub mod supervisor;
pub mod tree;
