// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared pieces of the wisk dependency tracker: the environment contract
//! between the supervisor and traced processes, the per-process UUID scheme,
//! the event model, the line-oriented wire codec used on the tracker FIFO,
//! and path normalization helpers.

pub mod codec;
pub mod constants;
pub mod event;
pub mod paths;
pub mod uuid;

pub use event::{Event, Op};
pub use uuid::ProcessUuid;
