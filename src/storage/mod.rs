// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage engines, the remote cache store, and the data backend that
//! drives them.

pub mod backend;
pub mod dialect;
pub mod redis;
pub mod sql;
pub mod traits;
