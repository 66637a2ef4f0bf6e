// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failure isolation for the data backend and the remote cache tier.

pub mod circuit_breaker;
