// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test harness for brute-force attack simulation.
//!
//! This module provides utilities for replaying guessing patterns against
//! the failed access counter and measuring how much of each attack gets in.

pub mod attacks;
pub mod generators;
pub mod metrics;
