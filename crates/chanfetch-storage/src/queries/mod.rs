// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for items and downloads.

pub mod downloads;
pub mod items;
