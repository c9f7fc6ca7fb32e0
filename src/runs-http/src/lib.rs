// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! HTTP control endpoints for run enablement.

mod api;
mod delimiter;
pub mod server;

pub use api::configure;
pub use delimiter::strip_delimiters;
pub use server::{build_server, serve};
