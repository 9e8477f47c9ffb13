// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// fedigate common: error taxonomy shared by the proxy and the DM worker,
// and the tracing subscriber both binaries install at startup.

pub mod error;
pub mod logging;

pub use error::ErrorKind;
pub use logging::LogOutput;
