//! # Tower Gate
//!
//! `tower-gate` puts a [`flow-gate`](flow_gate) admission check in front of a
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! Each request opens its own flow-gate context and entry in `call`; the
//! entry exits when the inner service's future completes, so concurrency-
//! grade rules see the request as in-flight for its whole lifetime. A rule
//! denial fails the call immediately with [`GateError::Blocked`] — the
//! middleware never queues, matching the core's admit/deny-only contract.
//!
//! ## Feature Flags
//! - `axum`: Enables [`axum::response::IntoResponse`] for [`GateError`],
//!   converting denials to `429 Too Many Requests`.

mod error;
mod layer;
mod service;


pub use error::GateError;
pub use layer::GateLayer;
pub use service::GateService;
