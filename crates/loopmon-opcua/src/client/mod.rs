// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA client seam.
//!
//! The manager never talks to an OPC UA stack directly. It drives an
//! [`OpcUaTransport`] per connection, created by a [`TransportFactory`], and
//! receives asynchronous notifications from it as [`TransportEvent`]s.
//!
//! ```text
//! ┌──────────────────────┐  calls   ┌──────────────────────┐
//! │  ConnectionRegistry  │ ───────▶ │   OpcUaTransport     │
//! │  (one per process)   │          │  (one per endpoint)  │
//! └──────────────────────┘          └──────────────────────┘
//!            ▲                                 │
//!            │       TransportEvent channel    │
//!            └─────────────────────────────────┘
//! ```
//!
//! With the `real-transport` feature, [`RealOpcUaTransport`] implements the
//! seam on the `opcua` crate.

mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use transport::{
    BrowseResult, DataChangeEvent, IdentityToken, OpcUaTransport, OpcUaValue, ReadResult,
    SessionInfo, SessionRequest, TransportEvent, TransportEventReceiver, TransportEventSender,
    TransportFactory,
};

#[cfg(feature = "real-transport")]
pub use real_transport::{RealOpcUaTransport, RealTransportFactory};
