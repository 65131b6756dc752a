//! Convenient re-exports for common usage.
//!
//! This module re-exports the types most integrations touch, allowing you
//! to import them all at once:
//!
//! ```rust
//! use bulwark_rollback::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Core state machine**: [`NetworkedSimState`]
//! - **Contract traits**: [`Simulation`], [`RemoteId`]
//! - **Inputs and packets**: [`InputFrame`], [`ActionFlags`], [`AimTarget`],
//!   [`InputRow`], [`SimPacket`], [`InputMapping`]
//! - **Deterministic math**: [`Fixed`], [`Vec2Fx`], [`fx`]
//! - **Error handling**: [`BulwarkError`]
//! - **Telemetry**: [`ViolationObserver`], [`TracingObserver`],
//!   [`CollectingObserver`]
//!
//! The [`arena`](crate::arena) example game is deliberately not in the
//! prelude; import it explicitly where you want it.
//!
//! # Example
//!
//! ```rust
//! use bulwark_rollback::prelude::*;
//! use bulwark_rollback::arena::{ArenaSim, InitialConditions};
//!
//! let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])])?;
//! let sim = ArenaSim::new(InitialConditions::new(1, 2))?;
//! let mut state = NetworkedSimState::new(sim, mapping);
//!
//! let packet: SimPacket = state.update(&[InputFrame::BLANK])?;
//! assert_eq!(packet.tick_count, 0);
//! # Ok::<(), BulwarkError>(())
//! ```

// Core state machine
pub use crate::rollback::NetworkedSimState;

// Contract traits
pub use crate::{RemoteId, Simulation};

// Inputs and packets
pub use crate::input_frame::{ActionFlags, AimTarget, InputFrame};
pub use crate::mapping::InputMapping;
pub use crate::packet::SimPacket;
pub use crate::InputRow;

// Deterministic math
pub use crate::fixed::{fx, Fixed, Vec2Fx};

// Error handling
pub use crate::error::BulwarkError;

// Telemetry
pub use crate::telemetry::{CollectingObserver, TracingObserver, ViolationObserver};
