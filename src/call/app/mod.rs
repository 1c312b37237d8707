//! # Pixel IVR Application
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ PixelIvr ─ per-call state machine                    │
//! │   parse_pixel_input ─ `#x#y#color*` → PixelCommand   │
//! └─────────────────────────────────────────────────────┘
//!                          ▲
//! ┌─────────────────────────────────────────────────────┐
//! │ CallController ─ answer / play / collect / hangup    │
//! │ ApplicationContext ─ config, prompts, drawing, sink  │
//! └─────────────────────────────────────────────────────┘
//!                          ▲ sends SessionAction
//! ┌─────────────────────────────────────────────────────┐
//! │ Call layer: CallHandle │ CallSessionHandle           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! One [`PixelIvr::run`] drives one call from ringing to terminated and
//! returns its [`CallRecord`](crate::callrecord::CallRecord).

mod app_context;
mod command;
mod controller;
mod ivr;

#[cfg(test)]
mod ivr_test;
#[cfg(test)]
pub mod testing;

pub use app_context::{ApplicationContext, CallInfo};
pub use command::{
    parse_pixel_input, ColorCatalog, ParseError, PixelCommand, FIELD_SEPARATOR,
    SEQUENCE_TERMINATOR,
};
pub use controller::{CallController, DtmfCollectConfig};
pub use ivr::{IvrState, PixelIvr, SessionError};
