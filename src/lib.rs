//! IVR Tutor - voice question answering for students over the phone
//!
//! A caller picks a language, records a science question and hears a short
//! spoken answer, with a longer explanation on request:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │             Telephony provider webhooks             │
//! └────────────────────┬────────────────────────────────┘
//!                      │ voice markup
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Gateway                         │
//! │   Call flow  │  Sessions  │  Pipeline  │  Audio     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              External services                      │
//! │   Speech (STT/TTS)  │  Answers  │  Recordings       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ivr;
pub mod knowledge;
pub mod language;
pub mod pipeline;
pub mod recovery;
pub mod services;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use language::Language;
