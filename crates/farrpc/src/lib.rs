//! # FarRPC
//!
//! The wire layer of the farcall engine: the structured value model carried
//! by channels, the Call/Return frame shapes, and the seal step that commits
//! copy-vs-transfer decisions at the channel boundary.
//!
//! ## Architecture
//!
//! This crate knows nothing about channels, workers, or dispatch. It defines
//! *what* crosses the boundary (`Value`), *which* payloads the engine
//! recognizes (`Frame::classify`), and *how* a value is isolated for the
//! peer (`seal`). Everything stateful lives in `farrun`.

pub mod error;
pub mod frame;
pub mod value;

pub use error::Error;
pub use error::Result;
pub use frame::CallFrame;
pub use frame::Frame;
pub use frame::ReturnFrame;
pub use value::ByteBuf;
pub use value::PortHandle;
pub use value::RawPort;
pub use value::TransferList;
pub use value::Value;
pub use value::seal;

#[cfg(test)]
mod tests;
