//! Socket transport node and its wire protocol.
//!
//! [`SocketHandler`] runs over any connected stream implementing
//! [`SocketStream`]. Outgoing records are serialised (JSON by default) and
//! written as length-prefixed frames; incoming bytes are reassembled by a
//! [`FrameDecoder`] and the decoded records are emitted downstream.

pub mod frame;
mod handler;
pub mod serialise;
mod transport;


pub use frame::{DEFAULT_MAX_FRAME_SIZE, FrameDecoder, FrameError, HEADER_LEN, encode_frame};
pub use handler::SocketHandler;
pub(crate) use handler::{SocketParts, SocketSettings};
pub use serialise::{Deserializer, Serializer, deserialise_record, serialise_record};
pub use transport::SocketStream;
