//! Networking primitives for the deploy engine: the relay client pool and
//! the blob HTTP client.

pub mod blob;
pub mod frame;
pub mod relay;

pub use blob::{BlobClient, BlobDescriptor, BlobError, BlobTransport, UploadSuccess};
pub use frame::{ClientFrame, FrameError, ServerFrame};
pub use relay::{RelayConnection, RelayError, RelayEvent, RelayPool, RelayTransport};
