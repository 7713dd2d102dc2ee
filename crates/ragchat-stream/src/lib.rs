pub mod decoder;
pub mod error;
pub mod response;
pub mod stream;

pub use decoder::{FrameDecoder, decode};
pub use error::{Error, Result};
pub use response::{Answer, Response};
pub use stream::{ByteStream, StreamEvent};
