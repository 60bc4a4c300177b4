pub mod clock;
pub mod completion;
pub mod error;
pub mod message;

pub use clock::{test_clock_at, Clock, FixedClock, SystemClock};
pub use completion::{CompletionRequest, CompletionResponse, FinishReason, RateLimitInfo};
pub use error::{EngineError, ErrorKind};
pub use message::{Message, Role};
