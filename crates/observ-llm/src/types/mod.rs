pub mod message;
pub mod usage;

pub use message::ChatMessage;
pub use usage::TokenUsage;

use futures::Stream;
use std::pin::Pin;

/// Boxed stream returned by the streaming methods of every provider trait.
pub type ProviderStream<T, E> = Pin<Box<dyn Stream<Item = Result<T, E>> + Send>>;
