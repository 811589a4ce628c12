//! LLM gateway abstraction.
//!
//! The pipeline only needs `generate(model, prompt) -> text`; everything about
//! reaching a model server lives behind [`LlmGateway`].

mod gateway;
mod http;
#[cfg(any(test, feature = "test-util"))]
mod mock;

pub use gateway::{GatewayError, LlmGateway};
pub use http::HttpGateway;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{exhausted, MockGateway, MockReply};
