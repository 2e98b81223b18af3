//! OpenAI-compatible wire types
//!
//! The request and response shapes clients exchange with `/v1/*`. Nothing here
//! knows about the upstream; the `notion` module translates to and from these.

pub mod request;
pub mod response;
pub mod types;

pub use request::{ChatCompletionRequest, StreamOptions};
pub use response::{
    ChatCompletionResponse, Choice, ChoiceMessage, Delta, Model, ModelsResponse, StreamChoice,
    StreamChunk, Usage,
};
pub use types::{Content, ContentPart, Message, Role};
