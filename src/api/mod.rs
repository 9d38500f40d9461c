pub mod gemini_api;
pub mod gemini_client;
pub mod mock;
pub mod upstream;

pub use gemini_client::GeminiClient;
pub use mock::{MockAttempt, MockStep, MockUpstream};
pub use upstream::{ChunkStream, GenerativeUpstream};
