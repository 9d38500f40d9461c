pub mod assembler;
pub mod framing;
pub mod media;
pub mod relay;
pub mod retry;
pub mod validator;
