pub mod serializer;
pub mod token;
pub mod tokenizer;

pub use serializer::{encode_event, serialize, serialize_token};
pub use token::Token;
pub use tokenizer::{StreamDirection, Tokenizer};
