pub mod codec;
pub mod compactor;

pub use codec::decode_history;
pub use codec::encode_turn_parts;
pub use codec::HistoryMessage;
pub use compactor::estimate_tokens;
pub use compactor::summarize_if_needed;
pub use compactor::Summarizer;
