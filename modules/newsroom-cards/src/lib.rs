pub mod card;
pub mod error;
pub mod sentiment;

pub use card::{CardSynthesisOptions, CardSynthesizer, LlmCardSynthesizer};
pub use error::{CardsError, CardsResult};
pub use sentiment::{LlmSentimentScorer, SentimentResult, SentimentScorer};
