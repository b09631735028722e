//! Streamed quiz generation: the producer that emits progress records and the
//! client that consumes them.

mod consumer;
mod exchange;
mod producer;

pub use consumer::{QuizStreamClient, consume_quiz_stream};
pub use exchange::{ByteStream, HttpQuizExchange, LocalQuizExchange, QuizExchange};
pub use producer::{DEFAULT_QUESTION_COUNT, QuizAuthor, QuizProducer, encode_record};
