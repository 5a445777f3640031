//! Text vectorization for the critic pipeline.

pub mod tfidf;

pub use tfidf::{TfidfParams, TfidfVectorizer};
