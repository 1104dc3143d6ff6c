// Generative text for cosmetic copy: stream titles, match predictions and
// tactical insights.

pub mod client;
pub mod prompt;

pub use client::{GeminiClient, TextGenerator};
