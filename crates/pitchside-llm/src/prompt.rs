// Prompt construction for the three cosmetic copy tasks.
//
// Each task carries its prompt plus the fixed strings shown when the client
// is disabled, when the model returns no text, and when the call fails.

/// A single text-generation request and its fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub prompt: String,
    /// Returned without calling the API when no key is configured.
    pub unavailable: String,
    /// Returned when the call succeeds but yields no text.
    pub empty: String,
    /// Returned when the call fails.
    pub failed: String,
}

/// A short, energetic title for a creator's stream about `topic`.
pub fn stream_title(topic: &str) -> CopyTask {
    let prompt = format!(
        "Generate a catchy, exciting title for a live stream about the FIFA World Cup 2034 in Saudi Arabia.\n\
         The specific topic is: \"{topic}\".\n\
         Keep it short (under 60 characters), energetic, and suitable for a sports streaming platform.\n\
         Return only the title text, nothing else."
    );
    let live = format!("Live: {topic}");
    CopyTask {
        prompt,
        unavailable: "AI Title Generation Unavailable (Check API Key)".to_string(),
        empty: live.clone(),
        failed: live,
    }
}

/// A two-sentence prediction for a fixture label such as `"France vs Germany"`.
pub fn match_prediction(match_label: &str) -> CopyTask {
    CopyTask {
        prompt: format!(
            "Provide a very brief, fun, 2-sentence prediction for the football match: {match_label}. \
             Focus on the excitement of the 2034 World Cup in Saudi Arabia."
        ),
        unavailable: "Prediction Unavailable".to_string(),
        empty: "Prediction unavailable.".to_string(),
        failed: "Prediction currently unavailable. Tune in to watch!".to_string(),
    }
}

/// A short tactical insight to show beside a stream.
pub fn tactical_insight(stream_title: &str, tags: &[String]) -> CopyTask {
    CopyTask {
        prompt: format!(
            "You are an expert football commentator for the 2034 World Cup.\n\
             Based on the stream title \"{stream_title}\" and tags \"{}\", provide a short (max 2 sentences) \
             tactical insight or interesting fact to engage the viewers.\n\
             Sound professional but excited.",
            tags.join(", ")
        ),
        unavailable: "AI Analysis Unavailable".to_string(),
        empty: "Enjoy the match!".to_string(),
        failed: "Keep an eye on the midfield battle, that's where the game will be won today!"
            .to_string(),
    }
}
