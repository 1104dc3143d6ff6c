// Creator studio: pick a title (optionally generated) and go live.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use pitchside_core::model::NewStream;
use pitchside_llm::TextGenerator;

use crate::store::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GoLiveError {
    #[error("sign in to start streaming")]
    NotSignedIn,

    #[error("failed to start stream, please try again")]
    Failed,
}

pub struct CreatorStudio {
    store: AppState,
    text: Arc<TextGenerator>,
    topic: String,
    title: String,
}

impl CreatorStudio {
    pub fn new(store: AppState, text: Arc<TextGenerator>) -> Self {
        CreatorStudio {
            store,
            text,
            topic: String::new(),
            title: String::new(),
        }
    }

    pub fn set_topic(&mut self, topic: &str) {
        self.topic = topic.to_string();
    }

    /// Overwrite the title field, as when the creator edits it by hand.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Fill the title field from the text generator. Does nothing without a
    /// topic.
    pub async fn generate_title(&mut self) -> Option<&str> {
        if self.topic.is_empty() {
            return None;
        }
        self.title = self.text.stream_title(&self.topic).await;
        Some(&self.title)
    }

    /// The title the stream will go live with: the title field, else the
    /// topic, else a default naming the creator.
    pub fn final_title(&self, creator: &str) -> String {
        if !self.title.is_empty() {
            self.title.clone()
        } else if !self.topic.is_empty() {
            self.topic.clone()
        } else {
            format!("Live Stream by {creator}")
        }
    }

    /// Insert a live stream for the signed-in user and return its id.
    pub async fn go_live(&self) -> Result<String, GoLiveError> {
        let user = self.store.session().ok_or(GoLiveError::NotSignedIn)?;
        let stream = NewStream {
            title: Some(self.final_title(&user.name)),
            streamer_name: Some(user.name.clone()),
            viewers: Some(0),
            thumbnail_url: Some(format!(
                "https://picsum.photos/800/450?random={}",
                chrono::Utc::now().timestamp_millis()
            )),
            tags: Some(vec!["Live".to_string(), "New".to_string()]),
            is_live: Some(true),
        };

        let id = self.store.add_stream(stream).await.ok_or(GoLiveError::Failed)?;
        info!("{} went live as stream {id}", user.name);
        Ok(id)
    }
}
