use tracing::debug;

use crate::{error::ClientError, session::Session, transport::TopicFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
}

/// Keeps the session's topic set and the transport filter in step.
pub struct SubscriptionRegistry<F> {
    filter: F,
}

impl<F: TopicFilter> SubscriptionRegistry<F> {
    pub fn new(filter: F) -> Self {
        Self { filter }
    }

    /// Subscribes to `topic` unless the session already listens to it.
    ///
    /// The transport is told first so nothing published after the topic
    /// appears in the session can be missed.
    pub async fn subscribe(
        &mut self,
        session: &mut Session,
        topic: &str,
    ) -> Result<SubscribeOutcome, ClientError> {
        let topic = validate_topic(topic)?;
        if session.topics().contains(topic) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        self.filter.subscribe(topic).await?;
        session.topics_mut().insert(topic);
        debug!(topic, "subscribed");
        Ok(SubscribeOutcome::Subscribed)
    }

    pub async fn unsubscribe(
        &mut self,
        session: &mut Session,
        topic: &str,
    ) -> Result<UnsubscribeOutcome, ClientError> {
        let topic = validate_topic(topic)?;
        if !session.topics().contains(topic) {
            return Ok(UnsubscribeOutcome::NotSubscribed);
        }

        self.filter.unsubscribe(topic).await?;
        session.topics_mut().remove(topic);
        debug!(topic, "unsubscribed");
        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    pub fn list_topics(&self, session: &Session) -> Vec<String> {
        session.topics().iter().map(str::to_string).collect()
    }

    pub async fn close(&mut self) {
        self.filter.close().await;
    }
}

fn validate_topic(topic: &str) -> Result<&str, ClientError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(ClientError::validation("topic cannot be empty"));
    }
    Ok(topic)
}
