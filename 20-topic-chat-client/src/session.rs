use crate::error::ClientError;

/// Everything the client knows about the operator: who they are and what they listen to.
///
/// Lives in memory only and is mutated by the interactive loop after a
/// successful reply; the dispatcher never touches it.
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<String>,
    topics: TopicSet,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Records the logged-in name. Identity never changes once set.
    pub fn set_identity(&mut self, name: &str) -> Result<(), ClientError> {
        if let Some(current) = &self.identity {
            return Err(ClientError::validation(format!(
                "already logged in as {current}"
            )));
        }
        self.identity = Some(name.to_string());
        Ok(())
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub(crate) fn topics_mut(&mut self) -> &mut TopicSet {
        &mut self.topics
    }
}

/// Insertion-ordered set of topic names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicSet {
    topics: Vec<String>,
}

impl TopicSet {
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|existing| existing == topic)
    }

    /// Returns `false` when the topic was already present.
    pub fn insert(&mut self, topic: &str) -> bool {
        if self.contains(topic) {
            return false;
        }
        self.topics.push(topic.to_string());
        true
    }

    /// Returns `false` when the topic was not present.
    pub fn remove(&mut self, topic: &str) -> bool {
        let before = self.topics.len();
        self.topics.retain(|existing| existing != topic);
        self.topics.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }
}
