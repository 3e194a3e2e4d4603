use alayasiki_core::model::TopicKey;

const IMAGE_KEYWORDS: &[&str] = &["image", "picture", "photo", "diagram", "chart", "screenshot"];
const CODE_KEYWORDS: &[&str] = &["code", "function", "class", "snippet", "api", "method"];
const TABLE_KEYWORDS: &[&str] = &["table", "spreadsheet", "row", "column", "csv"];

/// Routes a normalized query to a `TopicKey`. Pure and stateless: the same
/// query text always produces the same key, which is what makes the
/// three-tier cache's keying scheme work at all.
pub struct QueryRouter;

impl QueryRouter {
    pub fn new() -> Self {
        Self
    }

    fn normalize(query: &str) -> String {
        query
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Infers a coarse content modality from keyword presence. Defaults to
    /// `"text"` when nothing matches.
    pub fn infer_modality(&self, normalized_query: &str) -> String {
        if IMAGE_KEYWORDS.iter().any(|kw| normalized_query.contains(kw)) {
            "image".to_string()
        } else if CODE_KEYWORDS.iter().any(|kw| normalized_query.contains(kw)) {
            "code".to_string()
        } else if TABLE_KEYWORDS.iter().any(|kw| normalized_query.contains(kw)) {
            "table".to_string()
        } else {
            "text".to_string()
        }
    }

    /// The normalized query itself, stripped of its modality keywords if
    /// any, stands in as the topic label.
    pub fn infer_topic_label(&self, normalized_query: &str) -> String {
        normalized_query.to_string()
    }

    pub fn build_topic_key(&self, query: &str, retrieval_policy: &str) -> TopicKey {
        let normalized = Self::normalize(query);
        let modality = self.infer_modality(&normalized);
        let topic_label = self.infer_topic_label(&normalized);
        TopicKey::new(topic_label, modality, retrieval_policy)
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}
