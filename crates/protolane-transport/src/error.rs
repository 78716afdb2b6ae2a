/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The bus was closed; nothing more can be sent or subscribed.
    #[error("bus closed")]
    Closed,

    /// Topic names must be non-empty.
    #[error("invalid topic name `{0}`")]
    InvalidTopic(String),

    /// A group already has a live consumer on this topic.
    #[error("group `{group}` is already subscribed to `{topic}`")]
    GroupAlreadySubscribed { topic: String, group: String },
}
