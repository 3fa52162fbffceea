use schema::Value;
use shred::Action;

/// Flow is a callback's verdict on one element.
pub enum Flow {
    /// Keep the element unchanged.
    Next,
    /// Substitute the element.
    Replace(Value),
    /// Substitute the element with a flat sequence.
    ReplaceMany(Vec<Value>),
    /// Stop the whole request with an empty OK.
    Stop,
}

/// ServiceCallback hooks the inbound and outbound side of every verb. An
/// error short-circuits the request; callbacks run outside any executor
/// lock and may block.
pub trait ServiceCallback: Send + Sync {
    fn before(&self, _action: Action, _element: &Value) -> anyhow::Result<Flow> {
        Ok(Flow::Next)
    }

    fn after(&self, _action: Action, _element: &Value) -> anyhow::Result<Flow> {
        Ok(Flow::Next)
    }
}
