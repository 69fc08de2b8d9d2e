#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Init,
    Listening,
    Serving,
    Stopping,
    Stopped,
}
