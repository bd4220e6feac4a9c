//! The docsage agent: turn orchestration and the wire stream.
//!
//! A chat turn runs as an explicit state machine:
//!
//! 1. **AwaitingInput**: validated history plus the new user turn
//! 2. **Reasoning**: the model sees the history and the tool definitions
//! 3. **ToolDispatch**: requested tools run; failures become tool results
//! 4. **Synthesizing**: the answer streams token by token
//! 5. **Done** (or **Failed** on a provider error)
//!
//! Events from a turn are turned into `0:` / `8:` / `3:` wire frames by the
//! [`multiplexer`], or folded into one JSON response for non-streaming callers.

pub mod citations;
pub mod frame;
pub mod multiplexer;
pub mod orchestrator;
pub mod stream_event;
pub mod suggest;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use citations::CitationSet;
pub use frame::{DataPart, Frame};
pub use multiplexer::{
    ChatResponse, MultiplexSummary, ResultMessage, collect_response, multiplex, write_frames,
};
pub use orchestrator::{Orchestrator, TurnOutcome, TurnState};
pub use stream_event::AgentEvent;
pub use suggest::Suggester;
