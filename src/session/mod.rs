pub mod completion;
pub mod dispatcher;
pub mod event;
pub mod identity;
pub mod phase;

pub use dispatcher::{ConnectionState, Session};
pub use event::{
    AudioChunk, ControlMessage, Effect, EngineUpdate, LocalSignal, PlaybackEvent, ServerEvent,
    SessionEvent, SocketNotice,
};
pub use identity::ResponseIdentity;
pub use phase::TurnPhase;
