pub mod channel;
pub mod echonet;
pub mod event;
pub mod ports;
pub mod skstack;

pub use channel::{LineChannel, ScriptedChannel, SerialLineChannel, SerialSettings};
pub use echonet::{build_request, parse_response, RegisterId, RegisterValue};
pub use event::{classify, AdapterEvent, CommandResult};
