//! Observer and event plumbing shared by the streaming engine and its consumers

pub mod event;
pub mod listener;

pub use event::{EventDispatcher, StreamEvent};
pub use listener::{ObserverHandle, ObserverSet, StreamObserver};
