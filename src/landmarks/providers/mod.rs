pub mod replay;
pub mod scripted;

pub use replay::ReplayProvider;
pub use scripted::ScriptedProvider;
