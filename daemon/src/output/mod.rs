pub mod speech;

pub use speech::{CommandSpeaker, SpeechError, SpeechRenderer, Speaker, TextOnly};
