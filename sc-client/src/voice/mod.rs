//! Hands-free control while cooking: spoken commands in, spoken replies out.

pub mod grammar;
pub mod interpreter;
pub mod speech;

pub use grammar::{classify, CommandKind, Utterance, VoiceCommand};
pub use interpreter::{Interpreter, VoiceActions, VoiceControl};
pub use speech::{CommandSynthesizer, LogSynthesizer, SpeechSynthesizer};
