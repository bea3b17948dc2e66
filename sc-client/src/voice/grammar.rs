//! Table-driven grammar for spoken cooking commands.
//!
//! An utterance is matched word by word, case and punctuation ignored. A
//! command phrase must be followed directly by the step number, so
//! "i have a question for step three, can i use two eggs" addresses step
//! three and asks "can i use two eggs".

/// Spoken and written forms of the step numbers we understand. The position
/// in the table is the 0-based step index.
pub const ORDINALS: [(&str, &str); 10] = [
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ReadStep,
    MarkComplete,
    AskQuestion,
}

impl CommandKind {
    /// What to say when the phrase was heard but its step was not.
    pub fn retry_hint(self) -> &'static str {
        match self {
            CommandKind::ReadStep | CommandKind::MarkComplete => {
                "I couldn't understand which step you are mentioning, please try again."
            }
            CommandKind::AskQuestion => "I couldn't understand you, please try again.",
        }
    }
}

/// Command phrases in the order they are tried. Each is followed by a step number.
pub const COMMAND_PATTERNS: [(&str, CommandKind); 4] = [
    ("what is step", CommandKind::ReadStep),
    ("mark as complete step", CommandKind::MarkComplete),
    ("mark step", CommandKind::MarkComplete),
    ("i have a question for step", CommandKind::AskQuestion),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    ReadStep(usize),
    MarkComplete(usize),
    AskQuestion { step: usize, question: String },
    /// A command phrase without a step (or question) we could make out.
    Unrecognized(CommandKind),
}

/// Everything heard in one finalized utterance. The wake word and a command
/// may arrive together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utterance {
    pub wake: bool,
    pub command: Option<VoiceCommand>,
}

struct Word<'a> {
    raw: &'a str,
    norm: String,
}

fn words(text: &str) -> Vec<Word<'_>> {
    text.split_whitespace()
        .map(|raw| Word {
            raw,
            norm: normalize(raw),
        })
        .filter(|word| !word.norm.is_empty())
        .collect()
}

fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Position just past the first occurrence of `phrase` as whole words.
fn find_phrase(words: &[Word], phrase: &str) -> Option<usize> {
    let phrase: Vec<String> = phrase.split_whitespace().map(normalize).collect();
    if phrase.is_empty() || phrase.len() > words.len() {
        return None;
    }
    (0..=words.len() - phrase.len())
        .find(|&start| {
            phrase
                .iter()
                .zip(&words[start..])
                .all(|(expected, word)| *expected == word.norm)
        })
        .map(|start| start + phrase.len())
}

/// 0-based step index for a spoken or written step number.
pub fn step_index(word: &str) -> Option<usize> {
    let word = normalize(word);
    ORDINALS
        .iter()
        .position(|(spoken, written)| *spoken == word || *written == word)
}

pub fn classify(text: &str, wake_word: &str) -> Utterance {
    let words = words(text);
    let wake = find_phrase(&words, wake_word).is_some();

    let command = COMMAND_PATTERNS.iter().find_map(|(phrase, kind)| {
        let after = find_phrase(&words, phrase)?;
        let Some(step) = words.get(after).and_then(|word| step_index(&word.norm)) else {
            return Some(VoiceCommand::Unrecognized(*kind));
        };
        Some(match kind {
            CommandKind::ReadStep => VoiceCommand::ReadStep(step),
            CommandKind::MarkComplete => VoiceCommand::MarkComplete(step),
            CommandKind::AskQuestion => {
                let question = words[after + 1..]
                    .iter()
                    .map(|word| word.raw)
                    .collect::<Vec<_>>()
                    .join(" ");
                let question = question
                    .trim_start_matches(|c: char| c == ',' || c == ':' || c == '-' || c.is_whitespace())
                    .trim()
                    .to_string();
                if question.is_empty() {
                    VoiceCommand::Unrecognized(*kind)
                } else {
                    VoiceCommand::AskQuestion { step, question }
                }
            }
        })
    });

    Utterance { wake, command }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> Option<VoiceCommand> {
        classify(text, "hey").command
    }

    #[test]
    fn test_wake_word_is_a_whole_word() {
        assert!(classify("Hey!", "hey").wake);
        assert!(classify("ok hey there", "hey").wake);
        assert!(!classify("they said so", "hey").wake);
        assert!(classify("hey chef, what now", "Hey Chef").wake);
        assert_eq!(classify("hey", "hey").command, None);
    }

    #[test]
    fn test_wake_word_and_command_together() {
        let utterance = classify("Hey, what is step two?", "hey");
        assert!(utterance.wake);
        assert_eq!(utterance.command, Some(VoiceCommand::ReadStep(1)));
    }

    #[test]
    fn test_ordinals_and_digits() {
        assert_eq!(command("what is step one"), Some(VoiceCommand::ReadStep(0)));
        assert_eq!(command("what is step 10"), Some(VoiceCommand::ReadStep(9)));
        assert_eq!(command("What is step Seven."), Some(VoiceCommand::ReadStep(6)));
        assert_eq!(step_index("eleven"), None);
    }

    #[test]
    fn test_mark_complete_phrasings() {
        assert_eq!(
            command("mark as complete step three"),
            Some(VoiceCommand::MarkComplete(2))
        );
        assert_eq!(
            command("please mark step 4 complete"),
            Some(VoiceCommand::MarkComplete(3))
        );
    }

    #[test]
    fn test_question_text_follows_the_step() {
        assert_eq!(
            command("I have a question for step three, can I use two eggs instead of three?"),
            Some(VoiceCommand::AskQuestion {
                step: 2,
                question: "can I use two eggs instead of three?".into()
            })
        );
    }

    #[test]
    fn test_unrecognized_steps() {
        assert_eq!(
            command("what is step eleven"),
            Some(VoiceCommand::Unrecognized(CommandKind::ReadStep))
        );
        assert_eq!(
            command("what is step"),
            Some(VoiceCommand::Unrecognized(CommandKind::ReadStep))
        );
        assert_eq!(
            command("i have a question for step two"),
            Some(VoiceCommand::Unrecognized(CommandKind::AskQuestion))
        );
        // The number has to come right after the phrase.
        assert_eq!(
            command("mark step the third one"),
            Some(VoiceCommand::Unrecognized(CommandKind::MarkComplete))
        );
    }

    #[test]
    fn test_unrelated_speech_is_ignored() {
        assert_eq!(classify("the soup smells great", "hey"), Utterance::default());
        assert_eq!(command("step two looks done"), None);
    }
}
