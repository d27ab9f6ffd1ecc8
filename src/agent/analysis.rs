//! Utterance analysis: intent, entities and caller-name extraction
//!
//! Ordered pattern rules, first match wins: farewell, greeting, trailing "?",
//! leading interrogative, leading imperative, otherwise general.

use std::sync::LazyLock;

use regex::Regex;

static FAREWELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(good\s?bye|bye(-bye)?|talk to you later|that'?s all|that is all|have a (good|great|nice) (day|night|one|evening)|see ya|take care|gotta go|i have to go)\b",
    )
    .expect("valid regex")
});

static CALLER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?i:my name is|my name's|this is|i'm|i am|it's|call me))\s+([A-Z][a-zA-Z'-]+)")
        .expect("valid regex")
});

const GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "howdy", "hiya", "yo", "morning", "afternoon", "evening", "good",
];

const INTERROGATIVES: &[&str] = &[
    "what", "when", "where", "who", "whom", "whose", "why", "how", "which", "is", "are", "can",
    "could", "do", "does", "did", "will", "would", "should", "may", "have", "has",
];

const IMPERATIVES: &[&str] = &[
    "tell", "send", "book", "schedule", "call", "text", "email", "give", "show", "let", "remind",
    "cancel", "please", "find", "set", "put", "check",
];

/// Words that follow "I'm" / "this is" but are not names
const NOT_NAMES: &[&str] = &[
    "calling", "just", "looking", "interested", "not", "fine", "good", "great", "here", "sorry",
    "wondering", "trying", "actually", "really", "still", "the", "a", "an",
];

/// Greetings only count for short utterances
const GREETING_MAX_WORDS: usize = 4;

/// Entity tokens must be longer than this
const ENTITY_MIN_LEN: usize = 4;

/// Caller intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Question,
    Command,
    General,
    Goodbye,
}

impl Intent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Question => "question",
            Self::Command => "command",
            Self::General => "general",
            Self::Goodbye => "goodbye",
        }
    }
}

/// Per-utterance analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAnalysis {
    pub text: String,
    pub intent: Intent,
    /// Capitalized words; only used to widen memory search
    pub entities: Vec<String>,
    pub needs_memory: bool,
    pub needs_capabilities: bool,
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Classify an utterance
#[must_use]
pub fn classify_intent(text: &str) -> Intent {
    let trimmed = text.trim();
    let tokens = words(trimmed);
    let first = tokens.first().map(|w| w.to_lowercase()).unwrap_or_default();

    if FAREWELL.is_match(trimmed) {
        Intent::Goodbye
    } else if !tokens.is_empty()
        && tokens.len() <= GREETING_MAX_WORDS
        && GREETING_WORDS.contains(&first.as_str())
    {
        Intent::Greeting
    } else if trimmed.ends_with('?') {
        Intent::Question
    } else if INTERROGATIVES.contains(&first.as_str()) {
        Intent::Question
    } else if IMPERATIVES.contains(&first.as_str()) {
        Intent::Command
    } else {
        Intent::General
    }
}

/// Tokens longer than four characters that start with an uppercase letter
#[must_use]
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for word in words(text) {
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        if starts_upper && word.chars().count() > ENTITY_MIN_LEN && !entities.contains(&word) {
            entities.push(word);
        }
    }
    entities
}

/// Analyze an utterance
#[must_use]
pub fn analyze(text: &str) -> AgentAnalysis {
    let intent = classify_intent(text);
    let lookup = !matches!(intent, Intent::Greeting | Intent::Goodbye);

    AgentAnalysis {
        text: text.trim().to_string(),
        intent,
        entities: extract_entities(text),
        needs_memory: lookup,
        needs_capabilities: lookup,
    }
}

/// Pull a self-introduced name ("my name is Sam", "this is Priya")
#[must_use]
pub fn extract_caller_name(text: &str) -> Option<String> {
    CALLER_NAME
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['\'', '-']))
        .find(|name| !NOT_NAMES.contains(&name.to_lowercase().as_str()))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farewell_beats_everything() {
        assert_eq!(classify_intent("Okay, bye!"), Intent::Goodbye);
        assert_eq!(classify_intent("Thanks, goodbye"), Intent::Goodbye);
        assert_eq!(classify_intent("Hi, that's all I needed"), Intent::Goodbye);
        assert_eq!(classify_intent("Have a good one"), Intent::Goodbye);
    }

    #[test]
    fn greeting_requires_short_utterance() {
        assert_eq!(classify_intent("Hey there"), Intent::Greeting);
        assert_eq!(classify_intent("Good morning!"), Intent::Greeting);
        assert_eq!(
            classify_intent("Hello I wanted to ask about your rates"),
            Intent::General
        );
    }

    #[test]
    fn questions_and_commands() {
        assert_eq!(classify_intent("Your hours are nine to five?"), Intent::Question);
        assert_eq!(classify_intent("What do you charge"), Intent::Question);
        assert_eq!(classify_intent("Send me the link"), Intent::Command);
        assert_eq!(classify_intent("I have a project in mind"), Intent::General);
    }

    #[test]
    fn analysis_flags_skip_lookup_for_small_talk() {
        let greeting = analyze("Hello!");
        assert!(!greeting.needs_memory);
        assert!(!greeting.needs_capabilities);

        let question = analyze("Does Jordan work with Portland clients?");
        assert!(question.needs_memory);
        assert_eq!(question.entities, vec!["Jordan", "Portland"]);
    }

    #[test]
    fn caller_names() {
        assert_eq!(extract_caller_name("Hi, my name is Sam Rivera").as_deref(), Some("Sam"));
        assert_eq!(extract_caller_name("Yeah this is Priya.").as_deref(), Some("Priya"));
        assert_eq!(extract_caller_name("I'm calling about the website"), None);
        assert_eq!(extract_caller_name("I'm Fine, thanks. I'm Leo"), Some("Leo".to_string()));
        assert_eq!(extract_caller_name("no name here"), None);
    }
}
