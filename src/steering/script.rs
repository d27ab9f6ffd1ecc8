//! Touchpoint scripts and detection keywords
//!
//! Everything here is product copy and is replaceable from the `[steering]`
//! config section. Templates accept `{assistant}`, `{business}`, `{owner}`,
//! `{portal}`, `{name}` and `{recap}`.

use serde::Deserialize;

/// Scripted lines, keyword lists and turn thresholds for steering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SteeringScript {
    pub greeting_owner: String,
    pub greeting_returning: String,
    pub greeting_known: String,
    pub greeting_first_time: String,

    pub portal_line: String,
    pub status_line: String,
    pub sms_offer_line: String,
    pub quick_intro_line: String,
    pub recap_line: String,
    pub update_line: String,

    /// "Wait, one more thing" line spoken on an early goodbye
    pub goodbye_interjection: String,

    /// SMS body sent to the caller
    pub sms_body: String,

    pub portal_keywords: Vec<String>,
    pub status_keywords: Vec<String>,
    pub sms_keywords: Vec<String>,
    pub intro_keywords: Vec<String>,
    pub recap_keywords: Vec<String>,
    pub update_keywords: Vec<String>,

    /// Caller replies that accept the SMS offer
    pub affirmative_keywords: Vec<String>,

    /// Turns before proactive injection starts, per category
    pub first_time_min_turn: u32,
    pub known_min_turn: u32,
    pub returning_min_turn: u32,

    /// Pause after a reply before an injection is spoken
    pub injection_delay_ms: u64,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

impl Default for SteeringScript {
    fn default() -> Self {
        Self {
            greeting_owner: "Hey {owner}, it's {assistant}. What do you need?".to_string(),
            greeting_returning:
                "Welcome back, {name}! It's {assistant} again. Good to hear from you.".to_string(),
            greeting_known:
                "Hi {name}! It's {assistant}, picking up for {owner}. What's going on?".to_string(),
            greeting_first_time: "Hi, thanks for calling {business}! This is {assistant}, \
                                  {owner}'s assistant. Who am I speaking with?"
                .to_string(),

            portal_line: "By the way, everything {owner} is working on lives at {portal}, \
                          so you can check in any time."
                .to_string(),
            status_line: "Quick status update: {owner} is heads-down on projects right now, \
                          but I pass every message along the same day."
                .to_string(),
            sms_offer_line: "Want me to text you that link so you have it handy?".to_string(),
            quick_intro_line: "Just so you know, I'm {assistant}, {owner}'s AI assistant. \
                               I can take a message or answer questions."
                .to_string(),
            recap_line: "Last time we spoke, {recap}".to_string(),
            update_line: "Since then, {owner} has posted the latest at {portal}.".to_string(),

            goodbye_interjection: "Oh, wait, one more thing before you go! I'm texting you \
                                   the link to {portal} right now."
                .to_string(),
            sms_body: "Hi {name}, it's {assistant} from {business}. Here's the link we talked \
                       about: {portal}"
                .to_string(),

            portal_keywords: words(&["portal", "website", "link", "online", "site"]),
            status_keywords: words(&["status", "available", "availability", "busy", "schedule"]),
            sms_keywords: words(&["text you", "send you", "text message", "sms"]),
            intro_keywords: words(&["assistant", "ai"]),
            recap_keywords: words(&["last time", "last call", "previously", "we talked", "we spoke"]),
            update_keywords: words(&["since then", "update", "latest", "news"]),
            affirmative_keywords: words(&[
                "yes", "yeah", "yep", "sure", "please", "ok", "okay", "absolutely", "definitely",
            ]),

            first_time_min_turn: 2,
            known_min_turn: 2,
            returning_min_turn: 1,
            injection_delay_ms: 1200,
        }
    }
}

/// Values substituted into script templates
#[derive(Debug, Clone, Default)]
pub struct ScriptVars {
    pub assistant: String,
    pub business: String,
    pub owner: String,
    pub portal: String,
    pub name: Option<String>,
    pub recap: Option<String>,
}

/// Fill a template
#[must_use]
pub fn render(template: &str, vars: &ScriptVars) -> String {
    template
        .replace("{assistant}", &vars.assistant)
        .replace("{business}", &vars.business)
        .replace("{owner}", &vars.owner)
        .replace("{portal}", &vars.portal)
        .replace("{name}", vars.name.as_deref().unwrap_or("there"))
        .replace(
            "{recap}",
            vars.recap.as_deref().unwrap_or("we covered a few things"),
        )
}

/// Whether `text` contains any keyword
///
/// Multi-word keywords match as substrings; single words must match a whole
/// token so "ai" does not fire on "said".
#[must_use]
pub fn mentions_any(text: &str, keywords: &[String]) -> bool {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .collect();

    keywords.iter().any(|kw| {
        let kw = kw.to_lowercase();
        if kw.contains(' ') {
            lower.contains(&kw)
        } else {
            tokens.iter().any(|t| *t == kw)
        }
    })
}
