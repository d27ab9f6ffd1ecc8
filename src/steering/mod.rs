//! Conversation steering
//!
//! Each call carries a checklist of touchpoints chosen by caller category.
//! Items get covered organically (keyword evidence in the exchange) or by a
//! proactive scripted injection, one per turn at most. Items never revert to
//! uncovered. Owners have no checklist.

pub mod script;

use std::time::Duration;

use crate::agent::Intent;
use crate::call::CallerIdentity;
use crate::config::{OwnerConfig, PersonaConfig};

pub use script::{ScriptVars, SteeringScript, mentions_any, render};

/// A discussion point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Touchpoint {
    WelcomeBack,
    Recap,
    Update,
    Hello,
    QuickIntro,
    Intro,
    Portal,
    Status,
    SmsOffer,
    SmsSent,
    Qa,
}

impl Touchpoint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WelcomeBack => "WELCOME_BACK",
            Self::Recap => "RECAP",
            Self::Update => "UPDATE",
            Self::Hello => "HELLO",
            Self::QuickIntro => "QUICK_INTRO",
            Self::Intro => "INTRO",
            Self::Portal => "PORTAL",
            Self::Status => "STATUS",
            Self::SmsOffer => "SMS_OFFER",
            Self::SmsSent => "SMS_SENT",
            Self::Qa => "QA",
        }
    }
}

/// Caller category, which picks the checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerCategory {
    Owner,
    Returning,
    Known,
    FirstTime,
}

impl CallerCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Returning => "returning",
            Self::Known => "known",
            Self::FirstTime => "first_time",
        }
    }

    /// Owner, then returning (history on file), then known contact, then first-time
    #[must_use]
    pub fn classify(identity: &CallerIdentity) -> Self {
        use crate::call::CallerRole;

        match identity.role {
            CallerRole::Owner => Self::Owner,
            _ if identity.history().is_some() => Self::Returning,
            CallerRole::Contact => Self::Known,
            CallerRole::Unknown => Self::FirstTime,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturningChecklist {
    welcome_back: bool,
    recap: bool,
    update: bool,
    qa: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownChecklist {
    hello: bool,
    quick_intro: bool,
    qa: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstTimeChecklist {
    intro: bool,
    portal: bool,
    status: bool,
    sms_offer: bool,
    sms_sent: bool,
    qa: bool,
}

/// Per-category checklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchpointState {
    Owner,
    Returning(ReturningChecklist),
    Known(KnownChecklist),
    FirstTime(FirstTimeChecklist),
}

impl TouchpointState {
    #[must_use]
    pub fn for_category(category: CallerCategory) -> Self {
        match category {
            CallerCategory::Owner => Self::Owner,
            CallerCategory::Returning => Self::Returning(ReturningChecklist::default()),
            CallerCategory::Known => Self::Known(KnownChecklist::default()),
            CallerCategory::FirstTime => Self::FirstTime(FirstTimeChecklist::default()),
        }
    }

    #[must_use]
    pub const fn category(&self) -> CallerCategory {
        match self {
            Self::Owner => CallerCategory::Owner,
            Self::Returning(_) => CallerCategory::Returning,
            Self::Known(_) => CallerCategory::Known,
            Self::FirstTime(_) => CallerCategory::FirstTime,
        }
    }

    /// Checklist items in this state
    #[must_use]
    pub const fn items(&self) -> &'static [Touchpoint] {
        use Touchpoint::{
            Hello, Intro, Portal, Qa, QuickIntro, Recap, SmsOffer, SmsSent, Status, Update,
            WelcomeBack,
        };
        match self {
            Self::Owner => &[],
            Self::Returning(_) => &[WelcomeBack, Recap, Update, Qa],
            Self::Known(_) => &[Hello, QuickIntro, Qa],
            Self::FirstTime(_) => &[Intro, Portal, Status, SmsOffer, SmsSent, Qa],
        }
    }

    /// Items eligible for proactive injection, in priority order
    #[must_use]
    pub const fn injection_order(&self) -> &'static [Touchpoint] {
        use Touchpoint::{Portal, QuickIntro, Recap, SmsOffer, Status, Update};
        match self {
            Self::Owner => &[],
            Self::Returning(_) => &[Recap, Update],
            Self::Known(_) => &[QuickIntro],
            Self::FirstTime(_) => &[Portal, Status, SmsOffer],
        }
    }

    /// Item covered by the category greeting
    #[must_use]
    pub const fn greeting_item(&self) -> Option<Touchpoint> {
        match self {
            Self::Owner => None,
            Self::Returning(_) => Some(Touchpoint::WelcomeBack),
            Self::Known(_) => Some(Touchpoint::Hello),
            Self::FirstTime(_) => Some(Touchpoint::Intro),
        }
    }

    fn slot(&self, item: Touchpoint) -> Option<&bool> {
        match (self, item) {
            (Self::Returning(c), Touchpoint::WelcomeBack) => Some(&c.welcome_back),
            (Self::Returning(c), Touchpoint::Recap) => Some(&c.recap),
            (Self::Returning(c), Touchpoint::Update) => Some(&c.update),
            (Self::Returning(c), Touchpoint::Qa) => Some(&c.qa),
            (Self::Known(c), Touchpoint::Hello) => Some(&c.hello),
            (Self::Known(c), Touchpoint::QuickIntro) => Some(&c.quick_intro),
            (Self::Known(c), Touchpoint::Qa) => Some(&c.qa),
            (Self::FirstTime(c), Touchpoint::Intro) => Some(&c.intro),
            (Self::FirstTime(c), Touchpoint::Portal) => Some(&c.portal),
            (Self::FirstTime(c), Touchpoint::Status) => Some(&c.status),
            (Self::FirstTime(c), Touchpoint::SmsOffer) => Some(&c.sms_offer),
            (Self::FirstTime(c), Touchpoint::SmsSent) => Some(&c.sms_sent),
            (Self::FirstTime(c), Touchpoint::Qa) => Some(&c.qa),
            _ => None,
        }
    }

    fn slot_mut(&mut self, item: Touchpoint) -> Option<&mut bool> {
        match (self, item) {
            (Self::Returning(c), Touchpoint::WelcomeBack) => Some(&mut c.welcome_back),
            (Self::Returning(c), Touchpoint::Recap) => Some(&mut c.recap),
            (Self::Returning(c), Touchpoint::Update) => Some(&mut c.update),
            (Self::Returning(c), Touchpoint::Qa) => Some(&mut c.qa),
            (Self::Known(c), Touchpoint::Hello) => Some(&mut c.hello),
            (Self::Known(c), Touchpoint::QuickIntro) => Some(&mut c.quick_intro),
            (Self::Known(c), Touchpoint::Qa) => Some(&mut c.qa),
            (Self::FirstTime(c), Touchpoint::Intro) => Some(&mut c.intro),
            (Self::FirstTime(c), Touchpoint::Portal) => Some(&mut c.portal),
            (Self::FirstTime(c), Touchpoint::Status) => Some(&mut c.status),
            (Self::FirstTime(c), Touchpoint::SmsOffer) => Some(&mut c.sms_offer),
            (Self::FirstTime(c), Touchpoint::SmsSent) => Some(&mut c.sms_sent),
            (Self::FirstTime(c), Touchpoint::Qa) => Some(&mut c.qa),
            _ => None,
        }
    }

    /// Whether an item is covered; items outside the checklist never are
    #[must_use]
    pub fn is_covered(&self, item: Touchpoint) -> bool {
        self.slot(item).copied().unwrap_or(false)
    }

    /// Mark an item covered, returning true if it was newly covered
    pub fn mark(&mut self, item: Touchpoint) -> bool {
        match self.slot_mut(item) {
            Some(slot) if !*slot => {
                *slot = true;
                true
            }
            _ => false,
        }
    }

    /// Uncovered items in checklist order
    #[must_use]
    pub fn outstanding(&self) -> Vec<Touchpoint> {
        self.items()
            .iter()
            .copied()
            .filter(|item| !self.is_covered(*item))
            .collect()
    }

    /// Covered items in checklist order
    #[must_use]
    pub fn covered(&self) -> Vec<Touchpoint> {
        self.items()
            .iter()
            .copied()
            .filter(|item| self.is_covered(*item))
            .collect()
    }
}

/// Steering state for one call
#[derive(Debug, Clone)]
pub struct Touchpoints {
    /// Completed agent turns
    pub turn: u32,
    /// Caller's name, from the directory or extracted from speech
    pub caller_name: Option<String>,
    /// Condensed prior-call summary for the recap line
    pub recap: Option<String>,
    sms_trigger_fired: bool,
    state: TouchpointState,
}

impl Touchpoints {
    #[must_use]
    pub const fn new(state: TouchpointState) -> Self {
        Self {
            turn: 0,
            caller_name: None,
            recap: None,
            sms_trigger_fired: false,
            state,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &TouchpointState {
        &self.state
    }

    #[must_use]
    pub const fn category(&self) -> CallerCategory {
        self.state.category()
    }

    #[must_use]
    pub fn is_covered(&self, item: Touchpoint) -> bool {
        self.state.is_covered(item)
    }

    /// Mark an item covered, returning true if it was newly covered
    pub fn mark(&mut self, item: Touchpoint) -> bool {
        let newly = self.state.mark(item);
        if newly {
            tracing::debug!(touchpoint = item.as_str(), turn = self.turn, "touchpoint covered");
        }
        newly
    }

    #[must_use]
    pub fn outstanding(&self) -> Vec<Touchpoint> {
        self.state.outstanding()
    }

    #[must_use]
    pub const fn sms_trigger_fired(&self) -> bool {
        self.sms_trigger_fired
    }

    /// Claim the one-shot SMS trigger; false if it already fired
    pub const fn claim_sms_trigger(&mut self) -> bool {
        if self.sms_trigger_fired {
            return false;
        }
        self.sms_trigger_fired = true;
        true
    }

    /// Count a completed agent turn
    pub const fn advance_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }
}

/// A scripted utterance covering one touchpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub touchpoint: Touchpoint,
    pub text: String,
}

/// Decides what to cover and when
#[derive(Debug, Clone)]
pub struct SteeringEngine {
    script: SteeringScript,
    assistant: String,
    business: String,
    owner: String,
    portal: String,
}

impl SteeringEngine {
    #[must_use]
    pub fn new(script: SteeringScript, persona: &PersonaConfig, owner: &OwnerConfig) -> Self {
        Self {
            script,
            assistant: persona.assistant_name.clone(),
            business: persona.business_name.clone(),
            owner: owner.name.clone(),
            portal: persona.portal_url.clone(),
        }
    }

    #[must_use]
    pub const fn script(&self) -> &SteeringScript {
        &self.script
    }

    /// Build the checklist for a resolved caller
    #[must_use]
    pub fn begin(&self, identity: &CallerIdentity) -> Touchpoints {
        let category = CallerCategory::classify(identity);
        let mut touchpoints = Touchpoints::new(TouchpointState::for_category(category));
        touchpoints.caller_name.clone_from(&identity.display_name);
        touchpoints.recap = identity.history().map(condense_recap);
        tracing::debug!(category = category.as_str(), "steering checklist selected");
        touchpoints
    }

    fn vars(&self, touchpoints: &Touchpoints) -> ScriptVars {
        ScriptVars {
            assistant: self.assistant.clone(),
            business: self.business.clone(),
            owner: self.owner.clone(),
            portal: self.portal.clone(),
            name: touchpoints.caller_name.clone(),
            recap: touchpoints.recap.clone(),
        }
    }

    /// Category greeting; marks the greeting item covered
    pub fn greeting(&self, touchpoints: &mut Touchpoints, identity: &CallerIdentity) -> String {
        let template = identity.greeting.as_deref().unwrap_or(match touchpoints.category() {
            CallerCategory::Owner => self.script.greeting_owner.as_str(),
            CallerCategory::Returning => self.script.greeting_returning.as_str(),
            CallerCategory::Known => self.script.greeting_known.as_str(),
            CallerCategory::FirstTime => self.script.greeting_first_time.as_str(),
        });
        let text = render(template, &self.vars(touchpoints));
        if let Some(item) = touchpoints.state().greeting_item() {
            touchpoints.mark(item);
        }
        text
    }

    fn keywords_for(&self, item: Touchpoint) -> Option<&[String]> {
        match item {
            Touchpoint::Portal => Some(&self.script.portal_keywords),
            Touchpoint::Status => Some(&self.script.status_keywords),
            Touchpoint::SmsOffer => Some(&self.script.sms_keywords),
            Touchpoint::QuickIntro => Some(&self.script.intro_keywords),
            Touchpoint::Recap => Some(&self.script.recap_keywords),
            Touchpoint::Update => Some(&self.script.update_keywords),
            _ => None,
        }
    }

    /// Scan a completed exchange for organically covered items
    ///
    /// Returns the newly covered items.
    pub fn observe(
        &self,
        touchpoints: &mut Touchpoints,
        utterance: &str,
        reply: &str,
        intent: Intent,
    ) -> Vec<Touchpoint> {
        let exchange = format!("{utterance} {reply}");
        let mut newly = Vec::new();

        for item in touchpoints.outstanding() {
            let evidence = match item {
                Touchpoint::Qa => intent == Intent::Question,
                _ => self
                    .keywords_for(item)
                    .is_some_and(|kws| mentions_any(&exchange, kws)),
            };
            if evidence && touchpoints.mark(item) {
                newly.push(item);
            }
        }

        newly
    }

    /// Next scripted injection, if the call is far enough along
    #[must_use]
    pub fn next_injection(&self, touchpoints: &Touchpoints) -> Option<Injection> {
        let min_turn = match touchpoints.category() {
            CallerCategory::Owner => return None,
            CallerCategory::Returning => self.script.returning_min_turn,
            CallerCategory::Known => self.script.known_min_turn,
            CallerCategory::FirstTime => self.script.first_time_min_turn,
        };
        if touchpoints.turn < min_turn {
            return None;
        }

        let item = touchpoints
            .state()
            .injection_order()
            .iter()
            .copied()
            .find(|item| !touchpoints.is_covered(*item))?;

        let template = match item {
            Touchpoint::Portal => &self.script.portal_line,
            Touchpoint::Status => &self.script.status_line,
            Touchpoint::SmsOffer => &self.script.sms_offer_line,
            Touchpoint::QuickIntro => &self.script.quick_intro_line,
            Touchpoint::Recap => &self.script.recap_line,
            Touchpoint::Update => &self.script.update_line,
            _ => return None,
        };

        Some(Injection {
            touchpoint: item,
            text: render(template, &self.vars(touchpoints)),
        })
    }

    /// "Wait, one more thing" on a first-time caller's early goodbye
    ///
    /// Claims the one-shot SMS trigger, so it fires at most once per call.
    pub fn goodbye_override(&self, touchpoints: &mut Touchpoints) -> Option<String> {
        if touchpoints.category() != CallerCategory::FirstTime
            || touchpoints.is_covered(Touchpoint::SmsSent)
            || !touchpoints.claim_sms_trigger()
        {
            return None;
        }
        Some(render(&self.script.goodbye_interjection, &self.vars(touchpoints)))
    }

    /// Whether the caller just accepted the SMS offer
    #[must_use]
    pub fn accepts_sms_offer(&self, touchpoints: &Touchpoints, utterance: &str) -> bool {
        touchpoints.category() == CallerCategory::FirstTime
            && touchpoints.is_covered(Touchpoint::SmsOffer)
            && !touchpoints.is_covered(Touchpoint::SmsSent)
            && !touchpoints.sms_trigger_fired()
            && mentions_any(utterance, &self.script.affirmative_keywords)
    }

    /// Body of the SMS sent to the caller
    #[must_use]
    pub fn sms_body(&self, touchpoints: &Touchpoints) -> String {
        render(&self.script.sms_body, &self.vars(touchpoints))
    }

    #[must_use]
    pub const fn injection_delay(&self) -> Duration {
        Duration::from_millis(self.script.injection_delay_ms)
    }
}

/// Sentence openers that read naturally mid-sentence once lowercased
const LOWERCASE_OPENERS: &[&str] = &[
    "a", "an", "the", "we", "you", "they", "it", "our", "your", "there", "that", "this",
];

/// First sentence of a prior-call summary, shaped to read inside the
/// recap line
///
/// Only a common opener is lowercased; names and other capitalized words
/// keep their case.
fn condense_recap(history: &str) -> String {
    let first = history
        .split_inclusive(['.', '\n'])
        .next()
        .unwrap_or(history)
        .trim();

    let opener = first
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let mut out: String = if LOWERCASE_OPENERS.contains(&opener.as_str()) {
        let mut chars = first.chars();
        chars
            .next()
            .map(|c| c.to_lowercase().chain(chars).collect())
            .unwrap_or_default()
    } else {
        first.to_string()
    };
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine() -> SteeringEngine {
        let config = Config::default();
        SteeringEngine::new(SteeringScript::default(), &config.persona, &config.owner)
    }

    #[test]
    fn category_precedence() {
        let owner = CallerIdentity::owner("Jordan", None).with_history(Some("x".into()));
        assert_eq!(CallerCategory::classify(&owner), CallerCategory::Owner);

        let returning = CallerIdentity::unknown(None).with_history(Some("Asked about rates.".into()));
        assert_eq!(CallerCategory::classify(&returning), CallerCategory::Returning);

        let known = CallerIdentity::contact("Dana", None);
        assert_eq!(CallerCategory::classify(&known), CallerCategory::Known);

        assert_eq!(
            CallerCategory::classify(&CallerIdentity::unknown(None)),
            CallerCategory::FirstTime
        );
    }

    #[test]
    fn returning_checklist_differs_from_first_time() {
        let returning = TouchpointState::for_category(CallerCategory::Returning);
        assert_eq!(
            returning.items(),
            &[Touchpoint::WelcomeBack, Touchpoint::Recap, Touchpoint::Update, Touchpoint::Qa]
        );
        let first = TouchpointState::for_category(CallerCategory::FirstTime);
        assert_ne!(returning.items(), first.items());
        assert!(TouchpointState::Owner.items().is_empty());
    }

    #[test]
    fn marks_are_monotonic() {
        let mut state = TouchpointState::for_category(CallerCategory::FirstTime);
        assert!(state.mark(Touchpoint::Portal));
        assert!(!state.mark(Touchpoint::Portal));
        assert!(state.is_covered(Touchpoint::Portal));
        // Items from other checklists are ignored
        assert!(!state.mark(Touchpoint::Recap));
        assert!(!state.is_covered(Touchpoint::Recap));
    }

    #[test]
    fn greeting_marks_first_item() {
        let engine = engine();
        let identity = CallerIdentity::unknown(None);
        let mut tp = engine.begin(&identity);
        let greeting = engine.greeting(&mut tp, &identity);
        assert!(greeting.contains("Ava"));
        assert!(tp.is_covered(Touchpoint::Intro));
    }

    #[test]
    fn observe_detects_organic_coverage() {
        let engine = engine();
        let mut tp = engine.begin(&CallerIdentity::unknown(None));
        let newly = engine.observe(
            &mut tp,
            "Do you have a website?",
            "Sure, it's all on the portal.",
            Intent::Question,
        );
        assert_eq!(newly, vec![Touchpoint::Portal, Touchpoint::Qa]);
    }

    #[test]
    fn injections_follow_priority_after_min_turn() {
        let engine = engine();
        let mut tp = engine.begin(&CallerIdentity::unknown(None));
        tp.advance_turn();
        assert!(engine.next_injection(&tp).is_none());

        tp.advance_turn();
        let first = engine.next_injection(&tp).unwrap();
        assert_eq!(first.touchpoint, Touchpoint::Portal);
        tp.mark(first.touchpoint);
        assert_eq!(engine.next_injection(&tp).unwrap().touchpoint, Touchpoint::Status);
    }

    #[test]
    fn owner_is_exempt() {
        let engine = engine();
        let owner = CallerIdentity::owner("Jordan", None);
        let mut tp = engine.begin(&owner);
        tp.turn = 10;
        assert!(engine.next_injection(&tp).is_none());
        assert!(engine.goodbye_override(&mut tp).is_none());
    }

    #[test]
    fn goodbye_override_fires_once() {
        let engine = engine();
        let mut tp = engine.begin(&CallerIdentity::unknown(None));
        assert!(engine.goodbye_override(&mut tp).is_some());
        assert!(engine.goodbye_override(&mut tp).is_none());
    }

    #[test]
    fn sms_acceptance_requires_offer() {
        let engine = engine();
        let mut tp = engine.begin(&CallerIdentity::unknown(None));
        assert!(!engine.accepts_sms_offer(&tp, "yes please"));
        tp.mark(Touchpoint::SmsOffer);
        assert!(engine.accepts_sms_offer(&tp, "Yes please"));
        assert!(!engine.accepts_sms_offer(&tp, "no thanks"));
    }

    #[test]
    fn recap_is_condensed() {
        assert_eq!(condense_recap("Sam asked about rates. Then left."), "Sam asked about rates.");
        assert_eq!(
            condense_recap("We talked about \"kitchen remodel\". Turns: caller 3, agent 3."),
            "we talked about \"kitchen remodel\"."
        );
        assert_eq!(condense_recap("I asked for a callback"), "I asked for a callback.");
    }
}
