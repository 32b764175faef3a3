//! The intake dialogue: `detect → name → dob → when`, one webhook turn at a time.
//!
//! Everything here is synchronous and free of I/O.  Handlers run a turn under the session store
//! lock and render the resulting [`Reply`] as TwiML.

use crate::config::Config;
use crate::consts::{APP_GREETING, HOLD_MESSAGE, IVR_PATH};
use crate::session::{CallPath, CallSession, Step};
use crate::twilio_types::{
    DialAction, GatherAction, GatherInput, GatherPrompt, HangupAction, RedirectAction, Response,
    ResponseAction, SayAction,
};

use tracing::debug;

const DETECT_PROMPT: &str =
    "Are you calling to book a new appointment, reschedule, cancel, or speak with the front desk?";
const LOST_TRACK: &str = "Sorry, I lost track of our conversation. Let's start again.";
const ESCALATION_MESSAGE: &str =
    "Sorry, I'm having trouble understanding. Let me get someone from the front desk to help you.";
const DOB_DIGITS: usize = 8;

const FRONTDESK_KEYWORDS: &[&str] = &[
    "front desk",
    "frontdesk",
    "desk",
    "operator",
    "receptionist",
    "representative",
    "human",
    "person",
    "someone",
];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "canceling", "cancelling", "cancellation"];
const RESCHEDULE_KEYWORDS: &[&str] = &["reschedule", "rescheduling", "change", "move"];
const NEW_KEYWORDS: &[&str] = &["new", "book", "schedule", "appointment"];

/// How a call ends once the dialogue is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEnd {
    Hangup,
    Dial(String),
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Speak `prompt` and gather input for `step`.
    Gather { step: Step, prompt: String },
    /// Speak `message`, then end the call.
    Finish { message: String, end: CallEnd },
}

impl Reply {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Reply::Finish { .. })
    }
}

/// Bound on re-prompts and where to send callers who exhaust it.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Zero means re-prompt forever.
    pub max_reprompts: u32,
    pub frontdesk_number: Option<String>,
}

impl RetryPolicy {
    fn frontdesk_end(&self) -> CallEnd {
        match &self.frontdesk_number {
            Some(number) => CallEnd::Dial(number.clone()),
            None => CallEnd::Hangup,
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_reprompts: config.max_reprompts,
            frontdesk_number: config.frontdesk_number.clone(),
        }
    }
}

/// Caller input carried by a Gather webhook.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnInput<'a> {
    pub speech: Option<&'a str>,
    pub digits: Option<&'a str>,
}

impl<'a> TurnInput<'a> {
    fn speech(&self) -> Option<&'a str> {
        self.speech.map(str::trim).filter(|s| !s.is_empty())
    }

    fn digits(&self) -> Option<&'a str> {
        self.digits.map(str::trim).filter(|d| !d.is_empty())
    }
}

/// Map free-form speech to what the caller wants.  Front desk requests win over everything else,
/// then cancel, reschedule and new bookings, in that order.
pub fn classify_intent(speech: &str) -> Option<CallPath> {
    let normalized: String = speech
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", normalized.split_whitespace().collect::<Vec<_>>().join(" "));
    let mentions = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|keyword| padded.contains(&format!(" {keyword} ")))
    };

    if mentions(FRONTDESK_KEYWORDS) {
        Some(CallPath::Frontdesk)
    } else if mentions(CANCEL_KEYWORDS) {
        Some(CallPath::Cancel)
    } else if mentions(RESCHEDULE_KEYWORDS) {
        Some(CallPath::Reschedule)
    } else if mentions(NEW_KEYWORDS) {
        Some(CallPath::New)
    } else {
        None
    }
}

pub fn is_date_of_birth(digits: &str) -> bool {
    digits.len() == DOB_DIGITS && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Opening turn of a call.
pub fn greet(session: &mut CallSession) -> Reply {
    session.turns += 1;
    match session.step {
        Step::Detect => Reply::Gather {
            step: Step::Detect,
            prompt: format!("{APP_GREETING} {DETECT_PROMPT}"),
        },
        // Twilio retried the incoming webhook mid-call; carry on where we were.
        step => Reply::Gather {
            step,
            prompt: prompt_for(session),
        },
    }
}

/// Consume one webhook turn.  `step` is the step named in the callback URL.
pub fn take_turn(
    session: &mut CallSession,
    step: Step,
    input: &TurnInput,
    policy: &RetryPolicy,
) -> Reply {
    let fresh = session.turns == 0;
    session.turns += 1;

    if fresh && step != Step::Detect {
        debug!(call_sid = %session.call_sid, %step, "no session for mid-dialogue turn");
        return Reply::Gather {
            step: Step::Detect,
            prompt: format!("{LOST_TRACK} {DETECT_PROMPT}"),
        };
    }
    if step != session.step {
        // Stale or replayed webhook; the input belongs to a step we already left.
        debug!(call_sid = %session.call_sid, %step, expected = %session.step, "step mismatch");
        return Reply::Gather {
            step: session.step,
            prompt: prompt_for(session),
        };
    }

    match session.step {
        Step::Detect => match input.speech().and_then(classify_intent) {
            Some(CallPath::Frontdesk) => {
                session.path = Some(CallPath::Frontdesk);
                close(session, HOLD_MESSAGE.to_string(), policy.frontdesk_end())
            }
            Some(path) => {
                session.path.get_or_insert(path);
                advance(session, Step::Name)
            }
            None => retry(session, policy),
        },
        Step::Name => match input.speech() {
            Some(name) => {
                session.caller_name.get_or_insert_with(|| name.to_string());
                advance(session, Step::Dob)
            }
            None => retry(session, policy),
        },
        Step::Dob => match input.digits().filter(|d| is_date_of_birth(d)) {
            Some(dob) => {
                session.date_of_birth.get_or_insert_with(|| dob.to_string());
                advance(session, Step::When)
            }
            None => retry(session, policy),
        },
        Step::When => match input.speech() {
            Some(when) => {
                session.preferred_when.get_or_insert_with(|| when.to_string());
                let message = summary(session);
                close(session, message, CallEnd::Hangup)
            }
            None => retry(session, policy),
        },
    }
}

fn advance(session: &mut CallSession, next: Step) -> Reply {
    session.step = next;
    session.attempts = 0;
    Reply::Gather {
        step: next,
        prompt: prompt_for(session),
    }
}

fn retry(session: &mut CallSession, policy: &RetryPolicy) -> Reply {
    session.attempts += 1;
    if policy.max_reprompts > 0 && session.attempts > policy.max_reprompts {
        debug!(call_sid = %session.call_sid, step = %session.step, "retries exhausted");
        return close(
            session,
            ESCALATION_MESSAGE.to_string(),
            policy.frontdesk_end(),
        );
    }
    let lead = match session.step {
        Step::Dob => "Sorry, I need exactly eight digits.",
        _ => "Sorry, I didn't catch that.",
    };
    Reply::Gather {
        step: session.step,
        prompt: format!("{lead} {}", prompt_for(session)),
    }
}

fn close(session: &mut CallSession, message: String, end: CallEnd) -> Reply {
    session.closed = true;
    Reply::Finish { message, end }
}

fn prompt_for(session: &CallSession) -> String {
    match session.step {
        Step::Detect => DETECT_PROMPT.to_string(),
        Step::Name => {
            let lead = match session.path {
                Some(CallPath::Reschedule) => "Sure, I can help you reschedule.",
                Some(CallPath::Cancel) => "Okay, I can help you cancel.",
                _ => "Great, let's get you booked.",
            };
            format!("{lead} Please say your first and last name.")
        }
        Step::Dob => format!(
            "Thanks{}. Please enter your date of birth as eight digits, \
             month and day with two digits each and then the year, followed by the pound key.",
            session
                .caller_name
                .as_deref()
                .map(|name| format!(", {name}"))
                .unwrap_or_default()
        ),
        Step::When => match session.path {
            Some(CallPath::Cancel) => {
                "Which appointment would you like to cancel? Please say the day and time.".into()
            }
            _ => "What day and time would work best for you?".into(),
        },
    }
}

fn summary(session: &CallSession) -> String {
    let request = match session.path {
        Some(CallPath::Reschedule) => "reschedule your appointment",
        Some(CallPath::Cancel) => "cancel your appointment",
        _ => "book a new appointment",
    };
    let label = match session.path {
        Some(CallPath::Cancel) => "Appointment to cancel",
        _ => "Preferred time",
    };
    format!(
        "Thank you, {name}. You would like to {request}. Date of birth: {dob}. {label}: {when}. \
         Our front desk will confirm with you shortly. Goodbye.",
        name = session.caller_name.as_deref().unwrap_or_default(),
        dob = session.date_of_birth.as_deref().unwrap_or_default(),
        when = session.preferred_when.as_deref().unwrap_or_default(),
    )
}

pub fn step_url(step: Step) -> String {
    format!("{IVR_PATH}?step={step}")
}

/// Render a reply as TwiML.  Gathers are followed by a redirect back to the same step, so a
/// caller who says nothing is re-prompted.
pub fn render(reply: &Reply, voice: Option<&str>) -> Response {
    let say = |text: &str| SayAction {
        text: text.to_string(),
        voice: voice.map(str::to_string),
        ..Default::default()
    };
    let actions = match reply {
        Reply::Gather { step, prompt } => {
            let action = step_url(*step);
            let mut gather = GatherAction {
                action: Some(action.clone()),
                method: Some("POST".to_string()),
                prompts: vec![GatherPrompt::Say(say(prompt.as_str()))],
                ..Default::default()
            };
            match step {
                Step::Dob => {
                    gather.input = Some(GatherInput::Dtmf);
                    gather.num_digits = Some(DOB_DIGITS as u16);
                    gather.finish_on_key = Some("#".to_string());
                    gather.timeout = Some(10);
                }
                _ => {
                    gather.input = Some(GatherInput::Speech);
                    gather.speech_timeout = Some("auto".to_string());
                    gather.timeout = Some(5);
                }
            }
            vec![
                ResponseAction::Gather(gather),
                ResponseAction::Redirect(RedirectAction {
                    url: action,
                    method: Some("POST".to_string()),
                }),
            ]
        }
        Reply::Finish { message, end } => vec![
            ResponseAction::Say(say(message.as_str())),
            match end {
                CallEnd::Hangup => ResponseAction::Hangup(HangupAction {}),
                CallEnd::Dial(number) => ResponseAction::Dial(DialAction {
                    number: number.clone(),
                    ..Default::default()
                }),
            },
        ],
    };
    Response { actions }
}
