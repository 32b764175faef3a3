use crate::session::{CallPath, CallSession};

use sqlx::types::time::OffsetDateTime;
use uuid::Uuid;

/// A finished intake dialogue, one row of the `intakes` table.
#[derive(Debug, Clone)]
pub struct Intake {
    pub id: Uuid,
    pub call_sid: String,
    pub path: CallPath,
    pub caller_name: String,
    pub date_of_birth: String,
    pub preferred_when: String,
    pub created: OffsetDateTime,
}

impl Intake {
    /// `None` unless every field was collected.
    pub fn from_session(session: &CallSession) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            call_sid: session.call_sid.clone(),
            path: session.path?,
            caller_name: session.caller_name.clone()?,
            date_of_birth: session.date_of_birth.clone()?,
            preferred_when: session.preferred_when.clone()?,
            created: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Step;
    use std::time::Instant;

    #[test]
    fn only_complete_sessions_become_intakes() {
        let mut session = CallSession::new("CA9", Instant::now());
        session.path = Some(CallPath::Reschedule);
        session.caller_name = Some("Jane Doe".into());
        session.date_of_birth = Some("05221990".into());
        assert!(Intake::from_session(&session).is_none());

        session.step = Step::When;
        session.preferred_when = Some("Friday".into());
        let intake = Intake::from_session(&session).unwrap();
        assert_eq!(intake.call_sid, "CA9");
        assert_eq!(intake.path, CallPath::Reschedule);
        assert_eq!(intake.preferred_when, "Friday");
    }
}
