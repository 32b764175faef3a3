pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde::xml_serde_enum;
    use xmlserde_derives::XmlSerialize;

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Gather")]
        Gather(GatherAction),
        #[xmlserde(name = b"Redirect")]
        Redirect(RedirectAction),
        #[xmlserde(name = b"Dial")]
        Dial(DialAction),
        #[xmlserde(name = b"Hangup")]
        Hangup(HangupAction),
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"loop", ty = "attr")]
        pub lp: Option<u16>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    /// `<Gather>` nests the prompt it plays while listening.
    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct GatherAction {
        #[xmlserde(name = b"input", ty = "attr")]
        pub input: Option<GatherInput>,
        #[xmlserde(name = b"action", ty = "attr")]
        pub action: Option<String>,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<String>,
        #[xmlserde(name = b"timeout", ty = "attr")]
        pub timeout: Option<u16>,
        #[xmlserde(name = b"speechTimeout", ty = "attr")]
        pub speech_timeout: Option<String>,
        #[xmlserde(name = b"numDigits", ty = "attr")]
        pub num_digits: Option<u16>,
        #[xmlserde(name = b"finishOnKey", ty = "attr")]
        pub finish_on_key: Option<String>,
        #[xmlserde(ty = "untag")]
        pub prompts: Vec<GatherPrompt>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize)]
    pub enum GatherPrompt {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct RedirectAction {
        #[xmlserde(ty = "text")]
        pub url: String,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<String>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct DialAction {
        #[xmlserde(ty = "text")]
        pub number: String,
        #[xmlserde(name = b"timeout", ty = "attr")]
        pub timeout: Option<u16>,
    }

    #[derive(Debug, PartialEq, Eq, XmlSerialize, Default)]
    pub struct HangupAction {}

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        GatherInput {
            Speech => "speech",
            Dtmf => "dtmf",
            Both => "dtmf speech",
        }
    }
}
pub use twiml::*;

mod webhook {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "kebab-case")]
    pub enum CallStatus {
        Queued,
        Ringing,
        InProgress,
        Completed,
        Busy,
        Failed,
        NoAnswer,
        Canceled,
    }

    impl CallStatus {
        /// Statuses after which Twilio sends no further webhooks for the call.
        pub fn is_final(self) -> bool {
            matches!(
                self,
                CallStatus::Completed
                    | CallStatus::Busy
                    | CallStatus::Failed
                    | CallStatus::NoAnswer
                    | CallStatus::Canceled
            )
        }
    }

    /// Form body of a Voice webhook (`/incoming` and every `<Gather>` action).
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "PascalCase")]
    pub struct VoiceWebhookPayload {
        pub call_sid: String,
        pub speech_result: Option<String>,
        pub digits: Option<String>,
        pub from: Option<String>,
        pub to: Option<String>,
        pub call_status: Option<CallStatus>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "PascalCase")]
    pub struct StatusCallbackPayload {
        pub call_sid: String,
        pub call_status: CallStatus,
        pub call_duration: Option<String>,
    }
}
pub use webhook::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_payload_ignores_unknown_fields() {
        let body = "AccountSid=AC1&CallSid=CA42&SpeechResult=new+appointment\
                    &Confidence=0.9&From=%2B15551234567&CallStatus=in-progress";
        let payload: VoiceWebhookPayload = serde_urlencoded::from_str(body).unwrap();
        assert_eq!(payload.call_sid, "CA42");
        assert_eq!(payload.speech_result.as_deref(), Some("new appointment"));
        assert_eq!(payload.from.as_deref(), Some("+15551234567"));
        assert_eq!(payload.digits, None);
        assert_eq!(payload.call_status, Some(CallStatus::InProgress));
    }

    #[test]
    fn status_callback_final_states() {
        let payload: StatusCallbackPayload =
            serde_urlencoded::from_str("CallSid=CA1&CallStatus=no-answer").unwrap();
        assert!(payload.call_status.is_final());
        assert!(!CallStatus::Ringing.is_final());
        assert!(!CallStatus::InProgress.is_final());
    }

    #[test]
    fn serializes_gather_with_nested_say() {
        let response = Response {
            actions: vec![
                ResponseAction::Gather(GatherAction {
                    input: Some(GatherInput::Dtmf),
                    action: Some("/twilio/voice/ivr?step=dob".to_string()),
                    num_digits: Some(8),
                    prompts: vec![GatherPrompt::Say(SayAction {
                        text: "Enter your date of birth.".to_string(),
                        ..Default::default()
                    })],
                    ..Default::default()
                }),
                ResponseAction::Redirect(RedirectAction {
                    url: "/twilio/voice/ivr?step=dob".to_string(),
                    method: Some("POST".to_string()),
                }),
            ],
        };
        let twiml = wrap_twiml(xmlserde::xml_serialize(response));
        assert!(twiml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>"));
        assert!(twiml.contains("input=\"dtmf\""));
        assert!(twiml.contains("numDigits=\"8\""));
        assert!(twiml.contains("<Say>Enter your date of birth.</Say></Gather>"));
        assert!(twiml.contains(">/twilio/voice/ivr?step=dob</Redirect>"));
        assert!(twiml.ends_with("</Response>"));
    }
}
