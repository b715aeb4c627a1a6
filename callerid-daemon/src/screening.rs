//! Call-state events to caller notices.
//!
//! One notice per ringing call. While a notice is showing, further ringing
//! events are ignored; going off-hook or idle dismisses it.

use serde::{Deserialize, Serialize};

use callerid_core::CallerLookup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CallEvent {
    Ringing {
        #[serde(default)]
        number: Option<String>,
    },
    OffHook,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "camelCase")]
pub enum Notice {
    ShowCaller { number: String, label: String },
    ShowBlocked { number: String, label: String },
    Dismiss,
}

#[derive(Debug, Default)]
pub struct CallScreener {
    showing: bool,
}

impl CallScreener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    pub fn on_event(
        &mut self,
        event: &CallEvent,
        lookup: impl FnOnce(&str) -> CallerLookup,
    ) -> Option<Notice> {
        match event {
            CallEvent::Ringing { number } => {
                if self.showing {
                    return None;
                }
                let number = number.as_deref()?;
                let notice = match lookup(number) {
                    CallerLookup::Blocked { label } => {
                        tracing::info!(number, "incoming call from blocked number");
                        Notice::ShowBlocked {
                            number: number.to_string(),
                            label,
                        }
                    }
                    CallerLookup::Identified { label } => Notice::ShowCaller {
                        number: number.to_string(),
                        label,
                    },
                    CallerLookup::Unknown => return None,
                };
                self.showing = true;
                Some(notice)
            }
            CallEvent::OffHook | CallEvent::Idle => {
                if !self.showing {
                    return None;
                }
                self.showing = false;
                Some(Notice::Dismiss)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(_: &str) -> CallerLookup {
        CallerLookup::Identified {
            label: "Doe, Jane".into(),
        }
    }

    fn ringing(number: &str) -> CallEvent {
        CallEvent::Ringing {
            number: Some(number.into()),
        }
    }

    #[test]
    fn ringing_shows_once() {
        let mut screener = CallScreener::new();
        let first = screener.on_event(&ringing("4930123"), known);
        assert_eq!(
            first,
            Some(Notice::ShowCaller {
                number: "4930123".into(),
                label: "Doe, Jane".into()
            })
        );
        assert_eq!(screener.on_event(&ringing("4930123"), known), None);
    }

    #[test]
    fn idle_and_offhook_dismiss_only_when_showing() {
        let mut screener = CallScreener::new();
        assert_eq!(screener.on_event(&CallEvent::Idle, known), None);
        screener.on_event(&ringing("1"), known);
        assert_eq!(screener.on_event(&CallEvent::OffHook, known), Some(Notice::Dismiss));
        assert_eq!(screener.on_event(&CallEvent::Idle, known), None);
        assert!(screener.on_event(&ringing("1"), known).is_some());
    }

    #[test]
    fn blocked_number_gets_blocked_notice() {
        let mut screener = CallScreener::new();
        let notice = screener.on_event(&ringing("666"), |_| CallerLookup::Blocked {
            label: "Spam".into(),
        });
        assert!(matches!(notice, Some(Notice::ShowBlocked { .. })));
    }

    #[test]
    fn unknown_caller_shows_nothing_and_keeps_screening() {
        let mut screener = CallScreener::new();
        assert_eq!(screener.on_event(&ringing("555"), |_| CallerLookup::Unknown), None);
        assert!(!screener.is_showing());
        assert_eq!(screener.on_event(&CallEvent::Idle, known), None);
        assert!(screener.on_event(&ringing("4930123"), known).is_some());
    }

    #[test]
    fn ringing_without_number_is_ignored() {
        let mut screener = CallScreener::new();
        assert_eq!(
            screener.on_event(&CallEvent::Ringing { number: None }, known),
            None
        );
        assert!(!screener.is_showing());
    }

    #[test]
    fn events_decode_from_wire() {
        let event: CallEvent =
            serde_json::from_str(r#"{"state":"ringing","number":"+4930"}"#).unwrap();
        assert_eq!(event, ringing("+4930"));
        let event: CallEvent = serde_json::from_str(r#"{"state":"offHook"}"#).unwrap();
        assert_eq!(event, CallEvent::OffHook);
    }
}
