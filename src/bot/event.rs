use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use super::command::{convert_args, Arg, ArgType, MatchOutcome};
use crate::opts::OptionField;

/// Scope name reserved for framework-synthesized events. It is never
/// accepted from the wire.
pub const INTERNAL_SCOPE: &str = "__internal__";

/// Suffix that turns a module name into its event scope on the wire
pub const EVENT_SUFFIX: &str = ".event";

/// Module name -> version
pub type ModuleMap = BTreeMap<String, String>;

/// Events delivered to modules
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The local identity joined the room
    Connect,
    /// The local identity left the room
    Disconnect,
    PeerConnect { peer: String },
    PeerDisconnect { peer: String },
    /// Fired once when the loop starts
    Start,
    /// Fired once when the loop ends, whatever the reason
    Stop,
    Tick { now: Instant, elapsed: Duration },
    /// The locally announced module set
    ModList { modules: ModuleMap },
    /// A peer's full module announcement
    PeerModList { peer: String, modules: ModuleMap },
    /// One of the module's own option fields changed value
    UpdateField { field: OptionField },
    /// A scoped event, either `<module>.event <name>` from the wire or a
    /// framework line such as `bot pong`
    Custom {
        scope: String,
        name: String,
        sender: String,
        args: Vec<Arg>,
    },
    /// A plain module line that is not a command here, e.g. the `value`
    /// replies of a peer's module
    Reply {
        sender: String,
        scope: String,
        args: Vec<String>,
    },
    /// Results pushed by one of the module's own workers
    Worker { args: Vec<String> },
}

impl Event {
    /// Name used in logs
    pub fn name(&self) -> &str {
        match self {
            Event::Connect => "connect",
            Event::Disconnect => "disconnect",
            Event::PeerConnect { .. } => "peer_connect",
            Event::PeerDisconnect { .. } => "peer_disconnect",
            Event::Start => "start",
            Event::Stop => "stop",
            Event::Tick { .. } => "tick",
            Event::ModList { .. } => "mod_list",
            Event::PeerModList { .. } => "peer_mod_list",
            Event::UpdateField { .. } => "update_field",
            Event::Custom { name, .. } => name,
            Event::Reply { .. } => "reply",
            Event::Worker { .. } => "worker",
        }
    }
}

/// Filter for subscribing to events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Subscribe to all internal events (not custom, reply or worker ones)
    AllInternal,
    Connect,
    Disconnect,
    PeerConnect,
    PeerDisconnect,
    Start,
    Stop,
    Tick,
    ModList,
    PeerModList,
    UpdateField,
    /// A scoped event with optionally typed arguments
    Custom {
        scope: String,
        name: String,
        arg_types: Option<Vec<ArgType>>,
    },
    /// Plain reply lines of the given remote module
    Reply { scope: String },
    /// Every plain reply line, including `error` and `status` ones
    AnyReply,
    Worker,
}

impl EventFilter {
    /// A custom event without arguments
    pub fn custom(scope: impl Into<String>, name: impl Into<String>) -> Self {
        EventFilter::Custom {
            scope: scope.into(),
            name: name.into(),
            arg_types: None,
        }
    }

    /// A custom event with typed arguments
    pub fn custom_with_args(
        scope: impl Into<String>,
        name: impl Into<String>,
        arg_types: &[ArgType],
    ) -> Self {
        EventFilter::Custom {
            scope: scope.into(),
            name: name.into(),
            arg_types: Some(arg_types.to_vec()),
        }
    }

    pub fn reply(scope: impl Into<String>) -> Self {
        EventFilter::Reply {
            scope: scope.into(),
        }
    }

    /// Check if this filter matches the given event
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::AllInternal => !matches!(
                event,
                Event::Custom { .. } | Event::Reply { .. } | Event::Worker { .. }
            ),
            EventFilter::Connect => matches!(event, Event::Connect),
            EventFilter::Disconnect => matches!(event, Event::Disconnect),
            EventFilter::PeerConnect => matches!(event, Event::PeerConnect { .. }),
            EventFilter::PeerDisconnect => matches!(event, Event::PeerDisconnect { .. }),
            EventFilter::Start => matches!(event, Event::Start),
            EventFilter::Stop => matches!(event, Event::Stop),
            EventFilter::Tick => matches!(event, Event::Tick { .. }),
            EventFilter::ModList => matches!(event, Event::ModList { .. }),
            EventFilter::PeerModList => matches!(event, Event::PeerModList { .. }),
            EventFilter::UpdateField => matches!(event, Event::UpdateField { .. }),
            EventFilter::Custom { scope, name, .. } => matches!(
                event,
                Event::Custom { scope: s, name: n, .. } if s == scope && n == name
            ),
            EventFilter::Reply { scope } => {
                matches!(event, Event::Reply { scope: s, .. } if s == scope)
            }
            EventFilter::AnyReply => matches!(event, Event::Reply { .. }),
            EventFilter::Worker => matches!(event, Event::Worker { .. }),
        }
    }

    /// Match a raw scoped event against this filter, converting its
    /// arguments. Only `Custom` filters can match.
    pub fn match_custom(&self, scope: &str, name: &str, tokens: &[String]) -> MatchOutcome<Vec<Arg>> {
        match self {
            EventFilter::Custom {
                scope: s,
                name: n,
                arg_types,
            } if s == scope && n == name => match convert_args(arg_types.as_deref(), tokens) {
                Ok(args) => MatchOutcome::Matched(args),
                Err(reason) => MatchOutcome::Failed(reason),
            },
            _ => MatchOutcome::NoMatch,
        }
    }
}

/// Split `<module>.event` into the module scope
pub fn event_scope(token: &str) -> Option<&str> {
    token
        .strip_suffix(EVENT_SUFFIX)
        .filter(|scope| !scope.is_empty() && *scope != INTERNAL_SCOPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_internal_filters() {
        assert!(EventFilter::Connect.matches(&Event::Connect));
        assert!(!EventFilter::Connect.matches(&Event::Disconnect));
        assert!(EventFilter::PeerConnect.matches(&Event::PeerConnect {
            peer: "bob".to_string()
        }));
        assert!(EventFilter::AllInternal.matches(&Event::Start));
        assert!(!EventFilter::AllInternal.matches(&Event::Worker { args: vec![] }));
    }

    #[test]
    fn test_custom_filter_matches_scope_and_name() {
        let filter = EventFilter::custom("bot", "pong");
        let ev = Event::Custom {
            scope: "bot".to_string(),
            name: "pong".to_string(),
            sender: "bob".to_string(),
            args: vec![],
        };
        assert!(filter.matches(&ev));
        assert!(!EventFilter::custom("bot", "ping").matches(&ev));
        assert!(!EventFilter::custom("echo", "pong").matches(&ev));
    }

    #[test]
    fn test_match_custom_converts_args() {
        let filter = EventFilter::custom_with_args("sensor", "level", &[ArgType::Int]);
        assert_eq!(
            filter.match_custom("sensor", "level", &toks("12")),
            MatchOutcome::Matched(vec![Arg::Int(12)])
        );
        assert_eq!(
            filter.match_custom("sensor", "level", &toks("loud")),
            MatchOutcome::Failed("wrong argument @1".to_string())
        );
        assert_eq!(
            filter.match_custom("sensor", "other", &toks("12")),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            EventFilter::Tick.match_custom("sensor", "level", &[]),
            MatchOutcome::NoMatch
        );
    }

    #[test]
    fn test_event_scope() {
        assert_eq!(event_scope("echo.event"), Some("echo"));
        assert_eq!(event_scope("echo"), None);
        assert_eq!(event_scope(".event"), None);
        assert_eq!(event_scope("__internal__.event"), None);
    }

    #[test]
    fn test_reply_filter() {
        let ev = Event::Reply {
            sender: "bob".to_string(),
            scope: "mixer".to_string(),
            args: toks("value volume int 3"),
        };
        assert!(EventFilter::reply("mixer").matches(&ev));
        assert!(!EventFilter::reply("pinger").matches(&ev));
    }
}
