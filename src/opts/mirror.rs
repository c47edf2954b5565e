use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::field::OptionField;
use crate::bot::context::Outgoing;

/// Sync progress of a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing received yet
    Unsynced,
    /// Some `value` lines received, no `end_values` yet
    Partial,
    /// `end_values` received
    Synced,
}

/// What a reply line did to the mirror
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorUpdate {
    /// Not a line for this mirror
    Ignored,
    /// A field was added or updated
    Field(OptionField),
    /// The full field set has arrived
    Synced,
    /// The owner reported an error or status
    Notice { error: bool, text: Vec<String> },
    /// A line from the owner that could not be understood
    Rejected(String),
}

/// Read-only cache of another agent's option fields.
///
/// Only `value` lines from the owner add fields, so the mirror never holds a
/// field the owner did not announce.
#[derive(Debug, Clone)]
pub struct OptionMirror {
    owner: String,
    module: String,
    fields: BTreeMap<String, OptionField>,
    synced: bool,
}

impl OptionMirror {
    /// Mirror the options of `module` hosted by agent `owner`
    pub fn new(owner: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            module: module.into(),
            fields: BTreeMap::new(),
            synced: false,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn state(&self) -> SyncState {
        if self.synced {
            SyncState::Synced
        } else if self.fields.is_empty() {
            SyncState::Unsynced
        } else {
            SyncState::Partial
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn get(&self, name: &str) -> Option<&OptionField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &OptionField> {
        self.fields.values()
    }

    /// Drop everything, e.g. after the owner disconnected
    pub fn flush(&mut self) {
        debug!(target: "opts", "mirror {}/{}: flushed", self.owner, self.module);
        self.fields.clear();
        self.synced = false;
    }

    /// Feed a reply line. `scope` is the first token of the line and `args`
    /// the remaining tokens.
    pub fn handle_reply(&mut self, sender: &str, scope: &str, args: &[String]) -> MirrorUpdate {
        if sender != self.owner {
            return MirrorUpdate::Ignored;
        }

        if scope == "error" || scope == "status" {
            let tag = format!("{}:", self.module);
            return match args.split_first() {
                Some((first, text)) if *first == tag => MirrorUpdate::Notice {
                    error: scope == "error",
                    text: text.to_vec(),
                },
                _ => MirrorUpdate::Ignored,
            };
        }

        if scope != self.module {
            return MirrorUpdate::Ignored;
        }

        match args.split_first() {
            Some((cmd, rest)) if cmd == "value" => match OptionField::parse(rest) {
                Some(field) => {
                    debug!(target: "opts", "mirror {}/{}: {}", self.owner, self.module, field);
                    self.fields.insert(field.name.clone(), field.clone());
                    MirrorUpdate::Field(field)
                }
                None => {
                    warn!(target: "opts", "mirror {}/{}: bad value line {:?}", self.owner, self.module, rest);
                    MirrorUpdate::Rejected(rest.join(" "))
                }
            },
            Some((cmd, _)) if cmd == "end_values" => {
                self.synced = true;
                MirrorUpdate::Synced
            }
            _ => MirrorUpdate::Ignored,
        }
    }

    fn request(&self, args: &[&str]) -> Outgoing {
        let mut tokens = vec![self.module.clone()];
        tokens.extend(args.iter().map(|a| a.to_string()));
        Outgoing {
            receivers: Some(vec![self.owner.clone()]),
            args: tokens,
        }
    }

    pub fn query_all(&self) -> Outgoing {
        self.request(&["query_all"])
    }

    pub fn query(&self, name: &str) -> Outgoing {
        self.request(&["query", name])
    }

    /// Ask the owner to change a field. `None` if the field is unknown here.
    pub fn set(&self, name: &str, value: &str) -> Option<Outgoing> {
        self.fields
            .contains_key(name)
            .then(|| self.request(&["set", name, value]))
    }

    pub fn load(&self) -> Outgoing {
        self.request(&["load"])
    }

    pub fn save(&self) -> Outgoing {
        self.request(&["save"])
    }

    pub fn reset(&self, name: &str) -> Outgoing {
        self.request(&["reset", name])
    }

    pub fn reset_all(&self) -> Outgoing {
        self.request(&["reset_all"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_state_machine() {
        let mut m = OptionMirror::new("box", "mixer");
        assert_eq!(m.state(), SyncState::Unsynced);

        let up = m.handle_reply("box", "mixer", &toks("value level int 10 [1,100]"));
        assert!(matches!(up, MirrorUpdate::Field(_)));
        assert_eq!(m.state(), SyncState::Partial);

        assert_eq!(m.handle_reply("box", "mixer", &toks("end_values")), MirrorUpdate::Synced);
        assert_eq!(m.state(), SyncState::Synced);

        // unsolicited update keeps the synced state
        m.handle_reply("box", "mixer", &toks("value level int 50 [1,100]"));
        assert_eq!(m.state(), SyncState::Synced);
        assert_eq!(m.get("level").unwrap().value().as_int(), Some(50));

        m.flush();
        assert_eq!(m.state(), SyncState::Unsynced);
        assert!(m.get("level").is_none());
    }

    #[test]
    fn test_empty_owner_syncs() {
        let mut m = OptionMirror::new("box", "mixer");
        m.handle_reply("box", "mixer", &toks("end_values"));
        assert_eq!(m.state(), SyncState::Synced);
    }

    #[test]
    fn test_ignores_other_senders_and_modules() {
        let mut m = OptionMirror::new("box", "mixer");
        assert_eq!(
            m.handle_reply("other", "mixer", &toks("value level int 1")),
            MirrorUpdate::Ignored
        );
        assert_eq!(
            m.handle_reply("box", "pinger", &toks("value level int 1")),
            MirrorUpdate::Ignored
        );
        assert_eq!(m.state(), SyncState::Unsynced);
    }

    #[test]
    fn test_rejects_bad_value() {
        let mut m = OptionMirror::new("box", "mixer");
        let up = m.handle_reply("box", "mixer", &toks("value level float 1.5"));
        assert!(matches!(up, MirrorUpdate::Rejected(_)));
        assert_eq!(m.state(), SyncState::Unsynced);
    }

    #[test]
    fn test_notices() {
        let mut m = OptionMirror::new("box", "mixer");
        assert_eq!(
            m.handle_reply("box", "error", &toks("mixer: key? nope")),
            MirrorUpdate::Notice {
                error: true,
                text: toks("key? nope")
            }
        );
        assert_eq!(
            m.handle_reply("box", "status", &toks("pinger: saved x")),
            MirrorUpdate::Ignored
        );
    }

    #[test]
    fn test_requests() {
        let mut m = OptionMirror::new("box", "mixer");
        let q = m.query_all();
        assert_eq!(q.receivers, Some(vec!["box".to_string()]));
        assert_eq!(q.args, toks("mixer query_all"));

        assert!(m.set("level", "5").is_none());
        m.handle_reply("box", "mixer", &toks("value level int 10"));
        assert_eq!(m.set("level", "5").unwrap().args, toks("mixer set level 5"));
        assert_eq!(m.reset("level").args, toks("mixer reset level"));
    }
}
