use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::field::{OptionError, OptionField, Value};
use crate::bot::command::{ArgType, Command, MatchOutcome};
use crate::bot::context::Outbox;
use crate::config::ConfigStore;

/// The option fields of one module and the commands that serve them.
///
/// Fields are persisted in the config section named after the module. Every
/// change that actually alters a value is broadcast as a `value` line and
/// reported back to the caller so it can fire `update_field`.
#[derive(Debug, Clone)]
pub struct OptionRegistry {
    module: String,
    fields: Vec<OptionField>,
    commands: Vec<Command>,
}

impl OptionRegistry {
    pub fn new(module: impl Into<String>, fields: Vec<OptionField>) -> Result<Self, OptionError> {
        let module = module.into();
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(OptionError::Duplicate(field.name.clone()));
            }
        }
        Ok(Self {
            module,
            fields,
            commands: vec![
                Command::new("query_all"),
                Command::with_args("query", &[ArgType::Str]),
                Command::with_args("set", &[ArgType::Str, ArgType::Str]),
                Command::new("load"),
                Command::new("save"),
                Command::new("reset_all"),
                Command::with_args("reset", &[ArgType::Str]),
            ],
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[OptionField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&OptionField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut OptionField, OptionError> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| OptionError::UnknownKey(name.to_string()))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(OptionField::value)
    }

    /// Current values keyed by field name
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value().clone()))
            .collect()
    }

    /// Initial projection of the config section onto the fields. No values
    /// are pushed and no changes are reported.
    pub fn bind(&mut self, store: &mut ConfigStore) {
        if self.fields.is_empty() {
            return;
        }
        let defaults = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.default_value().clone()))
            .collect();
        let values = store.get_section(&self.module, &defaults);
        for (name, value) in values {
            if let Ok(field) = self.get_mut(&name) {
                if let Err(e) = field.set(value) {
                    warn!(target: "opts", "{}: ignoring configured {}: {}", self.module, name, e);
                }
            }
        }
        debug!(target: "opts", "{}: bound options {:?}", self.module, self.values());
    }

    /// Apply a value. On change the new value is broadcast and the field is
    /// returned.
    pub fn set_value(
        &mut self,
        name: &str,
        value: Value,
        out: &mut Outbox,
    ) -> Result<Option<OptionField>, OptionError> {
        let field = self.get_mut(name)?;
        let changed = field.set(value)?;
        Ok(self.after_change(name, changed, out))
    }

    /// Parse and apply a wire token
    pub fn set_from_str(
        &mut self,
        name: &str,
        token: &str,
        out: &mut Outbox,
    ) -> Result<Option<OptionField>, OptionError> {
        let field = self.get_mut(name)?;
        let changed = field.set_from_str(token)?;
        Ok(self.after_change(name, changed, out))
    }

    /// Restore the compiled default of one field
    pub fn reset(&mut self, name: &str, out: &mut Outbox) -> Result<Option<OptionField>, OptionError> {
        let changed = self.get_mut(name)?.reset();
        Ok(self.after_change(name, changed, out))
    }

    /// Restore all compiled defaults, returning the fields that changed
    pub fn reset_all(&mut self, out: &mut Outbox) -> Vec<OptionField> {
        let names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        names
            .iter()
            .filter_map(|name| self.reset(name, out).ok().flatten())
            .collect()
    }

    fn after_change(&self, name: &str, changed: bool, out: &mut Outbox) -> Option<OptionField> {
        if !changed {
            debug!(target: "opts", "{}: {} unchanged", self.module, name);
            return None;
        }
        let field = self.get(name)?.clone();
        debug!(target: "opts", "{}: {} changed to {}", self.module, name, field.value());
        self.push_value(&field, None, out);
        Some(field)
    }

    fn push_value(&self, field: &OptionField, to: Option<&str>, out: &mut Outbox) {
        let mut args = vec![self.module.clone(), "value".to_string()];
        args.extend(field.to_tokens());
        out.push(to.map(|t| vec![t.to_string()]), args);
    }

    /// Send every field followed by `end_values`
    pub fn push_all(&self, to: Option<&str>, out: &mut Outbox) {
        for field in &self.fields {
            self.push_value(field, to, out);
        }
        out.push(
            to.map(|t| vec![t.to_string()]),
            vec![self.module.clone(), "end_values".to_string()],
        );
    }

    /// Re-read the config section. Returns the fields that changed.
    pub fn load(&mut self, store: &mut ConfigStore, out: &mut Outbox) -> Vec<OptionField> {
        let paths = match store.load() {
            Ok(Some(paths)) => paths,
            Ok(None) => {
                self.error(&["load?", "not_found"], out);
                return Vec::new();
            }
            Err(e) => {
                warn!(target: "opts", "{}: load failed: {}", self.module, e);
                self.error(&["load?", &e.to_string()], out);
                return Vec::new();
            }
        };
        let mut status = vec!["loaded".to_string()];
        status.extend(paths.iter().map(|p| p.display().to_string()));
        self.status(&status[..], out);

        let defaults = self.values();
        let values = store.get_section(&self.module, &defaults);
        let mut changed = Vec::new();
        for (name, value) in values {
            match self.set_value(&name, value, out) {
                Ok(Some(field)) => changed.push(field),
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "opts", "{}: load rejected {}: {}", self.module, name, e);
                    self.error(&["load?", "set_value", &name], out);
                }
            }
        }
        changed
    }

    /// Write the current values to the config section and save the store
    pub fn save(&self, store: &mut ConfigStore, out: &mut Outbox) {
        store.set_section(&self.module, &self.values());
        match store.save() {
            Ok(Some(path)) => self.status(&["saved", &path.display().to_string()], out),
            Ok(None) => self.error(&["save?", "not_found"], out),
            Err(e) => {
                warn!(target: "opts", "{}: save failed: {}", self.module, e);
                self.error(&["save?", &e.to_string()], out);
            }
        }
    }

    /// Serve an option command. `tokens` starts with the command name.
    ///
    /// Returns the fields whose value changed, `NoMatch` when the command is
    /// not an option command, or the reason an argument check failed.
    pub fn handle_command(
        &mut self,
        tokens: &[String],
        sender: &str,
        store: &mut ConfigStore,
        out: &mut Outbox,
    ) -> MatchOutcome<Vec<OptionField>> {
        let mut matched = None;
        for cmd in &self.commands {
            match cmd.matches(tokens) {
                MatchOutcome::NoMatch => continue,
                MatchOutcome::Failed(reason) => return MatchOutcome::Failed(reason),
                MatchOutcome::Matched(args) => {
                    matched = Some((cmd.name.clone(), args));
                    break;
                }
            }
        }
        let Some((name, args)) = matched else {
            return MatchOutcome::NoMatch;
        };
        let arg = |i: usize| args.get(i).and_then(|a| a.as_str()).unwrap_or_default();

        let changed = match name.as_str() {
            "query_all" => {
                self.push_all(Some(sender), out);
                Vec::new()
            }
            "query" => {
                match self.get(arg(0)) {
                    Some(field) => self.push_value(field, Some(sender), out),
                    None => self.key_error(arg(0), sender, out),
                }
                Vec::new()
            }
            "set" => match self.set_from_str(arg(0), arg(1), out) {
                Ok(changed) => changed.into_iter().collect(),
                Err(OptionError::UnknownKey(key)) => {
                    self.key_error(&key, sender, out);
                    Vec::new()
                }
                Err(e) => {
                    debug!(target: "opts", "{}: set {} rejected: {}", self.module, arg(0), e);
                    self.error_to(&["set?", arg(0), arg(1)], Some(sender), out);
                    Vec::new()
                }
            },
            "load" => self.load(store, out),
            "save" => {
                self.save(store, out);
                Vec::new()
            }
            "reset_all" => self.reset_all(out),
            "reset" => match self.reset(arg(0), out) {
                Ok(changed) => changed.into_iter().collect(),
                Err(_) => {
                    self.key_error(arg(0), sender, out);
                    Vec::new()
                }
            },
            _ => return MatchOutcome::NoMatch,
        };
        MatchOutcome::Matched(changed)
    }

    fn key_error(&self, key: &str, to: &str, out: &mut Outbox) {
        self.error_to(&["key?", key], Some(to), out);
    }

    fn error(&self, words: &[&str], out: &mut Outbox) {
        self.error_to(words, None, out);
    }

    fn error_to(&self, words: &[&str], to: Option<&str>, out: &mut Outbox) {
        self.tagged("error", words.iter().map(|w| w.to_string()), to, out);
    }

    fn status<S: AsRef<str>>(&self, words: &[S], out: &mut Outbox) {
        self.tagged("status", words.iter().map(|w| w.as_ref().to_string()), None, out);
    }

    fn tagged(
        &self,
        tag: &str,
        words: impl Iterator<Item = String>,
        to: Option<&str>,
        out: &mut Outbox,
    ) {
        let mut args = vec![tag.to_string(), format!("{}:", self.module)];
        args.extend(words);
        out.push(to.map(|t| vec![t.to_string()]), args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::context::Outgoing;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn registry() -> OptionRegistry {
        OptionRegistry::new(
            "mixer",
            vec![
                OptionField::int("level", 10).range(1, 100),
                OptionField::bool("mute", false),
            ],
        )
        .unwrap()
    }

    fn lines(out: &mut Outbox) -> Vec<Outgoing> {
        out.drain().collect()
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = OptionRegistry::new(
            "m",
            vec![OptionField::int("a", 1), OptionField::bool("a", true)],
        )
        .unwrap_err();
        assert_eq!(err, OptionError::Duplicate("a".to_string()));
    }

    #[test]
    fn test_set_changes_and_broadcasts_once() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();

        let res = reg.handle_command(&toks("set level 50"), "bob", &mut store, &mut out);
        let MatchOutcome::Matched(changed) = res else {
            panic!("expected match, got {:?}", res);
        };
        assert_eq!(changed.len(), 1);
        assert_eq!(reg.value("level"), Some(&Value::Int(50)));
        let sent = lines(&mut out);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receivers, None);
        assert_eq!(sent[0].args, toks("mixer value level int 50 [1,100]"));

        let res = reg.handle_command(&toks("set level 50"), "bob", &mut store, &mut out);
        assert_eq!(res, MatchOutcome::Matched(vec![]));
        assert!(lines(&mut out).is_empty());
    }

    #[test]
    fn test_set_invalid_value() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        let res = reg.handle_command(&toks("set level notanumber"), "bob", &mut store, &mut out);
        assert_eq!(res, MatchOutcome::Matched(vec![]));
        assert_eq!(reg.value("level"), Some(&Value::Int(10)));
        let sent = lines(&mut out);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receivers, Some(vec!["bob".to_string()]));
        assert_eq!(sent[0].args, toks("error mixer: set? level notanumber"));
    }

    #[test]
    fn test_unknown_key() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        for cmd in ["query nope", "set nope 1", "reset nope"] {
            reg.handle_command(&toks(cmd), "bob", &mut store, &mut out);
            let sent = lines(&mut out);
            assert_eq!(sent.len(), 1, "{}", cmd);
            assert_eq!(sent[0].args, toks("error mixer: key? nope"));
        }
    }

    #[test]
    fn test_query_all() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        reg.handle_command(&toks("query_all"), "bob", &mut store, &mut out);
        let sent = lines(&mut out);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].args, toks("mixer value level int 10 [1,100]"));
        assert_eq!(sent[1].args, toks("mixer value mute bool false"));
        assert_eq!(sent[2].args, toks("mixer end_values"));
        assert!(sent
            .iter()
            .all(|l| l.receivers == Some(vec!["bob".to_string()])));
    }

    #[test]
    fn test_reset_follows_change_path() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        reg.set_from_str("mute", "on", &mut out).unwrap();
        lines(&mut out);

        let res = reg.handle_command(&toks("reset_all"), "bob", &mut store, &mut out);
        let MatchOutcome::Matched(changed) = res else {
            panic!("expected match");
        };
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "mute");
        assert_eq!(lines(&mut out).len(), 1);
    }

    #[test]
    fn test_non_option_command_is_no_match() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        assert_eq!(
            reg.handle_command(&toks("play now"), "bob", &mut store, &mut out),
            MatchOutcome::NoMatch
        );
        assert_eq!(
            reg.handle_command(&toks("set level"), "bob", &mut store, &mut out),
            MatchOutcome::Failed("wrong number of args".to_string())
        );
    }

    #[test]
    fn test_bind_fires_nothing() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut values = BTreeMap::new();
        values.insert("level".to_string(), Value::Int(77));
        store.set_section("mixer", &values);
        reg.bind(&mut store);
        assert_eq!(reg.value("level"), Some(&Value::Int(77)));
    }

    #[test]
    fn test_load_without_file_reports_error() {
        let mut reg = registry();
        let mut store = ConfigStore::in_memory("t");
        let mut out = Outbox::default();
        let changed = reg.load(&mut store, &mut out);
        assert!(changed.is_empty());
        let sent = lines(&mut out);
        assert_eq!(sent[0].args, toks("error mixer: load? not_found"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bot.toml");
        let mut store = ConfigStore::with_paths("bot", path.clone(), None, Some(path.clone()));
        let mut reg = registry();
        let mut out = Outbox::default();

        reg.set_from_str("level", "33", &mut out).unwrap();
        reg.save(&mut store, &mut out);
        reg.set_from_str("level", "44", &mut out).unwrap();
        lines(&mut out);

        let changed = reg.load(&mut store, &mut out);
        assert_eq!(changed.len(), 1);
        assert_eq!(reg.value("level"), Some(&Value::Int(33)));
        let sent = lines(&mut out);
        assert_eq!(sent[0].args[0], "status");
        assert_eq!(sent[0].args[2], "loaded");
    }
}
