use std::collections::VecDeque;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use super::event::EVENT_SUFFIX;
use crate::opts::{OptionError, OptionField, OptionRegistry, Value};

/// Scope of framework-level lines
pub const BOT_SCOPE: &str = "bot";

/// A line waiting to be sent. `receivers == None` broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub receivers: Option<Vec<String>>,
    pub args: Vec<String>,
}

/// Lines produced while a handler runs. The agent drains it after the
/// handler returns.
#[derive(Debug, Default)]
pub struct Outbox {
    lines: VecDeque<Outgoing>,
}

impl Outbox {
    pub fn push(&mut self, receivers: Option<Vec<String>>, args: Vec<String>) {
        self.lines.push_back(Outgoing { receivers, args });
    }

    pub fn push_outgoing(&mut self, line: Outgoing) {
        self.lines.push_back(line);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Outgoing> + '_ {
        self.lines.drain(..)
    }
}

/// Results a worker pushes back to its module
#[derive(Debug, Clone)]
pub struct WorkerMessage {
    pub(crate) module: usize,
    pub args: Vec<String>,
}

/// Handle a module gives to its own worker threads or tasks.
///
/// Payloads are delivered to the module as `Event::Worker` on the scheduler
/// thread; workers never touch module state directly.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    module: usize,
    tx: UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub(crate) fn new(module: usize, tx: UnboundedSender<WorkerMessage>) -> Self {
        Self { module, tx }
    }

    /// Push a payload. Returns false once the agent is gone.
    pub fn send<I, T>(&self, args: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tx
            .send(WorkerMessage {
                module: self.module,
                args: args.into_iter().map(Into::into).collect(),
            })
            .is_ok()
    }
}

fn strings<I, T>(args: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    args.into_iter().map(Into::into)
}

/// Context handed to module callbacks
pub struct ModuleContext<'a> {
    module: &'a str,
    index: usize,
    nick: &'a str,
    now: Instant,
    out: &'a mut Outbox,
    opts: &'a mut OptionRegistry,
    changed: &'a mut Vec<OptionField>,
    worker_tx: &'a UnboundedSender<WorkerMessage>,
}

impl<'a> ModuleContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module: &'a str,
        index: usize,
        nick: &'a str,
        now: Instant,
        out: &'a mut Outbox,
        opts: &'a mut OptionRegistry,
        changed: &'a mut Vec<OptionField>,
        worker_tx: &'a UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            module,
            index,
            nick,
            now,
            out,
            opts,
            changed,
            worker_tx,
        }
    }

    // ===== Identity =====

    /// Name of the module being called
    pub fn module_name(&self) -> &str {
        self.module
    }

    /// Local identity of the agent
    pub fn nick(&self) -> &str {
        self.nick
    }

    /// Time the current dispatch started
    pub fn now(&self) -> Instant {
        self.now
    }

    // ===== Sending =====

    /// Broadcast `<module> args...`
    pub fn reply<I, T>(&mut self, args: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.module_line(None, args);
    }

    /// Send `<module> args...` to one receiver
    pub fn reply_to<I, T>(&mut self, args: I, to: &str)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.module_line(Some(vec![to.to_string()]), args);
    }

    fn module_line<I, T>(&mut self, receivers: Option<Vec<String>>, args: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tokens = vec![self.module.to_string()];
        tokens.extend(strings(args));
        self.out.push(receivers, tokens);
    }

    /// Broadcast the custom event `<module>.event name args...`
    pub fn send_event<I, T>(&mut self, name: &str, args: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_line(None, name, args);
    }

    /// Send the custom event `<module>.event name args...` to one receiver
    pub fn send_event_to<I, T>(&mut self, name: &str, args: I, to: &str)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_line(Some(vec![to.to_string()]), name, args);
    }

    fn event_line<I, T>(&mut self, receivers: Option<Vec<String>>, name: &str, args: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tokens = vec![format!("{}{}", self.module, EVENT_SUFFIX), name.to_string()];
        tokens.extend(strings(args));
        self.out.push(receivers, tokens);
    }

    /// Send a framework line `bot args...`, e.g. a `ping`
    pub fn send_bot<I, T>(&mut self, args: I, to: Option<&str>)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tokens = vec![BOT_SCOPE.to_string()];
        tokens.extend(strings(args));
        self.out.push(to.map(|t| vec![t.to_string()]), tokens);
    }

    /// Send an arbitrary line, e.g. a request built by an `OptionMirror`
    pub fn send(&mut self, line: Outgoing) {
        self.out.push_outgoing(line);
    }

    // ===== Options =====

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.opts.value(name)
    }

    pub fn option_int(&self, name: &str) -> Option<i64> {
        self.option(name).and_then(Value::as_int)
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.option(name).and_then(Value::as_bool)
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(Value::as_str)
    }

    /// Change one of the module's own options. A changed value is broadcast
    /// and fires `update_field` once the handler returns.
    pub fn set_option(&mut self, name: &str, value: impl Into<Value>) -> Result<bool, OptionError> {
        let changed = self.opts.set_value(name, value.into(), &mut *self.out)?;
        Ok(match changed {
            Some(field) => {
                self.changed.push(field);
                true
            }
            None => false,
        })
    }

    // ===== Workers =====

    /// Handle for worker threads or tasks owned by this module
    pub fn worker(&self) -> WorkerHandle {
        WorkerHandle::new(self.index, self.worker_tx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_context_lines() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut out = Outbox::default();
        let mut opts = OptionRegistry::new("echo", vec![OptionField::int("n", 1)]).unwrap();
        let mut changed = Vec::new();
        let mut ctx = ModuleContext::new(
            "echo",
            0,
            "alice",
            Instant::now(),
            &mut out,
            &mut opts,
            &mut changed,
            &tx,
        );

        ctx.reply(["pong"]);
        ctx.reply_to(["pong"], "bob");
        ctx.send_event("said", ["hi there"]);
        ctx.send_bot(["ping"], Some("bob"));
        assert_eq!(ctx.set_option("n", 2i64), Ok(true));
        assert_eq!(ctx.set_option("n", 2i64), Ok(false));
        assert_eq!(ctx.option_int("n"), Some(2));
        assert!(ctx.set_option("missing", 1i64).is_err());

        let lines: Vec<Outgoing> = out.drain().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].args, toks("echo pong"));
        assert_eq!(lines[1].receivers, Some(vec!["bob".to_string()]));
        assert_eq!(
            lines[2].args,
            vec!["echo.event".to_string(), "said".to_string(), "hi there".to_string()]
        );
        assert_eq!(lines[3].args, toks("bot ping"));
        assert_eq!(lines[4].args, toks("echo value n int 2"));
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn test_worker_handle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = WorkerHandle::new(3, tx);
        let clone = handle.clone();
        std::thread::spawn(move || {
            clone.send(["level", "12"]);
        })
        .join()
        .unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.module, 3);
        assert_eq!(msg.args, toks("level 12"));
        drop(rx);
        assert!(!handle.send(["late"]));
    }
}
