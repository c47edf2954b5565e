use std::any::Any;

use crate::bot::{Arg, ArgType, Command, Module, ModuleContext};

/// Minimal liveness module: `echo ping` answers `echo pong`, `echo say <text>`
/// rebroadcasts the text as an `echo.event said` event.
#[derive(Debug, Default)]
pub struct Echo {
    pings: u64,
}

impl Echo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pings served
    pub fn pings(&self) -> u64 {
        self.pings
    }
}

impl Module for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Replies to pings and repeats text as events"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("ping"),
            Command::with_args("say", &[ArgType::Str]),
        ]
    }

    fn on_command(
        &mut self,
        command: &str,
        sender: &str,
        args: &[Arg],
        ctx: &mut ModuleContext,
    ) -> anyhow::Result<()> {
        match command {
            "ping" => {
                self.pings += 1;
                ctx.reply_to(["pong"], sender);
            }
            "say" => {
                let text = args.first().and_then(Arg::as_str).unwrap_or_default();
                ctx.send_event("said", [text]);
            }
            _ => {}
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::context::Outbox;
    use crate::opts::OptionRegistry;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    #[test]
    fn test_ping_and_say() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut out = Outbox::default();
        let mut opts = OptionRegistry::new("echo", Vec::new()).unwrap();
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

        let mut echo = Echo::new();
        echo.on_command("ping", "bob", &[], &mut ctx).unwrap();
        echo.on_command("say", "bob", &[Arg::Str("hi there".to_string())], &mut ctx)
            .unwrap();
        assert_eq!(echo.pings(), 1);

        let lines: Vec<_> = out.drain().collect();
        assert_eq!(lines[0].receivers, Some(vec!["bob".to_string()]));
        assert_eq!(lines[0].args, vec!["echo", "pong"]);
        assert_eq!(lines[1].receivers, None);
        assert_eq!(lines[1].args, vec!["echo.event", "said", "hi there"]);
    }
}
