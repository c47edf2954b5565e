use std::any::Any;

use tracing::{debug, info, warn};

use crate::bot::{Arg, ArgType, Command, Event, EventFilter, Module, ModuleContext};
use crate::opts::{MirrorUpdate, OptionField, OptionMirror};

/// Mirrors the options of a module hosted by another agent and forwards
/// changes to it
#[derive(Debug, Default)]
pub struct Watch {
    mirror: Option<OptionMirror>,
}

impl Watch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mirror(&self) -> Option<&OptionMirror> {
        self.mirror.as_ref()
    }

    /// Rebuild the mirror from the `peer` and `module` options
    fn rebind(&mut self, ctx: &ModuleContext) {
        let peer = ctx.option_str("peer").unwrap_or_default();
        let module = ctx.option_str("module").unwrap_or_default();
        self.mirror = (!peer.is_empty() && !module.is_empty()).then(|| OptionMirror::new(peer, module));
        match &self.mirror {
            Some(m) => info!(target: "modules", "watch: following {}/{}", m.owner(), m.module()),
            None => debug!(target: "modules", "watch: nothing to follow"),
        }
    }

    fn show(&self, sender: &str, ctx: &mut ModuleContext) {
        let Some(mirror) = &self.mirror else {
            ctx.reply_to(["unbound"], sender);
            return;
        };
        for field in mirror.fields() {
            let mut args = vec!["field".to_string()];
            args.extend(field.to_tokens());
            ctx.reply_to(args, sender);
        }
        let state = format!("{:?}", mirror.state()).to_lowercase();
        ctx.reply_to(["state", mirror.owner(), mirror.module(), state.as_str()], sender);
    }
}

impl Module for Watch {
    fn name(&self) -> &str {
        "watch"
    }

    fn description(&self) -> &str {
        "Follows the options of a remote module"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("show"),
            Command::with_args("set", &[ArgType::Str, ArgType::Str]),
            Command::new("refresh"),
        ]
    }

    fn events(&self) -> Vec<EventFilter> {
        vec![
            EventFilter::PeerConnect,
            EventFilter::PeerDisconnect,
            EventFilter::UpdateField,
            EventFilter::AnyReply,
        ]
    }

    fn options(&self) -> Vec<OptionField> {
        vec![
            OptionField::str("peer", "").describe("agent hosting the watched module"),
            OptionField::str("module", "").describe("name of the watched module"),
        ]
    }

    fn setup(&mut self, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        self.rebind(ctx);
        Ok(())
    }

    fn on_command(
        &mut self,
        command: &str,
        sender: &str,
        args: &[Arg],
        ctx: &mut ModuleContext,
    ) -> anyhow::Result<()> {
        match command {
            "show" => self.show(sender, ctx),
            "set" => {
                let name = args.first().and_then(Arg::as_str).unwrap_or_default();
                let value = args.get(1).and_then(Arg::as_str).unwrap_or_default();
                match self.mirror.as_ref().and_then(|m| m.set(name, value)) {
                    Some(request) => ctx.send(request),
                    None => ctx.reply_to(["error", "unknown", name], sender),
                }
            }
            "refresh" => {
                if let Some(mirror) = &mut self.mirror {
                    mirror.flush();
                    ctx.send(mirror.query_all());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        match event {
            Event::UpdateField { .. } => {
                self.rebind(ctx);
                if let Some(mirror) = &self.mirror {
                    ctx.send(mirror.query_all());
                }
            }
            Event::PeerConnect { peer } => {
                if let Some(mirror) = self.mirror.as_ref().filter(|m| m.owner() == peer) {
                    ctx.send(mirror.query_all());
                }
            }
            Event::PeerDisconnect { peer } => {
                if let Some(mirror) = self.mirror.as_mut().filter(|m| m.owner() == peer) {
                    mirror.flush();
                }
            }
            Event::Reply {
                sender,
                scope,
                args,
            } => {
                let Some(mirror) = &mut self.mirror else {
                    return Ok(());
                };
                match mirror.handle_reply(sender, scope, args) {
                    MirrorUpdate::Field(field) => {
                        let mut tokens = vec![field.name.clone()];
                        tokens.push(field.value().to_string());
                        ctx.send_event("changed", tokens);
                    }
                    MirrorUpdate::Synced => ctx.send_event("synced", [mirror.module()]),
                    MirrorUpdate::Notice { error, text } => {
                        if error {
                            warn!(target: "modules", "watch: {} reports {:?}", sender, text);
                        } else {
                            debug!(target: "modules", "watch: {} reports {:?}", sender, text);
                        }
                    }
                    MirrorUpdate::Rejected(_) | MirrorUpdate::Ignored => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
