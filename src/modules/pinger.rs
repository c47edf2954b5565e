use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;
use tracing::debug;

use crate::bot::{Arg, ArgType, Command, Event, EventFilter, Module, ModuleContext, BOT_SCOPE};
use crate::opts::OptionField;

/// Liveness of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PingState {
    Init,
    Requested,
    Alive,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
struct PeerStatus {
    since: Instant,
    state: PingState,
}

/// Pings every connected peer and sends the event
/// `pinger.event check <peer> <state>` whenever a peer's liveness changes
#[derive(Debug, Default)]
pub struct Pinger {
    peers: BTreeMap<String, PeerStatus>,
}

impl Pinger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, peer: &str) -> Option<PingState> {
        self.peers.get(peer).map(|s| s.state)
    }

    fn report(ctx: &mut ModuleContext, peer: &str, state: PingState, to: Option<&str>) {
        debug!(target: "modules", "pinger: {} {}", peer, state);
        let args = [peer, state.as_ref()];
        match to {
            Some(to) => ctx.send_event_to("check", args, to),
            None => ctx.send_event("check", args),
        }
    }

    fn on_tick(&mut self, now: Instant, ctx: &mut ModuleContext) {
        let interval = Duration::from_secs(ctx.option_int("interval").unwrap_or(10).max(1) as u64);
        for (peer, status) in self.peers.iter_mut() {
            let next = match status.state {
                PingState::Init => Some(PingState::Requested),
                _ if now.saturating_duration_since(status.since) < interval => None,
                PingState::Requested => Some(PingState::Timeout),
                PingState::Alive | PingState::Timeout => Some(PingState::Requested),
            };
            let Some(next) = next else {
                continue;
            };
            if next == PingState::Requested {
                ctx.send_bot(["ping"], Some(peer.as_str()));
            }
            status.since = now;
            status.state = next;
            Self::report(ctx, peer, next, None);
        }
    }
}

impl Module for Pinger {
    fn name(&self) -> &str {
        "pinger"
    }

    fn description(&self) -> &str {
        "Checks that peers answer pings"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::with_args("query", &[ArgType::Str])]
    }

    fn events(&self) -> Vec<EventFilter> {
        vec![
            EventFilter::custom(BOT_SCOPE, "pong"),
            EventFilter::PeerConnect,
            EventFilter::PeerDisconnect,
            EventFilter::Tick,
        ]
    }

    fn options(&self) -> Vec<OptionField> {
        vec![OptionField::int("interval", 10)
            .range(1, 3600)
            .describe("check interval for pings in seconds")]
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn on_command(
        &mut self,
        _command: &str,
        sender: &str,
        args: &[Arg],
        ctx: &mut ModuleContext,
    ) -> anyhow::Result<()> {
        let peer = args.first().and_then(Arg::as_str).unwrap_or_default();
        if let Some(status) = self.peers.get(peer) {
            Self::report(ctx, peer, status.state, Some(sender));
        }
        Ok(())
    }

    fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext) -> anyhow::Result<()> {
        match event {
            Event::PeerConnect { peer } => {
                self.peers.insert(
                    peer.clone(),
                    PeerStatus {
                        since: ctx.now(),
                        state: PingState::Init,
                    },
                );
            }
            Event::PeerDisconnect { peer } => {
                self.peers.remove(peer);
            }
            Event::Tick { now, .. } => self.on_tick(*now, ctx),
            Event::Custom { sender, .. } => {
                if let Some(status) = self.peers.get_mut(sender) {
                    status.since = ctx.now();
                    status.state = PingState::Alive;
                    Self::report(ctx, sender, PingState::Alive, None);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::context::{Outbox, Outgoing};
    use crate::opts::OptionRegistry;
    use tokio::sync::mpsc::{self, UnboundedSender};

    struct Harness {
        out: Outbox,
        opts: OptionRegistry,
        tx: UnboundedSender<crate::bot::context::WorkerMessage>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, _rx) = mpsc::unbounded_channel();
            Self {
                out: Outbox::default(),
                opts: OptionRegistry::new("pinger", Pinger::new().options()).unwrap(),
                tx,
            }
        }

        fn event(&mut self, pinger: &mut Pinger, event: Event) -> Vec<Outgoing> {
            let mut changed = Vec::new();
            let mut ctx = ModuleContext::new(
                "pinger",
                0,
                "alice",
                Instant::now(),
                &mut self.out,
                &mut self.opts,
                &mut changed,
                &self.tx,
            );
            pinger.on_event(&event, &mut ctx).unwrap();
            self.out.drain().collect()
        }
    }

    fn tick(now: Instant) -> Event {
        Event::Tick {
            now,
            elapsed: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_cycle() {
        let mut h = Harness::new();
        let mut pinger = Pinger::new();
        let start = Instant::now();

        h.event(&mut pinger, Event::PeerConnect { peer: "bob".to_string() });
        assert_eq!(pinger.state("bob"), Some(PingState::Init));

        let lines = h.event(&mut pinger, tick(start));
        assert_eq!(lines[0].receivers, Some(vec!["bob".to_string()]));
        assert_eq!(lines[0].args, vec!["bot", "ping"]);
        assert_eq!(lines[1].args, vec!["pinger.event", "check", "bob", "requested"]);

        // no answer within the interval
        assert!(h.event(&mut pinger, tick(start + Duration::from_secs(5))).is_empty());
        let lines = h.event(&mut pinger, tick(start + Duration::from_secs(10)));
        assert_eq!(lines[0].args, vec!["pinger.event", "check", "bob", "timeout"]);

        let pong = Event::Custom {
            scope: "bot".to_string(),
            name: "pong".to_string(),
            sender: "bob".to_string(),
            args: vec![],
        };
        let lines = h.event(&mut pinger, pong);
        assert_eq!(lines[0].args, vec!["pinger.event", "check", "bob", "alive"]);
        assert_eq!(pinger.state("bob"), Some(PingState::Alive));

        h.event(&mut pinger, Event::PeerDisconnect { peer: "bob".to_string() });
        assert_eq!(pinger.state("bob"), None);
    }
}
