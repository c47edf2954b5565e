use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::command::{error_reply, Command, MatchOutcome};
use super::context::{ModuleContext, Outbox, Outgoing, WorkerMessage, BOT_SCOPE};
use super::discovery::{announcement, lsmod_request, PeerDirectory};
use super::event::{event_scope, Event, EventFilter, ModuleMap, INTERNAL_SCOPE};
use super::module::Module;
use super::scheduler::{Scheduler, StatsSummary};
use crate::config::{AgentSettings, ConfigError, ConfigStore, AGENT_SECTION};
use crate::opts::{OptionError, OptionField, OptionRegistry, Value};
use crate::transport::{Identity, Transport};
use crate::wire::{self, Internal, Message};

/// Module names that would collide with framework prefixes
const RESERVED_NAMES: &[&str] = &[BOT_SCOPE, INTERNAL_SCOPE, "agent", "error", "status"];

/// `bot` lines handled by the framework itself
const DISCOVERY_VERBS: &[&str] = &["lsmod", "ping", "module", "end_module"];

/// Errors while assembling an agent
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("no modules added")]
    NoModules,
    #[error("module name {0} is reserved")]
    ReservedName(String),
    #[error("module name {0:?} is not a valid wire token")]
    InvalidName(String),
    #[error("module {0} added twice")]
    DuplicateModule(String),
    #[error("module {module} declares command {command} twice")]
    DuplicateCommand { module: String, command: String },
    #[error("module {module}: {source}")]
    Option {
        module: String,
        #[source]
        source: OptionError,
    },
}

/// Errors that end the agent
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{module}: {operation} failed: {error:#}")]
    Handler {
        module: String,
        operation: String,
        error: anyhow::Error,
    },
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Internal `exit` line
    Exit,
    /// The room side of the transport went away
    TransportClosed,
}

/// Counters of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub exit: ExitReason,
    pub iterations: u64,
    pub lines: u64,
    pub ticks: u64,
    pub stats: StatsSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

enum Input {
    Line(Option<String>),
    Worker(WorkerMessage),
    Idle,
}

/// A hosted module and its registration data
struct Slot {
    name: String,
    version: String,
    module: Box<dyn Module>,
    commands: Vec<Command>,
    filters: Vec<EventFilter>,
    opts: OptionRegistry,
}

impl Slot {
    fn wants(&self, event: &Event) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }
}

fn validate_name(name: &str) -> Result<(), RegistrationError> {
    if RESERVED_NAMES.contains(&name) {
        return Err(RegistrationError::ReservedName(name.to_string()));
    }
    let bad = |c: char| c.is_whitespace() || matches!(c, '.' | ';' | ',' | '|' | '"' | '\\');
    if name.is_empty() || name.contains(bad) {
        return Err(RegistrationError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Builder for `Agent`
pub struct AgentBuilder {
    identity: Identity,
    transport: Transport,
    modules: Vec<Box<dyn Module>>,
    store: Option<ConfigStore>,
    settings: Option<AgentSettings>,
}

impl AgentBuilder {
    /// Host a module
    pub fn module(mut self, module: impl Module) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Host an already boxed module, e.g. from a `ModuleRegistry`
    pub fn boxed_module(mut self, module: Box<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    /// Use this config store instead of the one named by the identity
    pub fn store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use these settings instead of the `[agent]` config section
    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Register all modules, bind their options and run their `setup`
    pub fn build(self) -> Result<Agent, AgentError> {
        if self.modules.is_empty() {
            return Err(RegistrationError::NoModules.into());
        }

        let mut store = match self.store {
            Some(store) => store,
            None => {
                let mut store =
                    ConfigStore::new(&self.identity.config_name, self.identity.config_path.clone());
                match store.load() {
                    Ok(paths) => debug!(target: "agent", "config files: {:?}", paths),
                    Err(e) => warn!(target: "agent", "Failed to load config: {}", e),
                }
                store
            }
        };
        let settings = match self.settings {
            Some(settings) => settings,
            None => store.typed_section(AGENT_SECTION)?,
        };

        let mut slots: Vec<Slot> = Vec::with_capacity(self.modules.len());
        let mut command_table = BTreeMap::new();
        for module in self.modules {
            let name = module.name().to_string();
            validate_name(&name)?;
            if slots.iter().any(|s| s.name == name) {
                return Err(RegistrationError::DuplicateModule(name).into());
            }

            let commands = module.commands();
            for (ci, cmd) in commands.iter().enumerate() {
                let key = (name.clone(), cmd.name.clone());
                if command_table.insert(key, (slots.len(), ci)).is_some() {
                    return Err(RegistrationError::DuplicateCommand {
                        module: name,
                        command: cmd.name.clone(),
                    }
                    .into());
                }
            }

            let mut opts = OptionRegistry::new(name.clone(), module.options()).map_err(|source| {
                RegistrationError::Option {
                    module: name.clone(),
                    source,
                }
            })?;
            opts.bind(&mut store);

            debug!(
                target: "agent",
                "module {} {}: {} commands, {} events, {} options",
                name,
                module.version(),
                commands.len(),
                module.events().len(),
                opts.fields().len()
            );
            slots.push(Slot {
                version: module.version().to_string(),
                filters: module.events(),
                name,
                module,
                commands,
                opts,
            });
        }

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        let mut agent = Agent {
            identity: self.identity,
            scheduler: Scheduler::new(&[], &settings, now),
            settings,
            slots,
            command_table,
            store,
            transport: self.transport,
            worker_tx,
            worker_rx,
            connected: false,
            transport_closed: false,
            peers: PeerDirectory::new(),
            outbox: Outbox::default(),
            updates: VecDeque::new(),
            loopback: VecDeque::new(),
            iterations: 0,
            lines: 0,
            ticks: 0,
        };

        for index in 0..agent.slots.len() {
            agent.call(index, "setup", |m, ctx| m.setup(ctx))?;
        }
        agent.settle()?;

        // tick intervals may depend on options bound during setup
        let intervals: Vec<_> = agent
            .slots
            .iter()
            .map(|s| s.module.tick_interval())
            .collect();
        for (slot, interval) in agent.slots.iter().zip(&intervals) {
            debug!(target: "agent", "module {} tick {:?}", slot.name, interval);
        }
        agent.scheduler = Scheduler::new(&intervals, &agent.settings, Instant::now());

        Ok(agent)
    }
}

/// One agent process: hosted modules, the dispatch tables and the loop
/// that drives them
pub struct Agent {
    identity: Identity,
    settings: AgentSettings,
    slots: Vec<Slot>,
    /// (module, command) -> (slot, command index)
    command_table: BTreeMap<(String, String), (usize, usize)>,
    store: ConfigStore,
    transport: Transport,
    scheduler: Scheduler,
    worker_tx: UnboundedSender<WorkerMessage>,
    worker_rx: UnboundedReceiver<WorkerMessage>,
    connected: bool,
    transport_closed: bool,
    peers: PeerDirectory,
    outbox: Outbox,
    /// Changed option fields waiting for `update_field`
    updates: VecDeque<(usize, OptionField)>,
    /// Self-addressed lines waiting for local dispatch
    loopback: VecDeque<Message>,
    iterations: u64,
    lines: u64,
    ticks: u64,
}

impl Agent {
    pub fn builder(identity: Identity, transport: Transport) -> AgentBuilder {
        AgentBuilder {
            identity,
            transport,
            modules: Vec::new(),
            store: None,
            settings: None,
        }
    }

    pub fn nick(&self) -> &str {
        &self.identity.nick
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Hosted module names and versions
    pub fn module_map(&self) -> ModuleMap {
        self.slots
            .iter()
            .map(|s| (s.name.clone(), s.version.clone()))
            .collect()
    }

    /// Module sets announced by peers
    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    /// Current value of a hosted module's option
    pub fn option(&self, module: &str, name: &str) -> Option<&Value> {
        self.slot_index(module)
            .and_then(|i| self.slots[i].opts.value(name))
    }

    /// Downcast a hosted module for state access
    pub fn module_mut<T: Module>(&mut self, name: &str) -> Option<&mut T> {
        let index = self.slot_index(name)?;
        self.slots[index].module.as_any_mut().downcast_mut::<T>()
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Run the loop until `exit`, transport close or a handler failure.
    /// `start` and `stop` are fired exactly once either way.
    pub async fn run(&mut self) -> Result<RunSummary, AgentError> {
        info!(
            target: "agent",
            "{}: running modules {:?}",
            self.identity.nick,
            self.module_map()
        );
        self.scheduler.restart(Instant::now());

        let result = self.main_loop().await;
        if let Err(e) = &result {
            error!(target: "agent", "{}: loop ended: {}", self.identity.nick, e);
        }

        let stopped = self.fire(&Event::Stop).and_then(|_| self.settle());
        let exit = result?;
        stopped?;

        let summary = RunSummary {
            exit,
            iterations: self.iterations,
            lines: self.lines,
            ticks: self.ticks,
            stats: self.scheduler.stats(),
        };
        info!(target: "agent", "{}: stopped ({:?})", self.identity.nick, exit);
        Ok(summary)
    }

    async fn main_loop(&mut self) -> Result<ExitReason, AgentError> {
        self.fire(&Event::Start)?;
        self.settle()?;

        loop {
            if self.transport_closed {
                return Ok(ExitReason::TransportClosed);
            }
            let start = Instant::now();
            self.iterations += 1;

            let due = self.scheduler.due(start);
            for (index, elapsed) in &due {
                self.ticks += 1;
                let event = Event::Tick {
                    now: start,
                    elapsed: *elapsed,
                };
                self.call(*index, "tick", |m, ctx| m.on_event(&event, ctx))?;
            }
            self.settle()?;

            let wait = if self.updates.is_empty() {
                self.scheduler.wait_budget(Instant::now())
            } else {
                Duration::ZERO
            };
            let input = tokio::select! {
                line = self.transport.recv() => Input::Line(line),
                Some(msg) = self.worker_rx.recv() => Input::Worker(msg),
                _ = tokio::time::sleep(wait) => Input::Idle,
            };

            let flow = match input {
                Input::Line(Some(line)) => self.handle_line(&line)?,
                Input::Line(None) => {
                    info!(target: "agent", "transport closed");
                    return Ok(ExitReason::TransportClosed);
                }
                Input::Worker(msg) => {
                    self.handle_worker(msg)?;
                    Flow::Continue
                }
                Input::Idle => Flow::Continue,
            };

            self.scheduler.record(start, Instant::now(), &due);
            if flow == Flow::Exit {
                return Ok(ExitReason::Exit);
            }
        }
    }

    // ===== Module calls =====

    /// Call into one module. Changed options are queued for `update_field`;
    /// a handler error is fatal.
    fn call<F>(&mut self, index: usize, operation: &str, f: F) -> Result<(), AgentError>
    where
        F: FnOnce(&mut dyn Module, &mut ModuleContext<'_>) -> anyhow::Result<()>,
    {
        let mut changed = Vec::new();
        let slot = &mut self.slots[index];
        let result = {
            let mut ctx = ModuleContext::new(
                &slot.name,
                index,
                &self.identity.nick,
                Instant::now(),
                &mut self.outbox,
                &mut slot.opts,
                &mut changed,
                &self.worker_tx,
            );
            f(slot.module.as_mut(), &mut ctx)
        };

        if let Err(error) = result {
            error!(target: "dispatch", "{}: {} failed: {:#}", slot.name, operation, error);
            return Err(AgentError::Handler {
                module: slot.name.clone(),
                operation: operation.to_string(),
                error,
            });
        }
        self.updates.extend(changed.into_iter().map(|f| (index, f)));
        Ok(())
    }

    /// Deliver an event to every module subscribed to it
    fn fire(&mut self, event: &Event) -> Result<(), AgentError> {
        for index in 0..self.slots.len() {
            if self.slots[index].wants(event) {
                self.call(index, event.name(), |m, ctx| m.on_event(event, ctx))?;
            }
        }
        Ok(())
    }

    /// Process queued option changes, flush the outbox and dispatch
    /// looped back lines until everything is quiet or the loopback budget
    /// is spent.
    ///
    /// `update_field` has its own budget of the same size. Updates beyond it
    /// stay queued for the next loop iteration.
    fn settle(&mut self) -> Result<(), AgentError> {
        let limit = self.settings.loopback_limit;
        let mut budget = limit;
        let mut update_budget = limit;
        loop {
            while update_budget > 0 {
                let Some((index, field)) = self.updates.pop_front() else {
                    break;
                };
                let event = Event::UpdateField { field };
                if !self.slots[index].wants(&event) {
                    continue;
                }
                update_budget -= 1;
                self.call(index, "update_field", |m, ctx| m.on_event(&event, ctx))?;
            }

            self.flush_outbox();

            let Some(msg) = self.loopback.pop_front() else {
                if !self.updates.is_empty() {
                    debug!(
                        target: "dispatch",
                        "deferring {} update_field events to the next iteration",
                        self.updates.len()
                    );
                }
                return Ok(());
            };
            if budget == 0 {
                warn!(
                    target: "dispatch",
                    "loopback budget of {} spent, dropping {} lines",
                    limit,
                    self.loopback.len() + 1
                );
                self.loopback.clear();
                continue;
            }
            budget -= 1;
            trace!(target: "dispatch", "loopback: {:?}", msg.args);
            self.dispatch_message(&msg)?;
        }
    }

    /// Encode and send queued lines. Broadcasts and lines addressed to
    /// ourselves are also queued for local dispatch; only the other
    /// receivers go through the transport.
    fn flush_outbox(&mut self) {
        let nick = &self.identity.nick;
        for Outgoing { receivers, args } in self.outbox.drain() {
            let remote = match receivers {
                None => {
                    self.loopback
                        .push_back(Message::new(nick.clone(), None, args.clone()));
                    Some(Vec::new())
                }
                Some(list) => {
                    if list.iter().any(|r| r == nick) {
                        self.loopback.push_back(Message::new(
                            nick.clone(),
                            Some(vec![nick.clone()]),
                            args.clone(),
                        ));
                    }
                    let others: Vec<String> = list.into_iter().filter(|r| r != nick).collect();
                    (!others.is_empty()).then_some(others)
                }
            };
            let Some(remote) = remote else {
                continue;
            };
            let line = wire::encode(nick, &remote, &args);
            trace!(target: "wire", "send: {}", line);
            if self.transport.send(line).is_err() && !self.transport_closed {
                warn!(target: "agent", "transport closed while sending");
                self.transport_closed = true;
            }
        }
    }

    // ===== Input =====

    fn handle_line(&mut self, line: &str) -> Result<Flow, AgentError> {
        self.lines += 1;
        let msg = match wire::decode(line, Some(&self.identity.nick)) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(target: "wire", "dropping {:?}: {}", line, e);
                return Ok(Flow::Continue);
            }
        };

        let flow = match msg.internal.clone() {
            Some(internal) => self.handle_internal(internal)?,
            None => {
                self.dispatch_message(&msg)?;
                Flow::Continue
            }
        };
        self.settle()?;
        Ok(flow)
    }

    fn handle_worker(&mut self, msg: WorkerMessage) -> Result<(), AgentError> {
        let event = Event::Worker { args: msg.args };
        let Some(slot) = self.slots.get(msg.module) else {
            return Ok(());
        };
        if !slot.wants(&event) {
            debug!(target: "dispatch", "{}: dropping unsolicited worker payload", slot.name);
            return Ok(());
        }
        self.call(msg.module, "worker", |m, ctx| m.on_event(&event, ctx))?;
        self.settle()
    }

    fn handle_internal(&mut self, internal: Internal) -> Result<Flow, AgentError> {
        match internal {
            Internal::Exit => {
                info!(target: "agent", "exit requested");
                return Ok(Flow::Exit);
            }
            Internal::Connected(nick) if nick == self.identity.nick => {
                if !self.connected {
                    info!(target: "agent", "connected as {}", nick);
                    self.connected = true;
                    self.fire(&Event::Connect)?;
                    self.announce(None);
                    let modules = self.module_map();
                    self.fire(&Event::ModList { modules })?;
                }
            }
            Internal::Connected(peer) => {
                debug!(target: "agent", "peer connected: {}", peer);
                self.fire(&Event::PeerConnect { peer: peer.clone() })?;
                self.outbox.push(Some(vec![peer]), lsmod_request());
            }
            Internal::Disconnected(nick) if nick == self.identity.nick => {
                if self.connected {
                    info!(target: "agent", "disconnected");
                    self.connected = false;
                    self.fire(&Event::Disconnect)?;
                }
            }
            Internal::Disconnected(peer) => {
                debug!(target: "agent", "peer disconnected: {}", peer);
                self.peers.forget(&peer);
                self.fire(&Event::PeerDisconnect { peer })?;
            }
        }
        Ok(Flow::Continue)
    }

    fn announce(&mut self, to: Option<&str>) {
        for line in announcement(&self.module_map()) {
            self.outbox.push(to.map(|t| vec![t.to_string()]), line);
        }
    }

    /// Queue an error reply. Our own looped back lines are never answered.
    fn error_to(&mut self, to: &str, tokens: Vec<String>) {
        if to == self.identity.nick {
            debug!(target: "dispatch", "not answering own line: {:?}", tokens);
            return;
        }
        self.outbox.push(Some(vec![to.to_string()]), tokens);
    }

    // ===== Dispatch =====

    /// Route a non-internal message: module commands and options first, then
    /// custom events, then framework lines, then reply observers
    fn dispatch_message(&mut self, msg: &Message) -> Result<(), AgentError> {
        let addressed = msg.is_addressed_to(&self.identity.nick);
        if !msg.is_broadcast() && !addressed {
            trace!(target: "dispatch", "not for us: {:?}", msg.receivers);
            return Ok(());
        }

        let Some((first, rest)) = msg.args.split_first() else {
            if addressed {
                self.error_to(&msg.sender, vec!["error".to_string(), "huh?".to_string()]);
            }
            return Ok(());
        };

        if let Some(index) = self.slot_index(first) {
            return self.dispatch_module(index, &msg.sender, rest, addressed);
        }

        if let Some(scope) = event_scope(first) {
            match rest.split_first() {
                Some((name, args)) => {
                    self.dispatch_custom(scope, name, &msg.sender, args)?;
                }
                None => debug!(target: "dispatch", "{} without event name", first),
            }
            return Ok(());
        }

        if first == BOT_SCOPE {
            return self.dispatch_bot(&msg.sender, rest);
        }

        self.fire(&Event::Reply {
            sender: msg.sender.clone(),
            scope: first.clone(),
            args: rest.to_vec(),
        })
    }

    /// Serve `<module> <command> ...`. Lines matching neither a command nor
    /// an option command are replies from a peer's module of the same name
    /// and go to reply observers; `huh?` is only sent when nobody observes
    /// them.
    fn dispatch_module(
        &mut self,
        index: usize,
        sender: &str,
        tokens: &[String],
        addressed: bool,
    ) -> Result<(), AgentError> {
        let module = self.slots[index].name.clone();
        if let Some(cmd_name) = tokens.first() {
            if let Some(&(_, ci)) = self.command_table.get(&(module.clone(), cmd_name.clone())) {
                match self.slots[index].commands[ci].matches(tokens) {
                    MatchOutcome::Matched(args) => {
                        debug!(target: "dispatch", "{}: {} from {}", module, cmd_name, sender);
                        self.call(index, cmd_name, |m, ctx| {
                            m.on_command(cmd_name, sender, &args, ctx)
                        })?;
                    }
                    MatchOutcome::Failed(reason) => {
                        debug!(target: "dispatch", "{}: {} from {}: {}", module, cmd_name, sender, reason);
                        if addressed {
                            self.error_to(sender, error_reply(&module, cmd_name, &reason));
                        }
                    }
                    MatchOutcome::NoMatch => {}
                }
                return Ok(());
            }

            let slot = &mut self.slots[index];
            if !slot.opts.is_empty() {
                match slot
                    .opts
                    .handle_command(tokens, sender, &mut self.store, &mut self.outbox)
                {
                    MatchOutcome::Matched(changed) => {
                        self.updates.extend(changed.into_iter().map(|f| (index, f)));
                        return Ok(());
                    }
                    MatchOutcome::Failed(reason) => {
                        if addressed {
                            self.error_to(sender, error_reply(&module, cmd_name, &reason));
                        }
                        return Ok(());
                    }
                    MatchOutcome::NoMatch => {}
                }
            }
        }

        let reply = Event::Reply {
            sender: sender.to_string(),
            scope: module.clone(),
            args: tokens.to_vec(),
        };
        if self.slots.iter().any(|s| s.wants(&reply)) {
            return self.fire(&reply);
        }
        if addressed {
            let mut huh = vec!["error".to_string(), format!("{}:", module), "huh?".to_string()];
            huh.extend(tokens.first().cloned());
            self.error_to(sender, huh);
        }
        Ok(())
    }

    /// Deliver `<scope>.event <name> ...` to every module with a matching
    /// filter. Returns whether any module received it.
    fn dispatch_custom(
        &mut self,
        scope: &str,
        name: &str,
        sender: &str,
        tokens: &[String],
    ) -> Result<bool, AgentError> {
        let mut delivered = false;
        for index in 0..self.slots.len() {
            let outcome = self.slots[index]
                .filters
                .iter()
                .map(|f| f.match_custom(scope, name, tokens))
                .find(MatchOutcome::is_match);
            match outcome {
                Some(MatchOutcome::Matched(args)) => {
                    let event = Event::Custom {
                        scope: scope.to_string(),
                        name: name.to_string(),
                        sender: sender.to_string(),
                        args,
                    };
                    self.call(index, name, |m, ctx| m.on_event(&event, ctx))?;
                    delivered = true;
                }
                Some(MatchOutcome::Failed(reason)) => {
                    warn!(
                        target: "dispatch",
                        "{}: dropping event {}.{} from {}: {}",
                        self.slots[index].name,
                        scope,
                        name,
                        sender,
                        reason
                    );
                }
                _ => {}
            }
        }
        Ok(delivered)
    }

    /// Framework lines: module discovery and ping
    fn dispatch_bot(&mut self, sender: &str, tokens: &[String]) -> Result<(), AgentError> {
        let own = sender == self.identity.nick;
        match tokens.split_first() {
            // our own announcements and pings looped back
            Some((cmd, _)) if own && DISCOVERY_VERBS.contains(&cmd.as_str()) => {
                trace!(target: "dispatch", "own bot {} line", cmd);
            }
            Some((cmd, [])) if cmd == "lsmod" => self.announce(Some(sender)),
            Some((cmd, [])) if cmd == "ping" => {
                self.outbox.push(
                    Some(vec![sender.to_string()]),
                    vec![BOT_SCOPE.to_string(), "pong".to_string()],
                );
            }
            Some((cmd, [name])) if cmd == "module" => self.peers.on_module(sender, name, None),
            Some((cmd, [name, version])) if cmd == "module" => {
                self.peers.on_module(sender, name, Some(version.as_str()))
            }
            Some((cmd, [])) if cmd == "end_module" => {
                let modules = self.peers.on_end_module(sender);
                self.fire(&Event::PeerModList {
                    peer: sender.to_string(),
                    modules,
                })?;
            }
            Some((name, args)) => {
                if !self.dispatch_custom(BOT_SCOPE, name, sender, args)? {
                    trace!(target: "dispatch", "unhandled bot line {} from {}", name, sender);
                }
            }
            None => debug!(target: "dispatch", "empty bot line from {}", sender),
        }
        Ok(())
    }
}
