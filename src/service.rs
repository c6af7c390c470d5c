use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use parking_lot::RwLock;
use slog::{
    debug,
    info,
    warn,
    Logger,
};
use tokio::{
    select,
    sync::{
        mpsc,
        watch,
    },
};
use web3::types::{
    Address,
    U64,
};

use crate::{
    blockchain::events::BlockchainEvents,
    errors::ServicesError,
    events::{
        Event,
        ScheduledEvent,
        UpdatedHeadBlock,
    },
    handlers::{
        handle_event,
        Context,
    },
    messages::{
        on_monitor_request,
        verify_update_signature,
        OffchainMessage,
        PFSCapacityUpdate,
        PFSFeeUpdate,
    },
    primitives::{
        BlockNumber,
        ChainID,
        PathfindingConfig,
        ServicesConfig,
        TokenAmount,
        TokenNetworkAddress,
    },
    routing::{
        RoutePath,
        RoutingError,
        TokenNetworkGraph,
    },
    scheduler::Scheduler,
    state::{
        BlockchainState,
        Channel,
        ChannelStatus,
    },
    storage::Storage,
};

pub type Result<T> = std::result::Result<T, ServicesError>;

/// Consistent view of the durable state, taken between block batches.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub blockchain: BlockchainState,
    pub channels: Vec<Channel>,
    pub scheduled_events: Vec<ScheduledEvent>,
}

/// Drives the monitoring state machine: polls the chain head, turns
/// confirmed logs into events, applies them in order and releases whatever
/// the new height makes due. One batch per confirmed block range, applied
/// atomically.
pub struct MonitoringService {
    context: Context,
    scheduler: Scheduler,
    blockchain_events: Arc<dyn BlockchainEvents>,
    pathfinding: Option<Arc<PathfindingService>>,
    block_confirmations: u64,
    request_retention_blocks: u64,
    poll_interval: Duration,
    log: Logger,
}

impl MonitoringService {
    pub fn new(
        context: Context,
        blockchain_events: Arc<dyn BlockchainEvents>,
        config: &ServicesConfig,
        log: Logger,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(log.clone()),
            context,
            blockchain_events,
            pathfinding: None,
            block_confirmations: config.block_confirmations,
            request_retention_blocks: config.request_retention_blocks,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            log,
        }
    }

    /// Attaches a pathfinding projection that follows the same confirmed
    /// event feed and receives the PFS updates from the message channel.
    pub fn with_pathfinding(mut self, pathfinding: Arc<PathfindingService>) -> Self {
        self.pathfinding = Some(pathfinding);
        self
    }

    /// Main loop. Alternates between chain polling and the off-chain
    /// message feed until shutdown is signalled.
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut poll = tokio::time::interval(self.poll_interval);
        loop {
            select! {
                _ = poll.tick() => {
                    match self.blockchain_events.latest_block().await {
                        Ok(chain_head) => {
                            if let Err(e) = self.process_new_block(chain_head).await {
                                warn!(self.log, "Block processing failed";
                                    "head" => chain_head.as_u64(),
                                    "error" => format!("{}", e));
                            }
                        }
                        Err(e) => {
                            warn!(self.log, "Cannot fetch chain head"; "error" => format!("{}", e));
                        }
                    }
                }
                Some(raw) = messages.recv() => {
                    self.ingest_offchain_message(&raw);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(self.log, "Monitoring service shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Catches the durable state up to the confirmed height derived from
    /// `chain_head`. The whole batch commits or rolls back as one unit;
    /// the head checkpoint is the last write, so a crash mid-batch replays
    /// the same range on restart.
    pub async fn process_new_block(&self, chain_head: BlockNumber) -> Result<()> {
        let confirmed = U64::from(chain_head.as_u64().saturating_sub(self.block_confirmations));
        let state = self.chain_state()?;
        if confirmed <= state.latest_known_block {
            return Ok(());
        }
        let from_block = state.latest_known_block + 1u64;

        let mut addresses = vec![state.token_network_registry_address];
        addresses.extend(state.token_network_addresses.iter().copied());

        debug!(self.log, "Processing block batch";
            "from" => from_block.as_u64(),
            "to" => confirmed.as_u64());

        self.context.storage.begin()?;
        match self.apply_batch(addresses, from_block, confirmed).await {
            Ok(()) => {
                self.context.storage.commit()?;
                Ok(())
            }
            Err(e) => {
                self.context.storage.rollback()?;
                Err(e)
            }
        }
    }

    async fn apply_batch(
        &self,
        mut addresses: Vec<Address>,
        from_block: BlockNumber,
        confirmed: BlockNumber,
    ) -> Result<()> {
        // A token network created inside this range emits its own logs in
        // the very same range, so the range is re-queried for every newly
        // discovered address before the batch closes.
        let mut query = addresses.clone();
        while !query.is_empty() {
            let events = self
                .blockchain_events
                .events_in_range(&query, from_block, confirmed)
                .await
                .map_err(|e| ServicesError { msg: format!("{}", e) })?;

            let mut discovered = vec![];
            for event in events {
                if let Event::ReceiveTokenNetworkCreated(inner) = &event {
                    if !addresses.contains(&inner.token_network_address) {
                        discovered.push(inner.token_network_address);
                    }
                }
                handle_event(&self.context, event.clone()).await?;
                if let Some(pathfinding) = &self.pathfinding {
                    pathfinding.apply_event(&event);
                }
            }
            addresses.extend(discovered.iter().copied());
            query = discovered;
        }

        self.scheduler.release_due(&self.context, confirmed).await?;
        handle_event(
            &self.context,
            Event::UpdatedHeadBlock(UpdatedHeadBlock {
                block_number: confirmed,
            }),
        )
        .await?;

        let pruned = self
            .context
            .storage
            .prune_monitor_requests(confirmed, self.request_retention_blocks)?;
        if pruned > 0 {
            debug!(self.log, "Pruned stale monitor requests"; "count" => pruned);
        }
        Ok(())
    }

    /// Feeds one raw off-chain message through validation. Malformed input
    /// and rejected requests are dropped, never fatal.
    pub fn ingest_offchain_message(&self, raw: &str) -> bool {
        let message: OffchainMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(self.log, "Dropping unparseable message"; "error" => format!("{}", e));
                return false;
            }
        };
        match message {
            OffchainMessage::MonitorRequest(request) => {
                let received_at_block = match self.chain_state() {
                    Ok(state) => state.latest_known_block,
                    Err(_) => U64::zero(),
                };
                on_monitor_request(
                    &self.context.storage,
                    self.context.chain_id,
                    &request,
                    received_at_block,
                    &self.log,
                )
            }
            OffchainMessage::PFSCapacityUpdate(update) => match &self.pathfinding {
                Some(pathfinding) => match pathfinding.on_capacity_update(&update) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(self.log, "Dropping capacity update"; "error" => format!("{}", e));
                        false
                    }
                },
                None => false,
            },
            OffchainMessage::PFSFeeUpdate(update) => match &self.pathfinding {
                Some(pathfinding) => match pathfinding.on_fee_update(&update) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(self.log, "Dropping fee update"; "error" => format!("{}", e));
                        false
                    }
                },
                None => false,
            },
        }
    }

    pub fn current_state_snapshot(&self) -> Result<StateSnapshot> {
        Ok(StateSnapshot {
            blockchain: self.chain_state()?,
            channels: self.context.storage.channels()?,
            scheduled_events: self.context.storage.scheduled_events()?,
        })
    }

    fn chain_state(&self) -> Result<BlockchainState> {
        self.context.storage.chain_state()?.ok_or_else(|| ServicesError {
            msg: "Chain state not initialized".to_owned(),
        })
    }
}

/// In-memory routing projection over the same event feed. Holds one graph
/// per token network; graphs are rebuilt from the durable store at startup
/// and then kept current incrementally.
pub struct PathfindingService {
    chain_id: ChainID,
    graphs: RwLock<HashMap<TokenNetworkAddress, TokenNetworkGraph>>,
    max_paths: usize,
    log: Logger,
}

impl PathfindingService {
    pub fn new(chain_id: ChainID, config: &PathfindingConfig, log: Logger) -> Self {
        Self {
            chain_id,
            graphs: RwLock::new(HashMap::new()),
            max_paths: config.max_paths,
            log,
        }
    }

    /// Rebuilds all graphs from stored channels. Closed and settled
    /// channels never route, so only open ones are projected.
    pub fn restore(&self, storage: &Storage) -> Result<()> {
        let mut graphs = self.graphs.write();
        graphs.clear();
        for token_network_address in storage.token_networks()? {
            graphs.insert(token_network_address, TokenNetworkGraph::default());
        }
        for channel in storage.channels()? {
            if channel.status != ChannelStatus::Opened {
                continue;
            }
            graphs
                .entry(channel.token_network_address)
                .or_insert_with(TokenNetworkGraph::default)
                .add_channel(
                    channel.canonical_identifier(),
                    channel.participant1,
                    channel.participant2,
                    channel.settle_timeout,
                );
        }
        Ok(())
    }

    /// Mirrors confirmed chain events into the routing projection.
    pub fn apply_event(&self, event: &Event) {
        let mut graphs = self.graphs.write();
        match event {
            Event::ReceiveTokenNetworkCreated(inner) => {
                graphs
                    .entry(inner.token_network_address)
                    .or_insert_with(TokenNetworkGraph::default);
            }
            Event::ReceiveChannelOpened(inner) => {
                graphs
                    .entry(inner.canonical_identifier.token_network_address)
                    .or_insert_with(TokenNetworkGraph::default)
                    .add_channel(
                        inner.canonical_identifier.clone(),
                        inner.participant1,
                        inner.participant2,
                        inner.settle_timeout,
                    );
            }
            Event::ReceiveChannelClosed(inner) => {
                if let Some(graph) = graphs.get_mut(&inner.canonical_identifier.token_network_address) {
                    graph.remove_channel(inner.canonical_identifier.channel_identifier);
                }
            }
            _ => {}
        }
    }

    pub fn on_capacity_update(&self, update: &PFSCapacityUpdate) -> std::result::Result<(), RoutingError> {
        if update.chain_id != self.chain_id {
            return Err(RoutingError::WrongChain);
        }
        if !verify_update_signature(update, &update.signature, update.updating_participant) {
            return Err(RoutingError::InvalidSignature);
        }
        let mut graphs = self.graphs.write();
        let graph = graphs
            .get_mut(&update.token_network_address)
            .ok_or(RoutingError::TokenNetworkUnknown)?;
        graph.apply_capacity_update(update)
    }

    pub fn on_fee_update(&self, update: &PFSFeeUpdate) -> std::result::Result<(), RoutingError> {
        if update.chain_id != self.chain_id {
            return Err(RoutingError::WrongChain);
        }
        if !verify_update_signature(update, &update.signature, update.updating_participant) {
            return Err(RoutingError::InvalidSignature);
        }
        let mut graphs = self.graphs.write();
        let graph = graphs
            .get_mut(&update.token_network_address)
            .ok_or(RoutingError::TokenNetworkUnknown)?;
        graph.apply_fee_update(update)
    }

    pub fn get_paths(
        &self,
        token_network_address: TokenNetworkAddress,
        from: Address,
        to: Address,
        value: TokenAmount,
    ) -> std::result::Result<Vec<RoutePath>, RoutingError> {
        let graphs = self.graphs.read();
        let graph = graphs
            .get(&token_network_address)
            .ok_or(RoutingError::TokenNetworkUnknown)?;
        graph.get_paths(from, to, value, self.max_paths)
    }

    pub fn ingest_offchain_message(&self, raw: &str) -> bool {
        let message: OffchainMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(self.log, "Dropping unparseable message"; "error" => format!("{}", e));
                return false;
            }
        };
        let outcome = match message {
            OffchainMessage::PFSCapacityUpdate(update) => self.on_capacity_update(&update),
            OffchainMessage::PFSFeeUpdate(update) => self.on_fee_update(&update),
            // Monitor requests belong to the monitoring service.
            OffchainMessage::MonitorRequest(_) => return false,
        };
        match outcome {
            Ok(()) => true,
            Err(e) => {
                debug!(self.log, "Dropping PFS update"; "error" => format!("{}", e));
                false
            }
        }
    }
}
