use std::sync::Arc;

use slog::{
    debug,
    info,
    warn,
    Logger,
};

use crate::{
    blockchain::proxies::TransactionSender,
    errors::HandlerError,
    events::{
        claim_reward_triggered,
        monitoring_triggered,
        ActionClaimRewardTriggered,
        ActionMonitoringTriggered,
        Event,
        ReceiveChannelClosed,
        ReceiveChannelOpened,
        ReceiveChannelSettled,
        ReceiveNonClosingBalanceProofUpdated,
        ReceiveTokenNetworkCreated,
        ScheduledEvent,
        UpdatedHeadBlock,
    },
    primitives::{
        BlockNumber,
        ChainID,
    },
    state::{
        Channel,
        ChannelStatus,
    },
    storage::{
        Storage,
        StorageError,
    },
};

pub type Result<T> = std::result::Result<T, HandlerError>;

impl From<StorageError> for HandlerError {
    fn from(e: StorageError) -> Self {
        HandlerError { msg: format!("{}", e) }
    }
}

/// Everything handlers may touch. Built once at startup and passed
/// explicitly; there is no ambient shared state.
pub struct Context {
    pub chain_id: ChainID,
    pub wait_blocks: u64,
    pub storage: Storage,
    pub transaction_sender: Arc<dyn TransactionSender>,
    pub log: Logger,
}

impl Context {
    fn schedule(&self, event: Event, trigger_block_number: BlockNumber) -> Result<()> {
        self.storage.store_scheduled_event(&ScheduledEvent {
            trigger_block_number,
            event,
        })?;
        Ok(())
    }

    fn head_block(&self) -> Result<BlockNumber> {
        Ok(self
            .storage
            .chain_state()?
            .map(|state| state.latest_known_block)
            .unwrap_or_default())
    }
}

/// Applies one event to the durable state. Every arm is idempotent: the
/// confirmed-log feed may re-deliver events after restarts or shallow
/// reorgs, and scheduled events may be dispatched again after a crash
/// between dispatch and commit.
pub async fn handle_event(context: &Context, event: Event) -> Result<()> {
    match event {
        Event::ReceiveTokenNetworkCreated(inner) => handle_token_network_created(context, inner),
        Event::ReceiveChannelOpened(inner) => handle_channel_opened(context, inner),
        Event::ReceiveChannelClosed(inner) => handle_channel_closed(context, inner),
        Event::ReceiveChannelSettled(inner) => handle_channel_settled(context, inner),
        Event::ReceiveNonClosingBalanceProofUpdated(inner) => handle_balance_proof_updated(context, inner),
        Event::ActionMonitoringTriggered(inner) => handle_monitoring_triggered(context, inner).await,
        Event::ActionClaimRewardTriggered(inner) => handle_claim_reward_triggered(context, inner).await,
        Event::UpdatedHeadBlock(inner) => handle_updated_head_block(context, inner),
    }
}

fn handle_token_network_created(context: &Context, event: ReceiveTokenNetworkCreated) -> Result<()> {
    context.storage.add_token_network(event.token_network_address)?;
    debug!(context.log, "Token network discovered";
        "token_network" => format!("{:#x}", event.token_network_address));
    Ok(())
}

fn handle_channel_opened(context: &Context, event: ReceiveChannelOpened) -> Result<()> {
    let channel = Channel::new(
        event.canonical_identifier.token_network_address,
        event.canonical_identifier.channel_identifier,
        event.participant1,
        event.participant2,
        event.settle_timeout,
    );
    // Re-delivery overwrites the row with identical data.
    context.storage.upsert_channel(&channel)?;
    debug!(context.log, "Channel opened";
        "channel" => channel.channel_identifier.to_string());
    Ok(())
}

fn handle_channel_closed(context: &Context, event: ReceiveChannelClosed) -> Result<()> {
    let mut channel = match context.storage.channel(&event.canonical_identifier)? {
        Some(channel) => channel,
        None => {
            // A later catch-up pass may still deliver the opened event, so
            // this is a diagnostic rather than a failure.
            info!(context.log, "Close event for unknown channel, skipping";
                "channel" => event.canonical_identifier.channel_identifier.to_string());
            return Ok(());
        }
    };
    if channel.status != ChannelStatus::Opened {
        return Ok(());
    }

    channel.status = ChannelStatus::Closed;
    channel.closing_block = Some(event.block_number);
    channel.closing_participant = Some(event.closing_participant);
    context.storage.upsert_channel(&channel)?;

    let trigger = event.block_number + context.wait_blocks;
    match channel.partner_of(event.closing_participant) {
        Some(non_closing) => {
            context.schedule(
                monitoring_triggered(event.canonical_identifier.clone(), non_closing),
                trigger,
            )?;
            info!(context.log, "Channel closed, monitoring scheduled";
                "channel" => channel.channel_identifier.to_string(),
                "trigger_block" => trigger.as_u64());
        }
        None => {
            warn!(context.log, "Closing participant is not part of the channel";
                "channel" => channel.channel_identifier.to_string());
        }
    }
    Ok(())
}

fn handle_channel_settled(context: &Context, event: ReceiveChannelSettled) -> Result<()> {
    let mut channel = match context.storage.channel(&event.canonical_identifier)? {
        Some(channel) => channel,
        None => {
            info!(context.log, "Settle event for unknown channel, skipping";
                "channel" => event.canonical_identifier.channel_identifier.to_string());
            return Ok(());
        }
    };
    if channel.status != ChannelStatus::Closed {
        return Ok(());
    }

    channel.status = ChannelStatus::Settled;
    // Settled rows are kept, debuggability wins over storage economy.
    context.storage.upsert_channel(&channel)?;

    let close_block = channel.closing_block.unwrap_or(event.block_number);
    let trigger = close_block + channel.settle_timeout;
    if let Some(non_closing) = channel
        .closing_participant
        .and_then(|closer| channel.partner_of(closer))
    {
        context.schedule(
            claim_reward_triggered(event.canonical_identifier.clone(), non_closing),
            trigger,
        )?;
        info!(context.log, "Channel settled, reward claim scheduled";
            "channel" => channel.channel_identifier.to_string(),
            "trigger_block" => trigger.as_u64());
    }
    Ok(())
}

fn handle_balance_proof_updated(context: &Context, event: ReceiveNonClosingBalanceProofUpdated) -> Result<()> {
    // Placeholder: dispatched through the same idempotent contract so a
    // future implementation slots in without touching dispatch.
    debug!(context.log, "Non-closing balance proof updated on-chain";
        "channel" => event.canonical_identifier.channel_identifier.to_string(),
        "nonce" => event.nonce.to_string());
    Ok(())
}

async fn handle_monitoring_triggered(context: &Context, event: ActionMonitoringTriggered) -> Result<()> {
    let mut channel = match context.storage.channel(&event.canonical_identifier)? {
        Some(channel) => channel,
        None => {
            info!(context.log, "Monitoring triggered for unknown channel";
                "channel" => event.canonical_identifier.channel_identifier.to_string());
            return Ok(());
        }
    };
    // Already done, or the channel moved on: redelivery is a no-op.
    if channel.status != ChannelStatus::Closed || channel.monitor_tx_hash.is_some() {
        return Ok(());
    }

    let request = match context
        .storage
        .monitor_request(&event.canonical_identifier, event.non_closing_signer)?
    {
        Some(request) => request,
        None => {
            debug!(context.log, "No monitor request on file";
                "channel" => event.canonical_identifier.channel_identifier.to_string());
            return Ok(());
        }
    };

    match context.transaction_sender.monitor(&request).await {
        Ok(transaction_hash) => {
            channel.monitor_tx_hash = Some(transaction_hash);
            context.storage.upsert_channel(&channel)?;
            info!(context.log, "Balance proof submitted on-chain";
                "channel" => channel.channel_identifier.to_string(),
                "tx" => format!("{:#x}", transaction_hash));
        }
        Err(e) => {
            // Local state stays untouched; the next scheduler pass picks
            // up the retry.
            warn!(context.log, "Monitor transaction failed, will retry";
                "channel" => channel.channel_identifier.to_string(),
                "error" => format!("{}", e));
            let retry_block = context.head_block()? + 1u64;
            context.schedule(Event::ActionMonitoringTriggered(event), retry_block)?;
        }
    }
    Ok(())
}

async fn handle_claim_reward_triggered(context: &Context, event: ActionClaimRewardTriggered) -> Result<()> {
    let mut channel = match context.storage.channel(&event.canonical_identifier)? {
        Some(channel) => channel,
        None => {
            info!(context.log, "Reward claim triggered for unknown channel";
                "channel" => event.canonical_identifier.channel_identifier.to_string());
            return Ok(());
        }
    };
    if channel.status != ChannelStatus::Settled || channel.claim_tx_hash.is_some() {
        return Ok(());
    }
    // A reward only exists if we monitored the channel.
    if channel.monitor_tx_hash.is_none() {
        return Ok(());
    }

    match context
        .transaction_sender
        .claim_reward(&event.canonical_identifier, event.non_closing_signer)
        .await
    {
        Ok(transaction_hash) => {
            channel.claim_tx_hash = Some(transaction_hash);
            context.storage.upsert_channel(&channel)?;
            info!(context.log, "Reward claimed";
                "channel" => channel.channel_identifier.to_string(),
                "tx" => format!("{:#x}", transaction_hash));
        }
        Err(e) => {
            warn!(context.log, "Reward claim failed, will retry";
                "channel" => channel.channel_identifier.to_string(),
                "error" => format!("{}", e));
            let retry_block = context.head_block()? + 1u64;
            context.schedule(Event::ActionClaimRewardTriggered(event), retry_block)?;
        }
    }
    Ok(())
}

fn handle_updated_head_block(context: &Context, event: UpdatedHeadBlock) -> Result<()> {
    context.storage.update_latest_known_block(event.block_number)?;
    Ok(())
}
