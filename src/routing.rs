use chrono::{
    DateTime,
    Utc,
};
use derive_more::Display;
use std::{
    cmp::Reverse,
    collections::{
        BinaryHeap,
        HashMap,
        HashSet,
    },
};
use thiserror::Error;
use web3::types::{
    Address,
    U256,
};

use crate::{
    constants::{
        DIJKSTRA_HOP_BIAS,
        PATH_DIVERSITY_PENALTY,
    },
    messages::{
        PFSCapacityUpdate,
        PFSFeeUpdate,
    },
    primitives::{
        CanonicalIdentifier,
        ChannelIdentifier,
        FeeAmount,
        Nonce,
        SettleTimeout,
        TokenAmount,
    },
};

#[derive(Error, Display, Debug, PartialEq)]
pub enum RoutingError {
    #[display(fmt = "Token network does not exist")]
    TokenNetworkUnknown,
    #[display(fmt = "Channel is not part of the graph")]
    ChannelUnknown,
    #[display(fmt = "Capacity update nonce is not newer than the stored one")]
    StaleCapacityUpdate,
    #[display(fmt = "Fee update timestamp is not newer than the stored one")]
    StaleFeeUpdate,
    #[display(fmt = "Sender is not a participant of the channel")]
    NotAParticipant,
    #[display(fmt = "Signature does not match the updating participant")]
    InvalidSignature,
    #[display(fmt = "Update is for a different chain")]
    WrongChain,
    #[display(fmt = "Could not find usable channels for this transfer")]
    NoUsableChannels,
}

/// Directional view of one channel: what `from` can route towards `to`,
/// and at what price.
#[derive(Clone, Debug)]
pub struct ChannelView {
    pub canonical_identifier: CanonicalIdentifier,
    pub capacity: TokenAmount,
    pub settle_timeout: SettleTimeout,
    pub flat_fee: FeeAmount,
    pub proportional_fee_ppm: U256,
    pub update_nonce: Nonce,
    pub fee_timestamp: Option<DateTime<Utc>>,
}

impl ChannelView {
    fn new(canonical_identifier: CanonicalIdentifier, settle_timeout: SettleTimeout) -> Self {
        Self {
            canonical_identifier,
            capacity: TokenAmount::zero(),
            settle_timeout,
            flat_fee: FeeAmount::zero(),
            proportional_fee_ppm: U256::zero(),
            update_nonce: Nonce::zero(),
            fee_timestamp: None,
        }
    }

    fn fee_for(&self, amount: TokenAmount) -> U256 {
        self.flat_fee + amount * self.proportional_fee_ppm / U256::from(1_000_000u64)
    }
}

#[derive(Clone, Debug)]
pub struct RoutePath {
    pub nodes: Vec<Address>,
    pub estimated_fee: U256,
}

/// Routing graph of one token network. Nodes are participant addresses,
/// edges are directional channel views. Rebuilt from the durable store on
/// startup and kept current from chain events and signed PFS updates.
#[derive(Default)]
pub struct TokenNetworkGraph {
    edges: HashMap<(Address, Address), ChannelView>,
    channels: HashMap<ChannelIdentifier, (Address, Address)>,
}

impl TokenNetworkGraph {
    pub fn add_channel(
        &mut self,
        canonical_identifier: CanonicalIdentifier,
        participant1: Address,
        participant2: Address,
        settle_timeout: SettleTimeout,
    ) {
        self.channels
            .insert(canonical_identifier.channel_identifier, (participant1, participant2));
        self.edges
            .entry((participant1, participant2))
            .or_insert_with(|| ChannelView::new(canonical_identifier.clone(), settle_timeout));
        self.edges
            .entry((participant2, participant1))
            .or_insert_with(|| ChannelView::new(canonical_identifier, settle_timeout));
    }

    /// A closed channel routes nothing; both directions disappear.
    pub fn remove_channel(&mut self, channel_identifier: ChannelIdentifier) {
        if let Some((participant1, participant2)) = self.channels.remove(&channel_identifier) {
            self.edges.remove(&(participant1, participant2));
            self.edges.remove(&(participant2, participant1));
        }
    }

    /// Capacity updates carry a per-sender nonce that must strictly
    /// increase, the same discipline monitor requests follow.
    pub fn apply_capacity_update(&mut self, update: &PFSCapacityUpdate) -> Result<(), RoutingError> {
        let participants = self
            .channels
            .get(&update.channel_identifier)
            .ok_or(RoutingError::ChannelUnknown)?;
        if update.updating_participant != participants.0 && update.updating_participant != participants.1 {
            return Err(RoutingError::NotAParticipant);
        }

        let view = self
            .edges
            .get_mut(&(update.updating_participant, update.other_participant))
            .ok_or(RoutingError::ChannelUnknown)?;
        if update.updating_nonce <= view.update_nonce {
            return Err(RoutingError::StaleCapacityUpdate);
        }
        view.update_nonce = update.updating_nonce;
        view.capacity = update.updating_capacity;
        Ok(())
    }

    /// Fee schedules are versioned by sender timestamp, strictly
    /// increasing.
    pub fn apply_fee_update(&mut self, update: &PFSFeeUpdate) -> Result<(), RoutingError> {
        let participants = self
            .channels
            .get(&update.channel_identifier)
            .copied()
            .ok_or(RoutingError::ChannelUnknown)?;
        let partner = if update.updating_participant == participants.0 {
            participants.1
        } else if update.updating_participant == participants.1 {
            participants.0
        } else {
            return Err(RoutingError::NotAParticipant);
        };

        let view = self
            .edges
            .get_mut(&(update.updating_participant, partner))
            .ok_or(RoutingError::ChannelUnknown)?;
        if let Some(stored) = view.fee_timestamp {
            if update.timestamp <= stored {
                return Err(RoutingError::StaleFeeUpdate);
            }
        }
        view.fee_timestamp = Some(update.timestamp);
        view.flat_fee = update.flat_fee;
        view.proportional_fee_ppm = update.proportional_fee_ppm;
        Ok(())
    }

    /// Weighted shortest paths from `from` to `to` able to carry `value`.
    /// Edge weight is the mediation fee plus a constant hop bias; edges of
    /// already returned paths are penalized so subsequent paths diverge.
    pub fn get_paths(
        &self,
        from: Address,
        to: Address,
        value: TokenAmount,
        max_paths: usize,
    ) -> Result<Vec<RoutePath>, RoutingError> {
        let mut paths = vec![];
        let mut used_edges: HashSet<(Address, Address)> = HashSet::new();

        for _ in 0..max_paths {
            match self.dijkstra(from, to, value, &used_edges) {
                Some(path) => {
                    for window in path.nodes.windows(2) {
                        used_edges.insert((window[0], window[1]));
                    }
                    let duplicate = paths.iter().any(|known: &RoutePath| known.nodes == path.nodes);
                    if duplicate {
                        break;
                    }
                    paths.push(path);
                }
                None => break,
            }
        }

        if paths.is_empty() {
            return Err(RoutingError::NoUsableChannels);
        }
        Ok(paths)
    }

    fn dijkstra(
        &self,
        from: Address,
        to: Address,
        value: TokenAmount,
        penalized: &HashSet<(Address, Address)>,
    ) -> Option<RoutePath> {
        let mut distances: HashMap<Address, U256> = HashMap::new();
        let mut previous: HashMap<Address, Address> = HashMap::new();
        let mut heap: BinaryHeap<Reverse<(U256, Address)>> = BinaryHeap::new();

        distances.insert(from, U256::zero());
        heap.push(Reverse((U256::zero(), from)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if node == to {
                break;
            }
            if distances.get(&node).map(|best| cost > *best).unwrap_or(false) {
                continue;
            }

            for ((edge_from, edge_to), view) in &self.edges {
                if *edge_from != node || view.capacity < value {
                    continue;
                }
                let mut weight = view.fee_for(value) + U256::from(DIJKSTRA_HOP_BIAS);
                if penalized.contains(&(*edge_from, *edge_to)) {
                    weight = weight + U256::from(PATH_DIVERSITY_PENALTY);
                }
                let next_cost = cost + weight;
                let improved = distances
                    .get(edge_to)
                    .map(|best| next_cost < *best)
                    .unwrap_or(true);
                if improved {
                    distances.insert(*edge_to, next_cost);
                    previous.insert(*edge_to, node);
                    heap.push(Reverse((next_cost, *edge_to)));
                }
            }
        }

        distances.get(&to)?;
        let mut nodes = vec![to];
        let mut cursor = to;
        while cursor != from {
            cursor = *previous.get(&cursor)?;
            nodes.push(cursor);
        }
        nodes.reverse();

        // The search weight carries the hop bias and diversity penalties;
        // the reported fee is what mediators actually charge.
        let mut estimated_fee = U256::zero();
        for window in nodes.windows(2) {
            if let Some(view) = self.edges.get(&(window[0], window[1])) {
                estimated_fee = estimated_fee + view.fee_for(value);
            }
        }
        Some(RoutePath { nodes, estimated_fee })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::primitives::ChainID;
    use web3::types::U64;

    fn addr(value: u8) -> Address {
        Address::repeat_byte(value)
    }

    fn canonical(channel_identifier: u64) -> CanonicalIdentifier {
        CanonicalIdentifier {
            token_network_address: addr(0x10),
            channel_identifier: U256::from(channel_identifier),
        }
    }

    fn capacity_update(
        channel_identifier: u64,
        updating: Address,
        other: Address,
        nonce: u64,
        capacity: u64,
    ) -> PFSCapacityUpdate {
        PFSCapacityUpdate {
            chain_id: ChainID::Goerli,
            token_network_address: addr(0x10),
            channel_identifier: U256::from(channel_identifier),
            updating_participant: updating,
            other_participant: other,
            updating_nonce: U256::from(nonce),
            updating_capacity: U256::from(capacity),
            signature: vec![],
        }
    }

    fn graph_line() -> TokenNetworkGraph {
        // a - b - c, plus a direct a - c channel with low capacity.
        let mut graph = TokenNetworkGraph::default();
        graph.add_channel(canonical(1), addr(0xa), addr(0xb), U64::from(500u64));
        graph.add_channel(canonical(2), addr(0xb), addr(0xc), U64::from(500u64));
        graph.add_channel(canonical(3), addr(0xa), addr(0xc), U64::from(500u64));

        graph
            .apply_capacity_update(&capacity_update(1, addr(0xa), addr(0xb), 1, 1000))
            .unwrap();
        graph
            .apply_capacity_update(&capacity_update(2, addr(0xb), addr(0xc), 1, 1000))
            .unwrap();
        graph
            .apply_capacity_update(&capacity_update(3, addr(0xa), addr(0xc), 1, 10))
            .unwrap();
        graph
    }

    #[test]
    fn capacity_limits_usable_edges() {
        let graph = graph_line();

        // A transfer of 100 cannot use the direct low-capacity channel.
        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(100u64), 1).unwrap();
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xb), addr(0xc)]);

        // A small transfer prefers the direct channel, fewer hops.
        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(5u64), 1).unwrap();
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xc)]);
    }

    #[test]
    fn stale_capacity_update_rejected() {
        let mut graph = graph_line();
        let stale = capacity_update(1, addr(0xa), addr(0xb), 1, 5000);
        assert_eq!(graph.apply_capacity_update(&stale), Err(RoutingError::StaleCapacityUpdate));
        // Stored capacity unchanged.
        let paths = graph.get_paths(addr(0xa), addr(0xb), U256::from(900u64), 1).unwrap();
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xb)]);
    }

    #[test]
    fn fee_update_needs_increasing_timestamp() {
        let mut graph = graph_line();
        let at = |seconds: i64| Utc.timestamp(seconds, 0);
        let mut update = PFSFeeUpdate {
            chain_id: ChainID::Goerli,
            token_network_address: addr(0x10),
            channel_identifier: U256::from(1u64),
            updating_participant: addr(0xa),
            flat_fee: U256::from(7u64),
            proportional_fee_ppm: U256::zero(),
            timestamp: at(100),
            signature: vec![],
        };
        graph.apply_fee_update(&update).unwrap();

        update.flat_fee = U256::from(9u64);
        assert_eq!(graph.apply_fee_update(&update), Err(RoutingError::StaleFeeUpdate));

        update.timestamp = at(101);
        graph.apply_fee_update(&update).unwrap();

        let paths = graph.get_paths(addr(0xa), addr(0xb), U256::from(100u64), 1).unwrap();
        assert_eq!(paths[0].estimated_fee, U256::from(9u64));
    }

    #[test]
    fn fees_steer_path_selection() {
        let mut graph = graph_line();
        // Make the two-hop route expensive; the direct channel can carry
        // the small transfer and becomes strictly cheaper.
        let update = PFSFeeUpdate {
            chain_id: ChainID::Goerli,
            token_network_address: addr(0x10),
            channel_identifier: U256::from(1u64),
            updating_participant: addr(0xa),
            flat_fee: U256::from(50u64),
            proportional_fee_ppm: U256::zero(),
            timestamp: Utc.timestamp(100, 0),
            signature: vec![],
        };
        graph.apply_fee_update(&update).unwrap();

        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(5u64), 1).unwrap();
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xc)]);
    }

    #[test]
    fn diverse_paths_when_requested() {
        let graph = graph_line();
        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(5u64), 2).unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0].nodes, paths[1].nodes);
    }

    #[test]
    fn reported_fee_excludes_diversity_penalty() {
        // a - b fans out to c directly and through d; every route shares
        // the a - b edge, so the second path must reuse a penalized edge.
        let mut graph = TokenNetworkGraph::default();
        graph.add_channel(canonical(1), addr(0xa), addr(0xb), U64::from(500u64));
        graph.add_channel(canonical(2), addr(0xb), addr(0xc), U64::from(500u64));
        graph.add_channel(canonical(3), addr(0xb), addr(0xd), U64::from(500u64));
        graph.add_channel(canonical(4), addr(0xd), addr(0xc), U64::from(500u64));
        graph
            .apply_capacity_update(&capacity_update(1, addr(0xa), addr(0xb), 1, 1000))
            .unwrap();
        graph
            .apply_capacity_update(&capacity_update(2, addr(0xb), addr(0xc), 1, 1000))
            .unwrap();
        graph
            .apply_capacity_update(&capacity_update(3, addr(0xb), addr(0xd), 1, 1000))
            .unwrap();
        graph
            .apply_capacity_update(&capacity_update(4, addr(0xd), addr(0xc), 1, 1000))
            .unwrap();

        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(5u64), 2).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xb), addr(0xc)]);
        assert_eq!(paths[1].nodes, vec![addr(0xa), addr(0xb), addr(0xd), addr(0xc)]);
        // All fee schedules are zero; neither path may report the search
        // penalty as a fee.
        assert_eq!(paths[0].estimated_fee, U256::zero());
        assert_eq!(paths[1].estimated_fee, U256::zero());
    }

    #[test]
    fn no_route_is_an_error() {
        let graph = graph_line();
        assert_eq!(
            graph.get_paths(addr(0xa), addr(0xdd), U256::from(5u64), 1).err(),
            Some(RoutingError::NoUsableChannels)
        );
    }

    #[test]
    fn closed_channel_leaves_the_graph() {
        let mut graph = graph_line();
        graph.remove_channel(U256::from(3u64));
        let paths = graph.get_paths(addr(0xa), addr(0xc), U256::from(5u64), 1).unwrap();
        assert_eq!(paths[0].nodes, vec![addr(0xa), addr(0xb), addr(0xc)]);
    }
}
