use derive_more::Display;
use rusqlite::{
    params,
    Connection,
    Row,
    NO_PARAMS,
};
use std::convert::TryInto;
use std::str::FromStr;
use web3::types::{
    Address,
    H256,
    U256,
    U64,
};

use crate::{
    constants::DB_SCHEMA_VERSION,
    errors::{
        ServicesError,
        TypeError,
    },
    events::ScheduledEvent,
    primitives::{
        parse_address,
        BlockNumber,
        CanonicalIdentifier,
        ChainID,
    },
    state::{
        BlockchainState,
        Channel,
        ChannelStatus,
        MonitorRequest,
    },
};

mod sqlite;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Display, Debug)]
pub enum StorageError {
    #[display(fmt = "SQL Error: {}", _0)]
    Sql(rusqlite::Error),
    #[display(fmt = "Cannot serialize for storage")]
    SerializationError,
    #[display(fmt = "Database schema version {} does not match expected {}", found, expected)]
    SchemaMismatch { found: u32, expected: u32 },
    #[display(fmt = "Cannot map stored value: {}", _0)]
    ID(TypeError),
    #[display(fmt = "Error: {}", _0)]
    Other(&'static str),
}

impl From<StorageError> for ServicesError {
    fn from(e: StorageError) -> Self {
        ServicesError { msg: format!("{}", e) }
    }
}

fn address_to_db(address: Address) -> String {
    format!("{:#x}", address)
}

fn h256_to_db(hash: H256) -> String {
    format!("{:#x}", hash)
}

fn h256_from_db(value: &str) -> Result<H256> {
    H256::from_str(value.trim_start_matches("0x"))
        .map_err(|e| StorageError::ID(TypeError { msg: format!("{}", e) }))
}

fn u256_from_db(value: &str) -> Result<U256> {
    U256::from_dec_str(value).map_err(|e| StorageError::ID(TypeError { msg: format!("{}", e) }))
}

fn address_from_db(value: &str) -> Result<Address> {
    parse_address(value).map_err(StorageError::ID)
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn setup_database(&self) -> Result<()> {
        let setup_db_sql = format!(
            "
            PRAGMA foreign_keys=off;
            BEGIN TRANSACTION;
            {}{}{}{}{}{}
            COMMIT;
            PRAGMA foreign_keys=on;
            ",
            sqlite::DB_CREATE_SETTINGS,
            sqlite::DB_CREATE_BLOCKCHAIN,
            sqlite::DB_CREATE_TOKEN_NETWORKS,
            sqlite::DB_CREATE_CHANNELS,
            sqlite::DB_CREATE_MONITOR_REQUESTS,
            sqlite::DB_CREATE_SCHEDULED_EVENTS,
        );
        self.conn.execute_batch(&setup_db_sql).map_err(StorageError::Sql)?;
        self.enforce_schema_version()
    }

    /// Refuses to run against a database written by a different,
    /// non-migrated schema. Startup aborts on mismatch.
    fn enforce_schema_version(&self) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE name = 'schema_version'",
                NO_PARAMS,
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StorageError::Sql(other)),
            })?;

        match stored {
            Some(value) => {
                let found: u32 = value
                    .parse()
                    .map_err(|_| StorageError::Other("Invalid schema version value"))?;
                if found != DB_SCHEMA_VERSION {
                    return Err(StorageError::SchemaMismatch {
                        found,
                        expected: DB_SCHEMA_VERSION,
                    });
                }
                Ok(())
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO settings(name, value) VALUES('schema_version', ?1)",
                        params![DB_SCHEMA_VERSION.to_string()],
                    )
                    .map_err(StorageError::Sql)?;
                Ok(())
            }
        }
    }

    /// One block batch commits as a unit: every handler mutation plus the
    /// head-block update, or none of them.
    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION;").map_err(StorageError::Sql)
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT;").map_err(StorageError::Sql)
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK;").map_err(StorageError::Sql)
    }

    pub fn chain_state(&self) -> Result<Option<BlockchainState>> {
        let row = self
            .conn
            .query_row(
                "SELECT chain_id, token_network_registry_address, monitoring_contract_address, latest_known_block
                FROM blockchain WHERE id = 1",
                NO_PARAMS,
                |row| {
                    let chain_id: i64 = row.get(0)?;
                    let registry: String = row.get(1)?;
                    let monitoring: String = row.get(2)?;
                    let latest: i64 = row.get(3)?;
                    Ok((chain_id, registry, monitoring, latest))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StorageError::Sql(other)),
            })?;

        let (chain_id, registry, monitoring, latest) = match row {
            Some(values) => values,
            None => return Ok(None),
        };

        Ok(Some(BlockchainState {
            chain_id: (chain_id as u64).try_into().map_err(StorageError::ID)?,
            token_network_registry_address: address_from_db(&registry)?,
            monitoring_contract_address: address_from_db(&monitoring)?,
            latest_known_block: U64::from(latest as u64),
            token_network_addresses: self.token_networks()?,
        }))
    }

    /// First-run initialization. The registry and monitoring addresses are
    /// bound for the life of the store; a later run with different ones is
    /// a configuration error surfaced by the caller.
    pub fn init_chain_state(
        &self,
        chain_id: ChainID,
        token_network_registry_address: Address,
        monitoring_contract_address: Address,
        start_block: BlockNumber,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO blockchain(id, chain_id, token_network_registry_address, monitoring_contract_address, latest_known_block)
                VALUES(1, ?1, ?2, ?3, ?4)",
                params![
                    u64::from(chain_id) as i64,
                    address_to_db(token_network_registry_address),
                    address_to_db(monitoring_contract_address),
                    start_block.as_u64() as i64,
                ],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    pub fn update_latest_known_block(&self, block_number: BlockNumber) -> Result<()> {
        self.conn
            .execute(
                "UPDATE blockchain SET latest_known_block = ?1 WHERE id = 1 AND latest_known_block <= ?1",
                params![block_number.as_u64() as i64],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    pub fn add_token_network(&self, address: Address) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO token_networks(address) VALUES(?1)",
                params![address_to_db(address)],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    pub fn token_networks(&self) -> Result<Vec<Address>> {
        let mut stmt = self
            .conn
            .prepare("SELECT address FROM token_networks ORDER BY address")
            .map_err(StorageError::Sql)?;
        let mut rows = stmt.query(NO_PARAMS).map_err(StorageError::Sql)?;

        let mut addresses = vec![];
        while let Ok(Some(row)) = rows.next() {
            let address: String = row.get(0).map_err(StorageError::Sql)?;
            addresses.push(address_from_db(&address)?);
        }
        Ok(addresses)
    }

    fn channel_from_row(row: &Row) -> Result<Channel> {
        let token_network_address: String = row.get(0).map_err(StorageError::Sql)?;
        let channel_identifier: String = row.get(1).map_err(StorageError::Sql)?;
        let participant1: String = row.get(2).map_err(StorageError::Sql)?;
        let participant2: String = row.get(3).map_err(StorageError::Sql)?;
        let settle_timeout: i64 = row.get(4).map_err(StorageError::Sql)?;
        let status: String = row.get(5).map_err(StorageError::Sql)?;
        let closing_block: Option<i64> = row.get(6).map_err(StorageError::Sql)?;
        let closing_participant: Option<String> = row.get(7).map_err(StorageError::Sql)?;
        let monitor_tx_hash: Option<String> = row.get(8).map_err(StorageError::Sql)?;
        let claim_tx_hash: Option<String> = row.get(9).map_err(StorageError::Sql)?;

        Ok(Channel {
            token_network_address: address_from_db(&token_network_address)?,
            channel_identifier: u256_from_db(&channel_identifier)?,
            participant1: address_from_db(&participant1)?,
            participant2: address_from_db(&participant2)?,
            settle_timeout: U64::from(settle_timeout as u64),
            status: ChannelStatus::from_str(&status)
                .ok_or(StorageError::Other("Unknown channel status"))?,
            closing_block: closing_block.map(|block| U64::from(block as u64)),
            closing_participant: match closing_participant {
                Some(value) => Some(address_from_db(&value)?),
                None => None,
            },
            monitor_tx_hash: match monitor_tx_hash {
                Some(value) => Some(h256_from_db(&value)?),
                None => None,
            },
            claim_tx_hash: match claim_tx_hash {
                Some(value) => Some(h256_from_db(&value)?),
                None => None,
            },
        })
    }

    pub fn channel(&self, canonical_identifier: &CanonicalIdentifier) -> Result<Option<Channel>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT token_network_address, channel_identifier, participant1, participant2,
                settle_timeout, status, closing_block, closing_participant, monitor_tx_hash, claim_tx_hash
                FROM channels WHERE token_network_address = ?1 AND channel_identifier = ?2",
            )
            .map_err(StorageError::Sql)?;
        let mut rows = stmt
            .query(params![
                address_to_db(canonical_identifier.token_network_address),
                canonical_identifier.channel_identifier.to_string(),
            ])
            .map_err(StorageError::Sql)?;

        match rows.next().map_err(StorageError::Sql)? {
            Some(row) => Ok(Some(Self::channel_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn channels(&self) -> Result<Vec<Channel>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT token_network_address, channel_identifier, participant1, participant2,
                settle_timeout, status, closing_block, closing_participant, monitor_tx_hash, claim_tx_hash
                FROM channels",
            )
            .map_err(StorageError::Sql)?;
        let mut rows = stmt.query(NO_PARAMS).map_err(StorageError::Sql)?;

        let mut channels = vec![];
        while let Ok(Some(row)) = rows.next() {
            channels.push(Self::channel_from_row(row)?);
        }
        Ok(channels)
    }

    pub fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO channels(
                    token_network_address, channel_identifier, participant1, participant2,
                    settle_timeout, status, closing_block, closing_participant, monitor_tx_hash, claim_tx_hash)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    address_to_db(channel.token_network_address),
                    channel.channel_identifier.to_string(),
                    address_to_db(channel.participant1),
                    address_to_db(channel.participant2),
                    channel.settle_timeout.as_u64() as i64,
                    format!("{}", channel.status),
                    channel.closing_block.map(|block| block.as_u64() as i64),
                    channel.closing_participant.map(address_to_db),
                    channel.monitor_tx_hash.map(h256_to_db),
                    channel.claim_tx_hash.map(h256_to_db),
                ],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    fn monitor_request_from_row(row: &Row) -> Result<MonitorRequest> {
        let token_network_address: String = row.get(0).map_err(StorageError::Sql)?;
        let channel_identifier: String = row.get(1).map_err(StorageError::Sql)?;
        let non_closing_signer: String = row.get(2).map_err(StorageError::Sql)?;
        let balance_hash: String = row.get(3).map_err(StorageError::Sql)?;
        let nonce: String = row.get(4).map_err(StorageError::Sql)?;
        let additional_hash: String = row.get(5).map_err(StorageError::Sql)?;
        let closing_signature: String = row.get(6).map_err(StorageError::Sql)?;
        let non_closing_signature: String = row.get(7).map_err(StorageError::Sql)?;
        let reward_amount: String = row.get(8).map_err(StorageError::Sql)?;
        let reward_proof_signature: String = row.get(9).map_err(StorageError::Sql)?;
        let received_at_block: i64 = row.get(10).map_err(StorageError::Sql)?;

        let decode_signature = |value: &str| -> Result<Vec<u8>> {
            hex::decode(value.trim_start_matches("0x"))
                .map_err(|e| StorageError::ID(TypeError { msg: format!("{}", e) }))
        };

        Ok(MonitorRequest {
            token_network_address: address_from_db(&token_network_address)?,
            channel_identifier: u256_from_db(&channel_identifier)?,
            non_closing_signer: address_from_db(&non_closing_signer)?,
            balance_hash: h256_from_db(&balance_hash)?,
            nonce: u256_from_db(&nonce)?,
            additional_hash: h256_from_db(&additional_hash)?,
            closing_signature: decode_signature(&closing_signature)?,
            non_closing_signature: decode_signature(&non_closing_signature)?,
            reward_amount: u256_from_db(&reward_amount)?,
            reward_proof_signature: decode_signature(&reward_proof_signature)?,
            received_at_block: U64::from(received_at_block as u64),
        })
    }

    pub fn monitor_request(
        &self,
        canonical_identifier: &CanonicalIdentifier,
        non_closing_signer: Address,
    ) -> Result<Option<MonitorRequest>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT token_network_address, channel_identifier, non_closing_signer, balance_hash,
                nonce, additional_hash, closing_signature, non_closing_signature, reward_amount,
                reward_proof_signature, received_at_block
                FROM monitor_requests
                WHERE token_network_address = ?1 AND channel_identifier = ?2 AND non_closing_signer = ?3",
            )
            .map_err(StorageError::Sql)?;
        let mut rows = stmt
            .query(params![
                address_to_db(canonical_identifier.token_network_address),
                canonical_identifier.channel_identifier.to_string(),
                address_to_db(non_closing_signer),
            ])
            .map_err(StorageError::Sql)?;

        match rows.next().map_err(StorageError::Sql)? {
            Some(row) => Ok(Some(Self::monitor_request_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn upsert_monitor_request(&self, request: &MonitorRequest) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO monitor_requests(
                    token_network_address, channel_identifier, non_closing_signer, balance_hash,
                    nonce, additional_hash, closing_signature, non_closing_signature, reward_amount,
                    reward_proof_signature, received_at_block)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    address_to_db(request.token_network_address),
                    request.channel_identifier.to_string(),
                    address_to_db(request.non_closing_signer),
                    h256_to_db(request.balance_hash),
                    request.nonce.to_string(),
                    h256_to_db(request.additional_hash),
                    hex::encode(&request.closing_signature),
                    hex::encode(&request.non_closing_signature),
                    request.reward_amount.to_string(),
                    hex::encode(&request.reward_proof_signature),
                    request.received_at_block.as_u64() as i64,
                ],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    /// Drops requests that never matched a channel once the retention
    /// window has passed, bounding growth from spam submissions.
    pub fn prune_monitor_requests(&self, head: BlockNumber, retention_blocks: u64) -> Result<usize> {
        let cutoff = head.as_u64().saturating_sub(retention_blocks);
        let deleted = self
            .conn
            .execute(
                "DELETE FROM monitor_requests
                WHERE received_at_block < ?1
                AND NOT EXISTS (
                    SELECT 1 FROM channels
                    WHERE channels.token_network_address = monitor_requests.token_network_address
                    AND channels.channel_identifier = monitor_requests.channel_identifier
                )",
                params![cutoff as i64],
            )
            .map_err(StorageError::Sql)?;
        Ok(deleted)
    }

    pub fn store_scheduled_event(&self, event: &ScheduledEvent) -> Result<i64> {
        let serialized = serde_json::to_string(event).map_err(|_| StorageError::SerializationError)?;
        self.conn
            .execute(
                "INSERT INTO scheduled_events(trigger_block_number, data) VALUES(?1, ?2)",
                params![event.trigger_block_number.as_u64() as i64, serialized],
            )
            .map_err(StorageError::Sql)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Events due at `head`, ordered by trigger block then insertion order.
    /// The autoincrement identifier never reuses values, which gives the
    /// FIFO tie break for equal trigger heights.
    pub fn due_scheduled_events(&self, head: BlockNumber) -> Result<Vec<(i64, ScheduledEvent)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT identifier, data FROM scheduled_events
                WHERE trigger_block_number <= ?1
                ORDER BY trigger_block_number, identifier",
            )
            .map_err(StorageError::Sql)?;
        let mut rows = stmt.query(params![head.as_u64() as i64]).map_err(StorageError::Sql)?;

        let mut due = vec![];
        while let Ok(Some(row)) = rows.next() {
            let identifier: i64 = row.get(0).map_err(StorageError::Sql)?;
            let data: String = row.get(1).map_err(StorageError::Sql)?;
            let event: ScheduledEvent =
                serde_json::from_str(&data).map_err(|_| StorageError::SerializationError)?;
            due.push((identifier, event));
        }
        Ok(due)
    }

    pub fn remove_scheduled_event(&self, identifier: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM scheduled_events WHERE identifier = ?1",
                params![identifier],
            )
            .map_err(StorageError::Sql)?;
        Ok(())
    }

    pub fn scheduled_events(&self) -> Result<Vec<ScheduledEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM scheduled_events ORDER BY trigger_block_number, identifier")
            .map_err(StorageError::Sql)?;
        let mut rows = stmt.query(NO_PARAMS).map_err(StorageError::Sql)?;

        let mut events = vec![];
        while let Ok(Some(row)) = rows.next() {
            let data: String = row.get(0).map_err(StorageError::Sql)?;
            events.push(serde_json::from_str(&data).map_err(|_| StorageError::SerializationError)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::monitoring_triggered;

    fn storage() -> Storage {
        let storage = Storage::new(Connection::open_in_memory().expect("in-memory db"));
        storage.setup_database().expect("schema setup");
        storage
    }

    fn channel(identifier: u64) -> Channel {
        Channel::new(
            Address::repeat_byte(0x10),
            U256::from(identifier),
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0xbb),
            U64::from(20u64),
        )
    }

    #[test]
    fn channel_round_trip() {
        let storage = storage();
        let mut stored = channel(1);
        stored.status = ChannelStatus::Closed;
        stored.closing_block = Some(U64::from(15u64));
        stored.closing_participant = Some(Address::repeat_byte(0xaa));
        stored.monitor_tx_hash = Some(H256::repeat_byte(0x42));

        storage.upsert_channel(&stored).unwrap();
        let loaded = storage
            .channel(&stored.canonical_identifier())
            .unwrap()
            .expect("channel exists");
        assert_eq!(loaded, stored);
    }

    #[test]
    fn channel_identifier_survives_any_magnitude() {
        let storage = storage();
        // Small identifiers must not be coerced into integers by the
        // column, large ones must not overflow it.
        let small = channel(1);
        let mut large = channel(2);
        large.channel_identifier = U256::MAX;

        storage.upsert_channel(&small).unwrap();
        storage.upsert_channel(&large).unwrap();

        let loaded = storage.channel(&small.canonical_identifier()).unwrap().unwrap();
        assert_eq!(loaded.channel_identifier, U256::from(1u64));
        let loaded = storage.channel(&large.canonical_identifier()).unwrap().unwrap();
        assert_eq!(loaded.channel_identifier, U256::MAX);
    }

    #[test]
    fn monitor_request_round_trip() {
        let storage = storage();
        // Digit-only hex signatures stay strings in the database.
        let stored = MonitorRequest {
            token_network_address: Address::repeat_byte(0x10),
            channel_identifier: U256::from(1u64),
            non_closing_signer: Address::repeat_byte(0xbb),
            balance_hash: H256::repeat_byte(0x42),
            nonce: U256::from(3u64),
            additional_hash: H256::zero(),
            closing_signature: vec![0x11u8; 65],
            non_closing_signature: vec![0x22u8; 65],
            reward_amount: U256::from(5u64),
            reward_proof_signature: vec![0x33u8; 65],
            received_at_block: U64::from(7u64),
        };
        storage.upsert_monitor_request(&stored).unwrap();

        let loaded = storage
            .monitor_request(
                &CanonicalIdentifier {
                    token_network_address: stored.token_network_address,
                    channel_identifier: stored.channel_identifier,
                },
                stored.non_closing_signer,
            )
            .unwrap()
            .expect("request stored");
        assert_eq!(loaded, stored);
    }

    #[test]
    fn unknown_channel_is_none() {
        let storage = storage();
        let missing = CanonicalIdentifier {
            token_network_address: Address::repeat_byte(0x99),
            channel_identifier: U256::from(7u64),
        };
        assert!(storage.channel(&missing).unwrap().is_none());
    }

    #[test]
    fn schema_version_mismatch_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        let storage = Storage::new(conn);
        storage.setup_database().unwrap();
        storage
            .conn
            .execute("UPDATE settings SET value = '999' WHERE name = 'schema_version'", NO_PARAMS)
            .unwrap();
        assert!(matches!(
            storage.enforce_schema_version(),
            Err(StorageError::SchemaMismatch { found: 999, .. })
        ));
    }

    #[test]
    fn latest_known_block_never_regresses() {
        let storage = storage();
        storage
            .init_chain_state(
                ChainID::Goerli,
                Address::repeat_byte(0x01),
                Address::repeat_byte(0x02),
                U64::from(10u64),
            )
            .unwrap();
        storage.update_latest_known_block(U64::from(20u64)).unwrap();
        storage.update_latest_known_block(U64::from(15u64)).unwrap();
        let state = storage.chain_state().unwrap().expect("initialized");
        assert_eq!(state.latest_known_block, U64::from(20u64));
    }

    #[test]
    fn scheduled_events_ordered_by_trigger_then_insertion() {
        let storage = storage();
        let monitoring_at = |trigger: u64, channel_identifier: u64| ScheduledEvent {
            trigger_block_number: U64::from(trigger),
            event: monitoring_triggered(
                CanonicalIdentifier {
                    token_network_address: Address::repeat_byte(0x10),
                    channel_identifier: U256::from(channel_identifier),
                },
                Address::repeat_byte(0xbb),
            ),
        };

        storage.store_scheduled_event(&monitoring_at(30, 999)).unwrap();
        // A burst of same-height events, stored well within one
        // millisecond, must come back in insertion order.
        for channel_identifier in 0..64u64 {
            storage.store_scheduled_event(&monitoring_at(20, channel_identifier)).unwrap();
        }

        let due = storage.due_scheduled_events(U64::from(25u64)).unwrap();
        assert_eq!(due.len(), 64);
        for (index, (_, scheduled)) in due.iter().enumerate() {
            assert_eq!(*scheduled, monitoring_at(20, index as u64));
        }

        let due = storage.due_scheduled_events(U64::from(30u64)).unwrap();
        assert_eq!(due.len(), 65);
        assert_eq!(due[64].1, monitoring_at(30, 999));
    }

    #[test]
    fn prune_drops_only_orphaned_stale_requests() {
        let storage = storage();
        let open_channel = channel(1);
        storage.upsert_channel(&open_channel).unwrap();

        let request = |channel_identifier: u64, received: u64| MonitorRequest {
            token_network_address: Address::repeat_byte(0x10),
            channel_identifier: U256::from(channel_identifier),
            non_closing_signer: Address::repeat_byte(0xbb),
            balance_hash: H256::repeat_byte(0x01),
            nonce: U256::from(1u64),
            additional_hash: H256::zero(),
            closing_signature: vec![1u8; 65],
            non_closing_signature: vec![2u8; 65],
            reward_amount: U256::from(5u64),
            reward_proof_signature: vec![3u8; 65],
            received_at_block: U64::from(received),
        };

        // Matches a channel: kept. Orphaned but fresh: kept. Orphaned and
        // stale: dropped.
        storage.upsert_monitor_request(&request(1, 10)).unwrap();
        storage.upsert_monitor_request(&request(2, 90)).unwrap();
        storage.upsert_monitor_request(&request(3, 10)).unwrap();

        let deleted = storage.prune_monitor_requests(U64::from(100u64), 50).unwrap();
        assert_eq!(deleted, 1);

        let canonical = |channel_identifier: u64| CanonicalIdentifier {
            token_network_address: Address::repeat_byte(0x10),
            channel_identifier: U256::from(channel_identifier),
        };
        let signer = Address::repeat_byte(0xbb);
        assert!(storage.monitor_request(&canonical(1), signer).unwrap().is_some());
        assert!(storage.monitor_request(&canonical(2), signer).unwrap().is_some());
        assert!(storage.monitor_request(&canonical(3), signer).unwrap().is_none());
    }
}
