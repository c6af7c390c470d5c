pub(super) const DB_CREATE_SETTINGS: &str = "
CREATE TABLE IF NOT EXISTS settings (
    name VARCHAR[24] UNIQUE PRIMARY KEY NOT NULL,
    value TEXT
);
";

pub(super) const DB_CREATE_BLOCKCHAIN: &str = "
CREATE TABLE IF NOT EXISTS blockchain (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    chain_id INTEGER NOT NULL,
    token_network_registry_address CHAR[42] NOT NULL,
    monitoring_contract_address CHAR[42] NOT NULL,
    latest_known_block INTEGER NOT NULL
);
";

pub(super) const DB_CREATE_TOKEN_NETWORKS: &str = "
CREATE TABLE IF NOT EXISTS token_networks (
    address CHAR[42] UNIQUE PRIMARY KEY NOT NULL
);
";

pub(super) const DB_CREATE_CHANNELS: &str = "
CREATE TABLE IF NOT EXISTS channels (
    token_network_address CHAR[42] NOT NULL,
    channel_identifier TEXT NOT NULL,
    participant1 CHAR[42] NOT NULL,
    participant2 CHAR[42] NOT NULL,
    settle_timeout INTEGER NOT NULL,
    status TEXT NOT NULL,
    closing_block INTEGER,
    closing_participant CHAR[42],
    monitor_tx_hash CHAR[66],
    claim_tx_hash CHAR[66],
    PRIMARY KEY (token_network_address, channel_identifier)
);
";

pub(super) const DB_CREATE_MONITOR_REQUESTS: &str = "
CREATE TABLE IF NOT EXISTS monitor_requests (
    token_network_address CHAR[42] NOT NULL,
    channel_identifier TEXT NOT NULL,
    non_closing_signer CHAR[42] NOT NULL,
    balance_hash CHAR[66] NOT NULL,
    nonce TEXT NOT NULL,
    additional_hash CHAR[66] NOT NULL,
    closing_signature TEXT NOT NULL,
    non_closing_signature TEXT NOT NULL,
    reward_amount TEXT NOT NULL,
    reward_proof_signature TEXT NOT NULL,
    received_at_block INTEGER NOT NULL,
    PRIMARY KEY (token_network_address, channel_identifier, non_closing_signer)
);
";

pub(super) const DB_CREATE_SCHEDULED_EVENTS: &str = "
CREATE TABLE IF NOT EXISTS scheduled_events (
    identifier INTEGER PRIMARY KEY AUTOINCREMENT,
    trigger_block_number INTEGER NOT NULL,
    data TEXT NOT NULL
);
";
