use std::{
    collections::HashMap,
    fs,
    io,
    path::Path,
};

use ethsign::{
    KeyFile,
    Protected,
    SecretKey,
};
use web3::types::Address;

/// Maps keystore file paths to the addresses they hold.
pub fn list_keys(keystore: &Path) -> io::Result<HashMap<String, Address>> {
    let mut keys: HashMap<String, Address> = HashMap::new();
    for entry in fs::read_dir(keystore)? {
        let entry = entry?;
        let file_name = entry.path().to_string_lossy().into_owned();
        let file = fs::File::open(&file_name)?;
        let key: KeyFile = match serde_json::from_reader(file) {
            Ok(key) => key,
            // Non-keystore files in the directory are skipped.
            Err(_) => continue,
        };
        if let Some(address) = key.address {
            keys.insert(file_name, Address::from_slice(&address.0));
        }
    }
    Ok(keys)
}

pub fn unlock_key(keystore_file: &str, password: String) -> Option<SecretKey> {
    let file = fs::File::open(keystore_file).ok()?;
    let key: KeyFile = serde_json::from_reader(file).ok()?;
    let password: Protected = password.into();
    key.to_secret_key(&password).ok()
}
