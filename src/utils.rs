//! Utility functions for user addresses

use crate::types::UserId;
use bech32::{Bech32m, Hrp};

const USER_HRP: Hrp = Hrp::parse_unchecked("user");

// construct a unique user id, a uuid7 under the hood
pub fn new_user_id() -> UserId {
    UserId::new()
}

/// Renders a user id as a bech32m address, e.g. `user1...`.
pub fn user_address(user: &UserId) -> anyhow::Result<String> {
    let encode = bech32::encode::<Bech32m>(USER_HRP, user.as_bytes())?;
    Ok(encode)
}

pub fn parse_user_address(address: &str) -> anyhow::Result<UserId> {
    let (hrp, data) = bech32::decode(address)?;
    if hrp != USER_HRP {
        anyhow::bail!("expected a `user` address, got `{}`", hrp);
    }
    let bytes: [u8; 16] = data
        .try_into()
        .map_err(|_| anyhow::anyhow!("user address must carry 16 bytes"))?;
    Ok(UserId::from_bytes(bytes))
}
