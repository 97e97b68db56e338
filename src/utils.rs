//! Identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

pub const NEGOTIATION_HRP: &str = "neg_";
pub const MESSAGE_HRP: &str = "msg_";
pub const ATTACHMENT_HRP: &str = "att_";

// construct a unique, time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
