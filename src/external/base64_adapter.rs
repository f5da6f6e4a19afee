//! Reference [`super::Base64Encoder`] backed by the `base64` crate.

use super::Base64Encoder;
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub struct StandardBase64Encoder;

impl Base64Encoder for StandardBase64Encoder {
    fn encode(&self, bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }
}
