use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::firestore::error::{invalid_argument, FirestoreResult};

/// Opaque binary field value. On the wire it travels as padded standard
/// base64 in `bytesValue`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BytesValue(Vec<u8>);

impl BytesValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> FirestoreResult<Self> {
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|err| invalid_argument(format!("Invalid bytesValue: {err}")))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for BytesValue {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for BytesValue {
    fn from(value: &[u8]) -> Self {
        Self::new(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_padding() {
        let bytes = BytesValue::from(&[0xde, 0xad][..]);
        assert_eq!(bytes.to_base64(), "3q0=");
        assert_eq!(BytesValue::from_base64("3q0=").unwrap(), bytes);
    }

    #[test]
    fn rejects_malformed_base64() {
        let err = BytesValue::from_base64("not base64!").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }
}
