//! Conversion between profiles and bus payloads.

use crate::error::CodecError;
use crate::profile::Profile;

/// Converts profiles to and from wire bytes.
pub trait Marshaller: Send + Sync {
    fn encode(&self, profile: &Profile) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<Profile, CodecError>;
}

/// JSON encoding, tagged by profile type name.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn encode(&self, profile: &Profile) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(profile).map_err(CodecError::Encode)
    }

    fn decode(&self, payload: &[u8]) -> Result<Profile, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::Decode)
    }
}
