//! Store-level metadata kept in a reserved map.

use super::credential::CredentialVerifier;
use crate::config::EngineKind;
use crate::error::{CoreError, CoreResult};
use std::time::{SystemTime, UNIX_EPOCH};
use tessera_codec::{from_cbor, to_cbor, Value};

/// Format version written by this build, as (major, minor).
pub const FORMAT_VERSION: (u16, u16) = (1, 0);

/// Reserved map holding store metadata.
pub(crate) const STORE_INFO_MAP: &str = "$store_info";

/// Key of the metadata entry inside [`STORE_INFO_MAP`].
pub(crate) const STORE_INFO_KEY: &[u8] = b"store-info";

/// Reserved map recording which field keys each caller map.
pub(crate) const KEY_FIELDS_MAP: &str = "$key_fields";

/// Prefix of map names reserved for the store itself.
pub(crate) const RESERVED_PREFIX: char = '$';

/// Metadata recorded when a store is first created.
///
/// It is validated on every later open: the major format version must match,
/// a recorded credential verifier must accept the supplied credential, and
/// the recorded compression setting overrides the configured one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Format version the store was written with.
    pub format_version: (u16, u16),
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Engine that created the store.
    pub engine: EngineKind,
    /// Name of the compressor applied to values, if any.
    pub compressor: Option<String>,
    verifier: Option<CredentialVerifier>,
}

impl StoreInfo {
    pub(crate) fn new(
        engine: EngineKind,
        compressor: Option<&str>,
        verifier: Option<CredentialVerifier>,
    ) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Self {
            format_version: FORMAT_VERSION,
            created_at_ms,
            engine,
            compressor: compressor.map(str::to_string),
            verifier,
        }
    }

    /// Returns whether values in this store are compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressor.is_some()
    }

    /// Returns whether opening this store requires a credential.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.verifier.is_some()
    }

    pub(crate) fn verifier(&self) -> Option<&CredentialVerifier> {
        self.verifier.as_ref()
    }

    /// Fails unless the store was written by a compatible major version.
    pub(crate) fn check_version(&self) -> CoreResult<()> {
        if self.format_version.0 == FORMAT_VERSION.0 {
            Ok(())
        } else {
            Err(CoreError::VersionMismatch {
                found: self.format_version,
                supported: FORMAT_VERSION,
            })
        }
    }

    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let verifier = self.verifier.as_ref().map_or(Value::Null, |v| {
            Value::Map(vec![
                (Value::from("salt"), Value::from(v.salt())),
                (Value::from("digest"), Value::from(v.digest())),
            ])
        });
        let value = Value::Map(vec![
            (
                Value::from("format_major"),
                Value::from(u32::from(self.format_version.0)),
            ),
            (
                Value::from("format_minor"),
                Value::from(u32::from(self.format_version.1)),
            ),
            (
                Value::from("created_at"),
                Value::Integer(i64::try_from(self.created_at_ms).unwrap_or(i64::MAX)),
            ),
            (Value::from("engine"), Value::from(self.engine.as_str())),
            (
                Value::from("compressor"),
                Value::from(self.compressor.clone()),
            ),
            (Value::from("verifier"), verifier),
        ]);
        Ok(to_cbor(&value)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let value = from_cbor(bytes)?;
        let field = |name: &str| {
            value
                .get(name)
                .ok_or_else(|| CoreError::corruption(format!("store-info lacks {name}")))
        };
        let version_part = |name: &str| -> CoreResult<u16> {
            field(name)?
                .as_integer()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| CoreError::corruption(format!("store-info {name} is invalid")))
        };

        let format_version = (version_part("format_major")?, version_part("format_minor")?);
        let created_at_ms = field("created_at")?
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| CoreError::corruption("store-info created_at is invalid"))?;
        let engine = field("engine")?
            .as_text()
            .ok_or_else(|| CoreError::corruption("store-info engine is invalid"))?
            .parse()?;
        let compressor = match field("compressor")? {
            Value::Null => None,
            Value::Text(name) => Some(name.clone()),
            _ => return Err(CoreError::corruption("store-info compressor is invalid")),
        };
        let verifier = match field("verifier")? {
            Value::Null => None,
            v => {
                let part = |name: &str| {
                    v.get(name)
                        .and_then(Value::as_bytes)
                        .ok_or_else(|| CoreError::corruption("store-info verifier is invalid"))
                };
                Some(CredentialVerifier::from_parts(part("salt")?, part("digest")?)?)
            }
        };

        Ok(Self {
            format_version,
            created_at_ms,
            engine,
            compressor,
            verifier,
        })
    }
}
