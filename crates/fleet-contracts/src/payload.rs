//! Opaque typed payloads.
//!
//! Arguments, replies and parcels travel as `AnyPayload`: a type name plus a
//! JSON body. Concrete types opt in by implementing `TypedPayload`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};

/// A concrete message type that can be packed into an `AnyPayload`.
pub trait TypedPayload: Serialize + DeserializeOwned {
    /// Stable name written next to the packed body.
    const TYPE_NAME: &'static str;
}

/// A type-tagged, serialized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyPayload {
    pub type_name: String,
    pub value: serde_json::Value,
}

impl AnyPayload {
    /// Serialize `item` and tag it with its type name.
    pub fn pack<T: TypedPayload>(item: &T) -> FleetResult<Self> {
        let value = serde_json::to_value(item).map_err(|e| FleetError::Payload {
            reason: format!("failed to pack {}: {}", T::TYPE_NAME, e),
        })?;
        Ok(Self {
            type_name: T::TYPE_NAME.to_string(),
            value,
        })
    }

    /// Deserialize the body as `T`, rejecting a type name mismatch.
    pub fn unpack<T: TypedPayload>(&self) -> FleetResult<T> {
        if !self.is::<T>() {
            return Err(FleetError::Payload {
                reason: format!(
                    "expected payload of type {}, found {}",
                    T::TYPE_NAME,
                    self.type_name
                ),
            });
        }
        serde_json::from_value(self.value.clone()).map_err(|e| FleetError::Payload {
            reason: format!("failed to unpack {}: {}", T::TYPE_NAME, e),
        })
    }

    pub fn is<T: TypedPayload>(&self) -> bool {
        self.type_name == T::TYPE_NAME
    }
}

/// Arguments of a flow that takes none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyArgs {}

impl TypedPayload for EmptyArgs {
    const TYPE_NAME: &'static str = "EmptyArgs";
}
