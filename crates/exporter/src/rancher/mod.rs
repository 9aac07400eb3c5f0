//! Rancher API plumbing — REST client and websocket event ingress.

pub mod client;
pub mod subscribe;

use serde::{Deserialize, Deserializer};

/// Deserialize a field that the Rancher API reports as either absent,
/// `null`, or a value, collapsing the first two into the type's default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
