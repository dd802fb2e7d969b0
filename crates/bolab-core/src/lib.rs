#![deny(missing_docs)]
#![doc = "Core error, identifier, hashing, and RNG types shared by the bolab campaign crates."]

pub mod canonical;
pub mod errors;
pub mod ids;
pub mod rng;
pub mod schema;

pub use canonical::{stable_hash_string, to_canonical_json_bytes};
pub use errors::{BolabError, ErrorInfo};
pub use ids::{BatchId, CampaignId};
pub use rng::{derive_substream_seed, RngHandle};
pub use schema::SchemaVersion;
