pub mod containers;
pub mod doubles;
pub mod fixtures;

pub use containers::{setup_postgres, PgTestContainer};
pub use doubles::{GatewayCall, ScriptedGateway, ScriptedStore, StoreReply};
