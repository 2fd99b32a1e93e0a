pub mod factory;
pub mod key;

pub use factory::IsolatedContextFactory;
pub use key::{IsolationKeyDeriver, TestIdentity};
