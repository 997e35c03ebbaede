//! IP filtering: network trie, policies, policy store and the decision engine

pub mod engine;
pub mod observer;
pub mod policy;
pub mod store;
pub mod trie;

pub use engine::{DecisionEngine, Request, Verdict};
pub use observer::{DecisionEvent, DecisionKind, DecisionObserver, TracingObserver};
pub use policy::Policy;
pub use store::{PolicyProvider, PolicyStore, PolicyTable};
pub use trie::NetworkTrie;
