// Identity, policy and topic governance shared by every migrated document.

pub mod identity;
pub mod policy;
pub mod topic;

pub use identity::Identity;
pub use policy::Policy;
pub use topic::{topic_candidates, TopicDecision, TopicRules};
