//! Three-layer scam detection ensemble: deterministic regex heuristics,
//! behavioral token-lexicon scoring, and a pluggable semantic tie-breaker.

pub mod engine;
pub mod layer1;
pub mod layer2;
pub mod layer3;

pub use engine::{DetectionSignal, RiskLevel, ScamDetectorEngine};
pub use layer3::{SemanticClassifier, StubSemanticClassifier};
