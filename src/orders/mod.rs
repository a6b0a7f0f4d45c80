pub mod lifecycle;
pub mod reconciler;

pub use lifecycle::OrderLifecycle;
pub use reconciler::{TradeReconciler, Verification};
